//! Turn bookkeeping for one agent call.
//!
//! [`TurnQueue`] decides which reply runs, which caller messages wait, and when
//! the call may close. It does no I/O: each event returns the [`Step`]s the
//! call loop must carry out.

use std::collections::VecDeque;

/// Something the call loop must do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Step {
    /// Cancel the running turn and tell the caller it was interrupted.
    Cancel(u64),
    /// Start a turn. `None` produces the greeting.
    Start { id: u64, text: Option<String> },
}

#[derive(Debug)]
pub(crate) struct TurnQueue {
    running: Option<u64>,
    pending: VecDeque<String>,
    next_id: u64,
    interruptible: bool,
    ended: bool,
}

impl TurnQueue {
    pub(crate) fn new() -> Self {
        Self {
            running: None,
            pending: VecDeque::new(),
            next_id: 0,
            interruptible: true,
            ended: false,
        }
    }

    /// Opens the call with the greeting.
    pub(crate) fn greet(&mut self) -> Step {
        let id = self.allocate();
        Step::Start { id, text: None }
    }

    /// A caller message. It barges in when the gate is open and otherwise
    /// waits behind the running turn. Queued messages are answered in order.
    pub(crate) fn user_message(&mut self, text: String, gate_open: bool) -> Vec<Step> {
        if text.trim().is_empty() {
            return Vec::new();
        }
        self.pending.push_back(text);
        let mut steps = Vec::new();
        if gate_open {
            steps.extend(self.cancel_running());
        }
        steps.extend(self.start_next());
        steps
    }

    /// An explicit interrupt. Ignored while a tool call holds the gate.
    pub(crate) fn interrupt(&mut self, gate_open: bool) -> Vec<Step> {
        if !gate_open {
            return Vec::new();
        }
        let mut steps: Vec<Step> = self.cancel_running().into_iter().collect();
        steps.extend(self.start_next());
        steps
    }

    /// A turn finished on its own. Reports from cancelled turns are ignored.
    pub(crate) fn turn_done(&mut self, id: u64) -> Option<Step> {
        if self.running != Some(id) {
            return None;
        }
        self.running = None;
        self.start_next()
    }

    /// Records the gate's new position. Returns it when the caller should be told.
    pub(crate) fn gate_changed(&mut self, allowed: bool) -> Option<bool> {
        if allowed == self.interruptible {
            return None;
        }
        self.interruptible = allowed;
        Some(allowed)
    }

    pub(crate) fn summary_saved(&mut self) {
        self.ended = true;
    }

    /// True once the summary is saved and nothing is left to say.
    pub(crate) fn should_close(&self) -> bool {
        self.ended && self.running.is_none() && self.pending.is_empty()
    }

    pub(crate) fn pending_len(&self) -> usize {
        self.pending.len()
    }

    fn allocate(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.running = Some(id);
        id
    }

    fn cancel_running(&mut self) -> Option<Step> {
        self.running.take().map(Step::Cancel)
    }

    fn start_next(&mut self) -> Option<Step> {
        if self.running.is_some() {
            return None;
        }
        let text = self.pending.pop_front()?;
        let id = self.allocate();
        Some(Step::Start {
            id,
            text: Some(text),
        })
    }
}

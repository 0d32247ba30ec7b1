//! Voice Agent WebSocket Sessions
//!
//! One WebSocket connection is one sales call. It is structured into submodules:
//!
//! - `protocol`: Defines the JSON-based message format for client-server communication.
//! - `session`: Manages the call lifecycle, from handshake to termination.
//! - `cycle`: Implements the agent's "ReAct" (Reason-Act) logic for each caller turn.
//! - `turns`: Decides which turn runs, which caller messages wait, and when the call ends.

mod cycle;
pub mod protocol;
pub mod session;
mod turns;

pub use session::ws_handler;

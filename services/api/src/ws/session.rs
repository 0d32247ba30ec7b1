//! Manages the WebSocket connection lifecycle for a voice agent call.

use super::{
    cycle::{greet, run_react_cycle},
    protocol::{ClientMessage, ServerMessage},
    turns::{Step, TurnQueue},
};
use crate::{
    config::{ConfigError, Provider},
    state::{AgentRuntime, AppState},
};
use anyhow::{Result, anyhow};
use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use rmcp::{
    ServiceExt,
    service::{Peer, RoleClient},
};
use salesvoice_core::{
    agent::{CallState, SalesAgentService},
    chat::ChatMessage,
    llm_client::LLMClient,
    profile::ParticipantKind,
    tools::InterruptionGate,
};
use std::sync::Arc;
use tokio::{
    sync::{Mutex, mpsc},
    task::JoinHandle,
};
use tracing::{Instrument, debug, error, info, instrument, warn};
use uuid::Uuid;

type SocketSink = Arc<Mutex<SplitSink<WebSocket, Message>>>;

/// Axum handler to upgrade an HTTP connection to a WebSocket.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Main handler for an individual WebSocket connection.
///
/// Performs the `init` handshake and then spawns the call loop.
#[instrument(name = "ws_call", skip_all, fields(call_id))]
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let call_id = Uuid::new_v4();
    tracing::Span::current().record("call_id", &call_id.to_string());
    info!("New WebSocket connection. Awaiting initialization...");

    let (socket_tx, mut socket_rx) = socket.split();
    let socket_tx: SocketSink = Arc::new(Mutex::new(socket_tx));

    // The first message from the client must be an `init` message.
    let init = match socket_rx.next().await {
        Some(Ok(Message::Text(text))) => parse_init(&text),
        Some(Ok(_)) => Err(anyhow!("First message was not a text `init` message.")),
        _ => {
            info!("Client disconnected before sending init message.");
            return;
        }
    };
    let (participant, llm) = match init.and_then(|participant| {
        let llm = agent_llm(&state.agent, &state.config.provider)?;
        Ok((participant, llm))
    }) {
        Ok(ready) => ready,
        Err(e) => {
            error!("Call initialization failed: {:?}", e);
            let _ = send_msg(
                &mut *socket_tx.lock().await,
                ServerMessage::Error {
                    message: e.to_string(),
                },
            )
            .await;
            let _ = socket_tx.lock().await.close().await;
            return;
        }
    };

    let profile = state.agent.profile.clone();
    let noise_cancellation = profile.noise_cancellation_for(participant);
    if send_msg(
        &mut *socket_tx.lock().await,
        ServerMessage::Initialized {
            call_id,
            profile,
            noise_cancellation,
            state: CallState::default(),
        },
    )
    .await
    .is_err()
    {
        error!("Failed to send Initialized message to client.");
        return;
    }

    let call_span = tracing::info_span!("agent_call", %call_id, ?participant);
    tokio::spawn(
        async move {
            if let Err(e) = run_call(state.agent.clone(), llm, socket_tx, socket_rx).await {
                error!(error = ?e, "Call terminated with error.");
            }
            info!("Call finished.");
        }
        .instrument(call_span),
    );
}

fn parse_init(text: &str) -> Result<ParticipantKind> {
    match serde_json::from_str::<ClientMessage>(text)? {
        ClientMessage::Init { participant } => Ok(participant),
        _ => Err(anyhow!("First message must be `init`")),
    }
}

fn agent_llm(agent: &AgentRuntime, provider: &Provider) -> Result<Arc<dyn LLMClient>> {
    agent.llm_client.clone().ok_or_else(|| {
        let var = provider.key_var();
        ConfigError::MissingVar(format!("{} must be set to run the voice agent", var)).into()
    })
}

/// Everything a spawned turn needs.
#[derive(Clone)]
struct TurnContext {
    llm: Arc<dyn LLMClient>,
    mcp: Peer<RoleClient>,
    system_prompt: Arc<String>,
    greeting: Arc<String>,
    call_state: Arc<Mutex<CallState>>,
    history: Arc<Mutex<Vec<ChatMessage>>>,
    socket_tx: SocketSink,
}

impl TurnContext {
    /// Runs one turn in the background: the greeting when `user_text` is `None`.
    fn spawn(&self, id: u64, user_text: Option<String>, done_tx: mpsc::Sender<u64>) -> Turn {
        let ctx = self.clone();
        let handle = tokio::spawn(
            async move {
                let reply = match user_text {
                    None => greet(ctx.llm.as_ref(), &ctx.system_prompt, &ctx.greeting).await,
                    Some(text) => {
                        let history = {
                            let mut history = ctx.history.lock().await;
                            history.push(ChatMessage::user(text));
                            history.clone()
                        };
                        let call_state = ctx.call_state.lock().await.clone();
                        run_react_cycle(
                            ctx.llm.as_ref(),
                            &ctx.mcp,
                            &ctx.system_prompt,
                            &call_state,
                            &history,
                        )
                        .await
                    }
                };

                match reply {
                    Ok(reply) if !reply.trim().is_empty() => {
                        ctx.history
                            .lock()
                            .await
                            .push(ChatMessage::assistant(reply.clone()));
                        if let Err(e) = send_reply(&ctx.socket_tx, reply).await {
                            warn!("Failed to send reply: {:?}", e);
                        }
                    }
                    Ok(_) => warn!("Model produced an empty reply."),
                    Err(e) => {
                        error!(error = ?e, "Turn failed.");
                        let _ = send_msg(
                            &mut *ctx.socket_tx.lock().await,
                            ServerMessage::Error {
                                message: format!("The agent could not respond: {}", e),
                            },
                        )
                        .await;
                    }
                }
                let _ = done_tx.send(id).await;
            }
            .in_current_span(),
        );
        Turn { id, handle }
    }
}

/// A reply being produced in the background.
struct Turn {
    id: u64,
    handle: JoinHandle<()>,
}

/// The event loop for one call.
///
/// Turns run as tasks so an `interrupt` can cancel a reply mid-flight. While a
/// tool call holds the interruption gate, interrupts are ignored and new
/// caller messages wait for the current turn to finish.
async fn run_call(
    agent: AgentRuntime,
    llm: Arc<dyn LLMClient>,
    socket_tx: SocketSink,
    mut socket_rx: SplitStream<WebSocket>,
) -> Result<()> {
    let call_state = Arc::new(Mutex::new(CallState::default()));
    let (state_update_tx, mut state_update_rx) = mpsc::channel(8);
    let gate = InterruptionGate::new();
    let mut gate_rx = gate.subscribe();
    let sales_service = SalesAgentService::new(
        agent.tools.clone(),
        gate.clone(),
        call_state.clone(),
        Some(state_update_tx),
    );
    let (server_transport, client_transport) = tokio::io::duplex(4096);

    // Spawn the agent's tool-handling service.
    let agent_tool_handle = tokio::spawn(async move {
        if let Ok(service) = sales_service.serve(server_transport).await {
            let _ = service.waiting().await;
        }
    });
    let mcp_client = ().serve(client_transport).await?;

    let ctx = TurnContext {
        llm,
        mcp: mcp_client.peer().clone(),
        system_prompt: agent.system_prompt.clone(),
        greeting: agent.greeting.clone(),
        call_state,
        history: Arc::new(Mutex::new(Vec::new())),
        socket_tx: socket_tx.clone(),
    };

    let (turn_done_tx, mut turn_done_rx) = mpsc::channel::<u64>(4);
    let mut turns = TurnQueue::new();
    let mut current_turn: Option<Turn> = None;
    let greeting = turns.greet();
    apply(greeting, &mut current_turn, &ctx, &turn_done_tx).await?;

    loop {
        let steps = tokio::select! {
            // Handle messages from the client WebSocket.
            msg = socket_rx.next() => {
                let Some(msg_result) = msg else {
                    info!("Client disconnected.");
                    break;
                };
                match msg_result {
                    Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                        Ok(ClientMessage::UserMessage { text }) => {
                            let steps = turns.user_message(text, gate.allows_interruptions());
                            if turns.pending_len() > 0 {
                                debug!(queued = turns.pending_len(), "Caller message waiting for the current turn.");
                            }
                            steps
                        }
                        Ok(ClientMessage::Interrupt) => {
                            let gate_open = gate.allows_interruptions();
                            if !gate_open {
                                debug!("Interrupt ignored while a tool call is in flight.");
                            }
                            turns.interrupt(gate_open)
                        }
                        Ok(ClientMessage::Init { .. }) => {
                            warn!("Ignoring repeated `init`.");
                            Vec::new()
                        }
                        Err(e) => {
                            warn!("Ignoring unparseable client message: {}", e);
                            Vec::new()
                        }
                    },
                    Ok(Message::Binary(_)) => {
                        warn!("Received audio data from client; only transcribed text is accepted.");
                        Vec::new()
                    }
                    Ok(Message::Close(_)) => {
                        info!("Client sent close frame. Shutting down call.");
                        break;
                    }
                    Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => Vec::new(),
                    Err(e) => {
                        error!("Error receiving from client WebSocket: {:?}", e);
                        break;
                    }
                }
            },
            // A turn finished on its own.
            Some(id) = turn_done_rx.recv() => turns.turn_done(id).into_iter().collect(),
            // Handle state updates from the tool service.
            Some(new_state) = state_update_rx.recv() => {
                let mut sink = socket_tx.lock().await;
                send_msg(&mut sink, ServerMessage::StateUpdate { state: new_state.clone() }).await?;
                if let Some(summary) = new_state.summary {
                    turns.summary_saved();
                    send_msg(&mut sink, ServerMessage::CallEnded { summary }).await?;
                }
                Vec::new()
            },
            // Tell the client when barge-in becomes possible or impossible.
            Ok(()) = gate_rx.changed() => {
                let allowed = *gate_rx.borrow_and_update() == 0;
                if let Some(allowed) = turns.gate_changed(allowed) {
                    send_msg(&mut *socket_tx.lock().await, ServerMessage::Interruptible { allowed }).await?;
                }
                Vec::new()
            },
        };

        for step in steps {
            apply(step, &mut current_turn, &ctx, &turn_done_tx).await?;
        }

        if turns.should_close() {
            info!("Summary saved and final reply delivered. Closing call.");
            break;
        }
    }

    // Clean up background tasks on exit.
    if let Some(turn) = current_turn.take() {
        turn.handle.abort();
    }
    agent_tool_handle.abort();
    info!("WebSocket connection closed and call terminated.");
    Ok(())
}

/// Carries out one [`Step`] decided by the turn queue.
async fn apply(
    step: Step,
    current_turn: &mut Option<Turn>,
    ctx: &TurnContext,
    done_tx: &mpsc::Sender<u64>,
) -> Result<()> {
    match step {
        Step::Cancel(id) => {
            let Some(turn) = current_turn.take_if(|t| t.id == id) else {
                return Ok(());
            };
            if !turn.handle.is_finished() {
                turn.handle.abort();
                info!("Caller interrupted the agent.");
                send_msg(&mut *ctx.socket_tx.lock().await, ServerMessage::Interrupted).await?;
            }
        }
        Step::Start { id, text } => {
            *current_turn = Some(ctx.spawn(id, text, done_tx.clone()));
        }
    }
    Ok(())
}

/// Sends a complete reply as a start/chunk/end sequence.
async fn send_reply(socket_tx: &SocketSink, reply: String) -> Result<()> {
    let mut sink = socket_tx.lock().await;
    send_msg(&mut sink, ServerMessage::ResponseStart).await?;
    send_msg(&mut sink, ServerMessage::ResponseChunk { chunk: reply }).await?;
    send_msg(&mut sink, ServerMessage::ResponseEnd).await?;
    Ok(())
}

/// A helper function to serialize and send a `ServerMessage` to the client.
pub(crate) async fn send_msg(
    socket_tx: &mut SplitSink<WebSocket, Message>,
    msg: ServerMessage,
) -> Result<()> {
    let serialized = serde_json::to_string(&msg)?;
    socket_tx.send(Message::Text(serialized.into())).await?;
    Ok(())
}

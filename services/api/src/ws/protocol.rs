//! Defines the WebSocket message protocol between a caller's client and the voice agent.

use salesvoice_core::{
    agent::CallState,
    lead::CallSummary,
    profile::{AgentProfile, NoiseCancellation, ParticipantKind},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Messages sent from the client to the server.
#[derive(Deserialize, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Starts the call. This must be the first message.
    Init {
        /// How the caller is connected; phone callers get telephony noise filtering.
        #[serde(default = "default_participant")]
        participant: ParticipantKind,
    },
    /// What the caller said, already transcribed.
    UserMessage { text: String },
    /// The caller started talking over the agent.
    Interrupt,
}

fn default_participant() -> ParticipantKind {
    ParticipantKind::Standard
}

/// Messages sent from the server to the client.
#[derive(Serialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Confirms the call has started and describes the speech pipeline to run.
    Initialized {
        call_id: Uuid,
        profile: AgentProfile,
        noise_cancellation: NoiseCancellation,
        state: CallState,
    },
    /// Pushes the updated call record after a lead or summary was saved.
    StateUpdate { state: CallState },
    /// Signals the beginning of an agent reply.
    ResponseStart,
    /// A chunk of an agent reply.
    ResponseChunk { chunk: String },
    /// Signals the end of an agent reply.
    ResponseEnd,
    /// Whether the caller may currently interrupt the agent.
    Interruptible { allowed: bool },
    /// The in-flight reply was abandoned because the caller interrupted.
    Interrupted,
    /// The call has been wrapped up with a saved summary.
    CallEnded { summary: CallSummary },
    /// Reports an error to the client.
    Error { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_client_messages_parse() {
        let init: ClientMessage = serde_json::from_str(r#"{"type":"init"}"#).unwrap();
        assert_eq!(
            init,
            ClientMessage::Init {
                participant: ParticipantKind::Standard
            }
        );

        let sip: ClientMessage =
            serde_json::from_str(r#"{"type":"init","participant":"sip"}"#).unwrap();
        assert_eq!(
            sip,
            ClientMessage::Init {
                participant: ParticipantKind::Sip
            }
        );

        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"user_message","text":"hello"}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::UserMessage {
                text: "hello".to_string()
            }
        );

        let interrupt: ClientMessage = serde_json::from_str(r#"{"type":"interrupt"}"#).unwrap();
        assert_eq!(interrupt, ClientMessage::Interrupt);
    }

    #[test]
    fn test_server_messages_serialize() {
        assert_eq!(
            serde_json::to_value(ServerMessage::Interruptible { allowed: false }).unwrap(),
            json!({"type": "interruptible", "allowed": false})
        );
        assert_eq!(
            serde_json::to_value(ServerMessage::ResponseChunk {
                chunk: "Hi".to_string()
            })
            .unwrap(),
            json!({"type": "response_chunk", "chunk": "Hi"})
        );
        assert_eq!(
            serde_json::to_value(ServerMessage::ResponseStart).unwrap(),
            json!({"type": "response_start"})
        );
    }

    #[test]
    fn test_unknown_message_is_rejected() {
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"set_voice"}"#).is_err());
    }
}

//! API Models
//!
//! Request and response bodies for the demo REST surface, annotated with
//! `utoipa` for the OpenAPI document.

use crate::audio_utils::Waveform;
use salesvoice_core::{
    chat::{ChatMessage, ChatRole, ChatSession, Stage, TurnOutcome},
    voices::Voice,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, Copy, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
        }
    }
}

impl From<ChatRole> for MessageRole {
    fn from(role: ChatRole) -> Self {
        match role {
            ChatRole::User => MessageRole::User,
            ChatRole::Assistant => MessageRole::Assistant,
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
pub struct Message {
    #[schema(value_type = String, example = "user")]
    pub role: MessageRole,
    pub content: String,
}

impl From<&ChatMessage> for Message {
    fn from(msg: &ChatMessage) -> Self {
        Self {
            role: msg.role.into(),
            content: msg.content.clone(),
        }
    }
}

#[derive(Serialize, ToSchema, Debug, Clone, PartialEq)]
pub struct VoiceOption {
    #[schema(example = "Ken (US Male)")]
    pub label: String,
    #[schema(example = "en-US-ken")]
    pub id: String,
}

impl From<&Voice> for VoiceOption {
    fn from(voice: &Voice) -> Self {
        Self {
            label: voice.label.to_string(),
            id: voice.id.to_string(),
        }
    }
}

#[derive(Serialize, ToSchema, Debug)]
pub struct DemoSession {
    #[schema(value_type = String, format = Uuid)]
    pub id: Uuid,
    /// Id of the Murf voice replies are spoken in.
    #[schema(example = "en-US-ken")]
    pub voice: String,
    pub messages: Vec<Message>,
    /// Whether synthesized speech is available at `/speech`.
    pub has_audio: bool,
    /// Whether fresh speech is waiting to have its waveform drawn.
    pub show_waveform: bool,
}

impl DemoSession {
    pub fn from_session(id: Uuid, session: &ChatSession) -> Self {
        Self {
            id,
            voice: session.selected_voice().to_string(),
            messages: session.messages().iter().map(Message::from).collect(),
            has_audio: session.last_audio().is_some(),
            show_waveform: session.waveform_pending(),
        }
    }
}

#[derive(Deserialize, ToSchema, Default)]
pub struct CreateSessionPayload {
    /// Voice id or label; defaults to Ken.
    #[schema(example = "Natalie (US Female)")]
    pub voice: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct TextInputPayload {
    #[schema(example = "What does Sales Cloud cost?")]
    pub text: String,
}

#[derive(Deserialize, ToSchema)]
pub struct SelectVoicePayload {
    #[schema(example = "en-UK-liv")]
    pub voice: String,
}

#[derive(Serialize, ToSchema, Debug, Clone, PartialEq)]
pub struct StageErrorBody {
    #[schema(example = "synthesis")]
    pub stage: String,
    pub message: String,
}

/// The result of one pipeline run, plus the updated conversation.
#[derive(Serialize, ToSchema, Debug)]
pub struct TurnResponse {
    /// The user's words, typed or transcribed; absent when the input was blank.
    pub user_text: Option<String>,
    pub reply: Option<String>,
    pub audio_ready: bool,
    pub error: Option<StageErrorBody>,
    /// Waveform of the recorded input, for audio turns.
    pub input_waveform: Option<Waveform>,
    pub messages: Vec<Message>,
}

impl TurnResponse {
    pub fn new(outcome: TurnOutcome, session: &ChatSession) -> Self {
        let error = outcome.failure.as_ref().map(|failure| StageErrorBody {
            stage: stage_name(failure.stage).to_string(),
            message: failure.to_string(),
        });
        Self {
            user_text: outcome.user_text,
            reply: outcome.reply,
            audio_ready: outcome.audio_ready,
            error,
            input_waveform: None,
            messages: session.messages().iter().map(Message::from).collect(),
        }
    }
}

fn stage_name(stage: Stage) -> &'static str {
    match stage {
        Stage::Transcription => "transcription",
        Stage::Chat => "chat",
        Stage::Synthesis => "synthesis",
    }
}

/// Which remote services are configured.
#[derive(Serialize, ToSchema, Debug, Clone, PartialEq)]
pub struct ServiceStatus {
    /// Gemini, used for transcription and chat.
    #[schema(example = "Connected")]
    pub gemini: String,
    /// Murf, used for speech synthesis.
    #[schema(example = "Not configured")]
    pub murf: String,
    /// The voice agent's chat provider.
    pub voice_agent: String,
    #[schema(example = "WAV")]
    pub audio_format: String,
}

impl ServiceStatus {
    pub fn label(configured: bool) -> String {
        if configured { "Connected" } else { "Not configured" }.to_string()
    }
}

#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use salesvoice_core::chat::{StageError, StageFailure};

    #[test]
    fn test_message_role_serialization() {
        assert_eq!(serde_json::to_string(&MessageRole::User).unwrap(), "\"user\"");
        assert_eq!(
            serde_json::to_string(&MessageRole::Assistant).unwrap(),
            "\"assistant\""
        );
        assert_eq!(format!("{}", MessageRole::Assistant), "assistant");
        assert!(serde_json::from_str::<MessageRole>("\"model\"").is_err());
    }

    #[test]
    fn test_message_from_chat_message() {
        let msg = Message::from(&ChatMessage::assistant("Hi there"));
        assert_eq!(msg.role, MessageRole::Assistant);
        assert_eq!(msg.content, "Hi there");
    }

    #[test]
    fn test_demo_session_view() {
        let session = ChatSession::new("en-UK-daniel");
        let id = Uuid::new_v4();
        let view = DemoSession::from_session(id, &session);

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["id"], id.to_string());
        assert_eq!(json["voice"], "en-UK-daniel");
        assert_eq!(json["messages"], serde_json::json!([]));
        assert_eq!(json["has_audio"], false);
    }

    #[test]
    fn test_turn_response_reports_stage_error() {
        let outcome = TurnOutcome {
            user_text: Some("hi".to_string()),
            failure: Some(StageFailure {
                stage: Stage::Chat,
                error: StageError::Transport("timed out".to_string()),
            }),
            ..Default::default()
        };
        let response = TurnResponse::new(outcome, &ChatSession::default());

        let error = response.error.unwrap();
        assert_eq!(error.stage, "chat");
        assert_eq!(error.message, "Error getting AI response: timed out");
    }

    #[test]
    fn test_create_session_payload_voice_is_optional() {
        let payload: CreateSessionPayload = serde_json::from_str("{}").unwrap();
        assert!(payload.voice.is_none());
    }

    #[test]
    fn test_error_response_serialization() {
        let error = ErrorResponse {
            message: "Session not found".to_string(),
        };
        assert_eq!(
            serde_json::to_string(&error).unwrap(),
            r#"{"message":"Session not found"}"#
        );
    }
}

//! Voice Chat Pipeline
//!
//! The demo's request pipeline: capture input, transcribe it when it is audio,
//! ask the chat model for a reply, synthesize that reply, and keep the running
//! conversation in a [`ChatSession`]. Each stage is one remote call; the first
//! stage to fail ends the run and is reported back to the page, leaving the
//! earlier history untouched.

use crate::{llm_client::LLMClient, voices::DEFAULT_VOICE_ID};
use anyhow::Result;
use async_openai::types::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

/// Appended in place of a reply when the chat model could not be reached.
pub const APOLOGY_MESSAGE: &str =
    "I apologize, but I encountered an error generating a response. Please try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

impl fmt::Display for ChatRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatRole::User => write!(f, "user"),
            ChatRole::Assistant => write!(f, "assistant"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Builds chat completion messages from an optional system prompt and a history.
pub fn to_request_messages(
    system_prompt: Option<&str>,
    history: &[ChatMessage],
) -> Result<Vec<ChatCompletionRequestMessage>> {
    let mut messages = Vec::with_capacity(history.len() + 1);
    if let Some(prompt) = system_prompt {
        messages.push(
            ChatCompletionRequestSystemMessageArgs::default()
                .content(prompt)
                .build()?
                .into(),
        );
    }
    for msg in history {
        match msg.role {
            ChatRole::User => messages.push(
                ChatCompletionRequestUserMessageArgs::default()
                    .content(msg.content.clone())
                    .build()?
                    .into(),
            ),
            ChatRole::Assistant => messages.push(
                ChatCompletionRequestAssistantMessageArgs::default()
                    .content(msg.content.clone())
                    .build()?
                    .into(),
            ),
        }
    }
    Ok(messages)
}

// --- Stage Errors ---

/// Why a single pipeline stage failed. Messages are shown to the user as-is.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StageError {
    #[error("{key} not found. Please provide it to enable {feature}.")]
    MissingCredential {
        key: &'static str,
        feature: &'static str,
    },
    #[error("API Error: {status} - {body}")]
    Upstream { status: u16, body: String },
    #[error("{0}")]
    Transport(String),
    #[error("{0}")]
    EmptyResponse(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Transcription,
    Chat,
    Synthesis,
}

/// The stage that ended a pipeline run early, and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageFailure {
    pub stage: Stage,
    pub error: StageError,
}

impl fmt::Display for StageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match self.stage {
            Stage::Transcription => "Error transcribing audio",
            Stage::Chat => "Error getting AI response",
            Stage::Synthesis => "Error generating speech",
        };
        write!(f, "{}: {}", prefix, self.error)
    }
}

// --- Stage Contracts ---

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Turns a WAV recording into text.
    async fn transcribe(&self, wav: &[u8]) -> Result<String, StageError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Produces the assistant's next reply to the conversation so far.
    async fn reply(&self, history: &[ChatMessage]) -> Result<String, StageError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Renders `text` in the given voice and returns the encoded audio file.
    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<Vec<u8>, StageError>;
}

/// A [`ChatModel`] backed by an [`LLMClient`]; `None` means no API key was configured.
pub struct LlmChatModel {
    client: Option<Arc<dyn LLMClient>>,
    system_prompt: Option<String>,
    credential_key: &'static str,
}

impl LlmChatModel {
    pub fn new(
        client: Option<Arc<dyn LLMClient>>,
        system_prompt: Option<String>,
        credential_key: &'static str,
    ) -> Self {
        Self {
            client,
            system_prompt,
            credential_key,
        }
    }
}

#[async_trait]
impl ChatModel for LlmChatModel {
    async fn reply(&self, history: &[ChatMessage]) -> Result<String, StageError> {
        let client = self.client.as_ref().ok_or(StageError::MissingCredential {
            key: self.credential_key,
            feature: "AI chat",
        })?;
        let messages = to_request_messages(self.system_prompt.as_deref(), history)
            .map_err(|e| StageError::Transport(e.to_string()))?;
        client
            .complete(messages)
            .await
            .map_err(|e| StageError::Transport(e.to_string()))
    }
}

// --- Session ---

/// One visitor's conversation with the demo.
///
/// Created when the page opens a session and dropped when it closes it; nothing
/// here outlives the session.
#[derive(Debug, Clone)]
pub struct ChatSession {
    messages: Vec<ChatMessage>,
    selected_voice: String,
    last_audio: Option<Vec<u8>>,
    show_waveform: bool,
}

impl Default for ChatSession {
    fn default() -> Self {
        Self::new(DEFAULT_VOICE_ID)
    }
}

impl ChatSession {
    pub fn new(voice_id: impl Into<String>) -> Self {
        Self {
            messages: Vec::new(),
            selected_voice: voice_id.into(),
            last_audio: None,
            show_waveform: false,
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn selected_voice(&self) -> &str {
        &self.selected_voice
    }

    pub fn select_voice(&mut self, voice_id: impl Into<String>) {
        self.selected_voice = voice_id.into();
    }

    pub fn last_audio(&self) -> Option<&[u8]> {
        self.last_audio.as_deref()
    }

    /// Whether fresh audio is waiting to have its waveform drawn.
    pub fn waveform_pending(&self) -> bool {
        self.show_waveform
    }

    /// Marks the pending waveform as drawn.
    pub fn take_waveform_flag(&mut self) -> bool {
        std::mem::take(&mut self.show_waveform)
    }

    /// Empties the conversation log. Voice selection and last audio are kept.
    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// The conversation as a plain-text transcript, or `None` if it is empty.
    pub fn export_transcript(&self) -> Option<String> {
        if self.messages.is_empty() {
            return None;
        }
        let mut out = String::from("Voice Chat Conversation\n");
        out.push_str(&"=".repeat(50));
        out.push_str("\n\n");
        for msg in &self.messages {
            let who = match msg.role {
                ChatRole::User => "You",
                ChatRole::Assistant => "Assistant",
            };
            out.push_str(&format!("{}:\n{}\n\n", who, msg.content));
        }
        Some(out)
    }

    fn store_audio(&mut self, audio: Vec<u8>) {
        self.last_audio = Some(audio);
        self.show_waveform = true;
    }
}

// --- Pipeline ---

/// What a single pipeline run produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TurnOutcome {
    /// The user's words, typed or transcribed.
    pub user_text: Option<String>,
    pub reply: Option<String>,
    /// Whether new speech audio was stored on the session.
    pub audio_ready: bool,
    pub failure: Option<StageFailure>,
}

impl TurnOutcome {
    fn failed(mut self, stage: Stage, error: StageError) -> Self {
        warn!(?stage, %error, "Chat pipeline stage failed");
        self.failure = Some(StageFailure { stage, error });
        self
    }

    pub fn is_noop(&self) -> bool {
        self.user_text.is_none() && self.failure.is_none()
    }
}

#[derive(Clone)]
pub struct ChatPipeline {
    transcriber: Arc<dyn Transcriber>,
    chat: Arc<dyn ChatModel>,
    speech: Arc<dyn SpeechSynthesizer>,
}

impl ChatPipeline {
    pub fn new(
        transcriber: Arc<dyn Transcriber>,
        chat: Arc<dyn ChatModel>,
        speech: Arc<dyn SpeechSynthesizer>,
    ) -> Self {
        Self {
            transcriber,
            chat,
            speech,
        }
    }

    /// Runs the pipeline for typed input. Blank input is ignored entirely.
    pub async fn submit_text(&self, session: &mut ChatSession, text: &str) -> TurnOutcome {
        let text = text.trim();
        if text.is_empty() {
            return TurnOutcome::default();
        }
        self.respond(session, text.to_string()).await
    }

    /// Runs the pipeline for a WAV recording. An empty recording is ignored.
    pub async fn submit_audio(&self, session: &mut ChatSession, wav: &[u8]) -> TurnOutcome {
        if wav.is_empty() {
            return TurnOutcome::default();
        }
        let transcript = match self.transcriber.transcribe(wav).await {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => {
                return TurnOutcome::default().failed(
                    Stage::Transcription,
                    StageError::EmptyResponse("No speech was recognized in the recording.".to_string()),
                );
            }
            Err(e) => return TurnOutcome::default().failed(Stage::Transcription, e),
        };
        info!(chars = transcript.len(), "Audio transcribed");
        self.respond(session, transcript).await
    }

    async fn respond(&self, session: &mut ChatSession, user_text: String) -> TurnOutcome {
        session.messages.push(ChatMessage::user(user_text.clone()));
        let mut outcome = TurnOutcome {
            user_text: Some(user_text),
            ..Default::default()
        };

        let reply = match self.chat.reply(&session.messages).await {
            Ok(reply) => reply,
            Err(e) => {
                session.messages.push(ChatMessage::assistant(APOLOGY_MESSAGE));
                return outcome.failed(Stage::Chat, e);
            }
        };
        session.messages.push(ChatMessage::assistant(reply.clone()));
        outcome.reply = Some(reply.clone());

        match self.speech.synthesize(&reply, &session.selected_voice).await {
            Ok(audio) if !audio.is_empty() => {
                session.store_audio(audio);
                outcome.audio_ready = true;
                outcome
            }
            Ok(_) => outcome.failed(
                Stage::Synthesis,
                StageError::EmptyResponse("The speech service returned no audio.".to_string()),
            ),
            Err(e) => outcome.failed(Stage::Synthesis, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm_client::{LLMAction, LLMStream};
    use async_openai::types::ChatCompletionTool;

    fn pipeline(
        transcriber: MockTranscriber,
        chat: MockChatModel,
        speech: MockSpeechSynthesizer,
    ) -> ChatPipeline {
        ChatPipeline::new(Arc::new(transcriber), Arc::new(chat), Arc::new(speech))
    }

    #[tokio::test]
    async fn test_blank_text_makes_no_calls() {
        let mut chat = MockChatModel::new();
        chat.expect_reply().never();
        let mut speech = MockSpeechSynthesizer::new();
        speech.expect_synthesize().never();
        let p = pipeline(MockTranscriber::new(), chat, speech);

        let mut session = ChatSession::default();
        session.messages.push(ChatMessage::user("earlier"));
        let outcome = p.submit_text(&mut session, "   \n").await;

        assert!(outcome.is_noop());
        assert_eq!(session.messages(), &[ChatMessage::user("earlier")]);
    }

    #[tokio::test]
    async fn test_successful_turn_adds_two_entries_and_audio() {
        let mut chat = MockChatModel::new();
        chat.expect_reply()
            .withf(|history| history.last() == Some(&ChatMessage::user("What is Sales Cloud?")))
            .times(1)
            .returning(|_| Ok("It's a CRM for sales teams.".to_string()));
        let mut speech = MockSpeechSynthesizer::new();
        speech
            .expect_synthesize()
            .withf(|text, voice| text == "It's a CRM for sales teams." && voice == "en-UK-liv")
            .times(1)
            .returning(|_, _| Ok(vec![1, 2, 3]));
        let p = pipeline(MockTranscriber::new(), chat, speech);

        let mut session = ChatSession::new("en-UK-liv");
        let outcome = p.submit_text(&mut session, " What is Sales Cloud? ").await;

        assert!(outcome.failure.is_none());
        assert!(outcome.audio_ready);
        assert_eq!(
            session.messages(),
            &[
                ChatMessage::user("What is Sales Cloud?"),
                ChatMessage::assistant("It's a CRM for sales teams."),
            ]
        );
        assert_eq!(session.last_audio(), Some(&[1u8, 2, 3][..]));
        assert!(session.take_waveform_flag());
        assert!(!session.take_waveform_flag());
    }

    #[tokio::test]
    async fn test_chat_failure_appends_apology_and_skips_speech() {
        let mut chat = MockChatModel::new();
        chat.expect_reply().returning(|_| {
            Err(StageError::MissingCredential {
                key: "GOOGLE_API_KEY",
                feature: "AI chat",
            })
        });
        let mut speech = MockSpeechSynthesizer::new();
        speech.expect_synthesize().never();
        let p = pipeline(MockTranscriber::new(), chat, speech);

        let mut session = ChatSession::default();
        let outcome = p.submit_text(&mut session, "hello").await;

        let failure = outcome.failure.unwrap();
        assert_eq!(failure.stage, Stage::Chat);
        assert_eq!(
            failure.to_string(),
            "Error getting AI response: GOOGLE_API_KEY not found. Please provide it to enable AI chat."
        );
        assert_eq!(session.messages().len(), 2);
        assert_eq!(session.messages()[1], ChatMessage::assistant(APOLOGY_MESSAGE));
        assert!(session.last_audio().is_none());
    }

    #[tokio::test]
    async fn test_speech_failure_keeps_reply_and_previous_audio() {
        let mut chat = MockChatModel::new();
        chat.expect_reply().returning(|_| Ok("Sure.".to_string()));
        let mut speech = MockSpeechSynthesizer::new();
        speech.expect_synthesize().returning(|_, _| {
            Err(StageError::Upstream {
                status: 401,
                body: "invalid api-key".to_string(),
            })
        });
        let p = pipeline(MockTranscriber::new(), chat, speech);

        let mut session = ChatSession::default();
        session.store_audio(vec![9]);
        session.take_waveform_flag();
        let outcome = p.submit_text(&mut session, "hi").await;

        assert_eq!(outcome.reply.as_deref(), Some("Sure."));
        assert!(!outcome.audio_ready);
        assert_eq!(
            outcome.failure.unwrap().to_string(),
            "Error generating speech: API Error: 401 - invalid api-key"
        );
        assert_eq!(session.last_audio(), Some(&[9u8][..]));
        assert!(!session.waveform_pending());
    }

    #[tokio::test]
    async fn test_audio_turn_uses_transcript() {
        let mut transcriber = MockTranscriber::new();
        transcriber
            .expect_transcribe()
            .withf(|wav| wav == b"RIFF")
            .returning(|_| Ok("  book a demo \n".to_string()));
        let mut chat = MockChatModel::new();
        chat.expect_reply().returning(|_| Ok("Happy to help.".to_string()));
        let mut speech = MockSpeechSynthesizer::new();
        speech.expect_synthesize().returning(|_, _| Ok(vec![0; 4]));
        let p = pipeline(transcriber, chat, speech);

        let mut session = ChatSession::default();
        let outcome = p.submit_audio(&mut session, b"RIFF").await;

        assert_eq!(outcome.user_text.as_deref(), Some("book a demo"));
        assert_eq!(session.messages()[0], ChatMessage::user("book a demo"));
        assert_eq!(session.messages().len(), 2);
    }

    #[tokio::test]
    async fn test_transcription_failure_leaves_history_alone() {
        let mut transcriber = MockTranscriber::new();
        transcriber
            .expect_transcribe()
            .returning(|_| Err(StageError::Transport("connection reset".to_string())));
        let mut chat = MockChatModel::new();
        chat.expect_reply().never();
        let p = pipeline(transcriber, chat, MockSpeechSynthesizer::new());

        let mut session = ChatSession::default();
        let outcome = p.submit_audio(&mut session, b"RIFF").await;

        assert_eq!(outcome.failure.unwrap().stage, Stage::Transcription);
        assert!(session.messages().is_empty());
    }

    #[tokio::test]
    async fn test_empty_recording_is_ignored() {
        let mut transcriber = MockTranscriber::new();
        transcriber.expect_transcribe().never();
        let p = pipeline(transcriber, MockChatModel::new(), MockSpeechSynthesizer::new());

        let mut session = ChatSession::default();
        assert!(p.submit_audio(&mut session, &[]).await.is_noop());
    }

    #[test]
    fn test_clear_keeps_voice() {
        let mut session = ChatSession::new("en-US-terrell");
        session.messages.push(ChatMessage::user("hi"));
        session.clear();
        assert!(session.messages().is_empty());
        assert_eq!(session.selected_voice(), "en-US-terrell");
    }

    #[test]
    fn test_export_transcript_format() {
        let mut session = ChatSession::default();
        assert!(session.export_transcript().is_none());

        session.messages.push(ChatMessage::user("Hi"));
        session.messages.push(ChatMessage::assistant("Hello!"));
        let expected = format!(
            "Voice Chat Conversation\n{}\n\nYou:\nHi\n\nAssistant:\nHello!\n\n",
            "=".repeat(50)
        );
        assert_eq!(session.export_transcript().unwrap(), expected);
    }

    struct EchoLlm;

    #[async_trait]
    impl LLMClient for EchoLlm {
        async fn decide_action(
            &self,
            _messages: Vec<ChatCompletionRequestMessage>,
            _tools: Vec<ChatCompletionTool>,
        ) -> Result<LLMAction> {
            unreachable!("the demo never asks for tool decisions")
        }

        async fn stream_reply(
            &self,
            _messages: Vec<ChatCompletionRequestMessage>,
        ) -> Result<LLMStream> {
            unreachable!("the demo never streams")
        }

        async fn complete(&self, messages: Vec<ChatCompletionRequestMessage>) -> Result<String> {
            Ok(format!("{} messages", messages.len()))
        }
    }

    #[tokio::test]
    async fn test_llm_chat_model_sends_full_history() {
        let model = LlmChatModel::new(
            Some(Arc::new(EchoLlm)),
            Some("Be brief.".to_string()),
            "GOOGLE_API_KEY",
        );
        let history = vec![
            ChatMessage::user("a"),
            ChatMessage::assistant("b"),
            ChatMessage::user("c"),
        ];
        assert_eq!(model.reply(&history).await.unwrap(), "4 messages");
    }

    #[tokio::test]
    async fn test_llm_chat_model_without_key() {
        let model = LlmChatModel::new(None, None, "GOOGLE_API_KEY");
        let err = model.reply(&[ChatMessage::user("a")]).await.unwrap_err();
        assert!(matches!(err, StageError::MissingCredential { key: "GOOGLE_API_KEY", .. }));
    }
}

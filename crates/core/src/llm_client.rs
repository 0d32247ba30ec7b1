//! Chat completion seam shared by the voice agent and the demo.
//!
//! Callers build the full message list, system prompt included; the client
//! only knows which model to ask.

use anyhow::{Result, anyhow};
use async_openai::{
    Client,
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        ChatCompletionRequestMessage, ChatCompletionResponseMessage, ChatCompletionTool,
        ChatCompletionToolChoiceOption, CreateChatCompletionRequest,
        CreateChatCompletionRequestArgs,
    },
};
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use std::pin::Pin;
use tracing::debug;

pub type ToolCall = async_openai::types::ChatCompletionMessageToolCall;

#[derive(Debug, Clone)]
pub enum LLMStreamEvent {
    TextChunk(String),
}

/// Text chunks of a streamed reply, in order.
pub type LLMStream = Pin<Box<dyn Stream<Item = Result<LLMStreamEvent, OpenAIError>> + Send>>;

/// What the model chose to do with a turn.
#[derive(Debug, Clone)]
pub enum LLMAction {
    /// Speak this text to the caller.
    TextResponse(String),
    /// Run these tools first.
    ToolCall(Vec<ToolCall>),
}

#[async_trait]
pub trait LLMClient: Send + Sync {
    /// Asks the model, with `tools` on offer, whether to reply or call tools.
    async fn decide_action(
        &self,
        messages: Vec<ChatCompletionRequestMessage>,
        tools: Vec<ChatCompletionTool>,
    ) -> Result<LLMAction>;

    /// Streams the reply once tool results are part of `messages`.
    async fn stream_reply(&self, messages: Vec<ChatCompletionRequestMessage>) -> Result<LLMStream>;

    /// A single tool-free reply.
    async fn complete(&self, messages: Vec<ChatCompletionRequestMessage>) -> Result<String>;
}

/// [`LLMClient`] for OpenAI and any service speaking its chat completions API,
/// such as Gemini's compatibility endpoint.
pub struct OpenAICompatibleClient {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAICompatibleClient {
    pub fn new(config: OpenAIConfig, model: String) -> Self {
        Self {
            client: Client::with_config(config),
            model,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn request(
        &self,
        messages: Vec<ChatCompletionRequestMessage>,
    ) -> CreateChatCompletionRequestArgs {
        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(&self.model).messages(messages);
        args
    }

    async fn first_message(
        &self,
        request: CreateChatCompletionRequest,
    ) -> Result<ChatCompletionResponseMessage> {
        let response = self.client.chat().create(request).await?;
        debug!(model = %self.model, usage = ?response.usage, "Chat completion finished");
        response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message)
            .ok_or_else(|| anyhow!("LLM response contained no choices."))
    }
}

#[async_trait]
impl LLMClient for OpenAICompatibleClient {
    async fn decide_action(
        &self,
        messages: Vec<ChatCompletionRequestMessage>,
        tools: Vec<ChatCompletionTool>,
    ) -> Result<LLMAction> {
        let request = self
            .request(messages)
            .tools(tools)
            .tool_choice(ChatCompletionToolChoiceOption::Auto)
            .build()?;

        let message = self.first_message(request).await?;
        match (message.tool_calls, message.content) {
            (Some(calls), _) if !calls.is_empty() => Ok(LLMAction::ToolCall(calls)),
            (_, Some(text)) => Ok(LLMAction::TextResponse(text)),
            _ => Err(anyhow!(
                "LLM response had neither text content nor tool calls."
            )),
        }
    }

    async fn stream_reply(&self, messages: Vec<ChatCompletionRequestMessage>) -> Result<LLMStream> {
        let request = self.request(messages).stream(true).build()?;
        let stream = self.client.chat().create_stream(request).await?;

        Ok(Box::pin(stream.filter_map(|item| async move {
            match item {
                Ok(response) => response
                    .choices
                    .into_iter()
                    .next()
                    .and_then(|choice| choice.delta.content)
                    .filter(|text| !text.is_empty())
                    .map(|text| Ok(LLMStreamEvent::TextChunk(text))),
                Err(e) => Some(Err(e)),
            }
        })))
    }

    async fn complete(&self, messages: Vec<ChatCompletionRequestMessage>) -> Result<String> {
        let request = self.request(messages).build()?;
        self.first_message(request)
            .await?
            .content
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| anyhow!("LLM response had no text content."))
    }
}

//! Sales Agent Tool Service
//!
//! This module exposes the sales agent's remote tools over the Model Context
//! Protocol (MCP). Each tool forwards its arguments to a hosted endpoint via
//! [`ToolClient`] and hands the response body back to the language model,
//! which decides what to say next. The only local state is the per-call
//! record of which lead and summary have already been persisted.

use crate::{
    lead::{CallSummary, Lead},
    tools::{InterruptionGate, ToolClient, ToolEndpoint, ToolError},
};
use rmcp::{
    ServerHandler,
    handler::server::{router::tool::ToolRouter, tool::Parameters},
    model::{ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router,
};
use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

// --- Call State ---

/// What has been persisted for the current call.
#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone, Default, PartialEq)]
pub struct CallState {
    /// The lead as it was accepted by the lead store.
    pub lead: Option<Lead>,
    /// The end-of-call record, present once the call has been wrapped up.
    pub summary: Option<CallSummary>,
}

impl CallState {
    pub fn is_ended(&self) -> bool {
        self.summary.is_some()
    }
}

// --- Tool Arguments ---

#[derive(Deserialize, JsonSchema, Debug)]
pub struct MurfTtsArgs {
    #[schemars(description = "The message to be spoken")]
    pub text: String,
}

#[derive(Deserialize, JsonSchema, Debug)]
pub struct FaqSearchArgs {
    #[schemars(description = "The caller's question in natural language")]
    pub query: String,
}

#[derive(Deserialize, JsonSchema, Debug)]
pub struct SaveSummaryArgs {
    #[schemars(description = "A short recap of the call")]
    pub summary: String,
    /// Accepted for compatibility; the lead saved earlier in the call is what gets stored.
    #[serde(default, deserialize_with = "lead_object_or_json_text")]
    #[schemars(with = "Option<Lead>")]
    pub lead: Option<Lead>,
}

/// Models sometimes send the lead as a JSON document inside a string.
fn lead_object_or_json_text<'de, D>(deserializer: D) -> Result<Option<Lead>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    match value {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(text)) => serde_json::from_str(&text)
            .map(Some)
            .map_err(serde::de::Error::custom),
        Some(other) => serde_json::from_value(other)
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

// --- Service and Handler Implementation ---

/// MCP service exposing `murf_tts`, `faq_search`, `save_lead` and `save_summary`.
pub struct SalesAgentService {
    /// Per-call record, shared with the session that owns the call.
    pub call_state: Arc<tokio::sync::Mutex<CallState>>,
    /// Receives a snapshot whenever `call_state` changes.
    pub state_tx: Option<mpsc::Sender<CallState>>,
    tools: ToolClient,
    gate: InterruptionGate,
    tool_router: ToolRouter<Self>,
}

#[tool_handler]
impl ServerHandler for SalesAgentService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

#[tool_router]
impl SalesAgentService {
    pub fn new(
        tools: ToolClient,
        gate: InterruptionGate,
        call_state: Arc<tokio::sync::Mutex<CallState>>,
        state_tx: Option<mpsc::Sender<CallState>>,
    ) -> Self {
        Self {
            call_state,
            state_tx,
            tools,
            gate,
            tool_router: Self::tool_router(),
        }
    }

    #[tool(description = "Generate speech audio using Murf AI and return an audio_url.")]
    pub async fn murf_tts(&self, args: Parameters<MurfTtsArgs>) -> Result<String, String> {
        info!("Executing tool 'murf_tts'");
        self.speak(&args.0.text).await.map_err(|e| e.to_string())
    }

    #[tool(description = "Search Salesforce FAQs and return the best matching answer.")]
    pub async fn faq_search(&self, args: Parameters<FaqSearchArgs>) -> Result<String, String> {
        info!(query = %args.0.query, "Executing tool 'faq_search'");
        self.search_faq(&args.0.query)
            .await
            .map_err(|e| e.to_string())
    }

    #[tool(
        description = "Stores the caller's lead information such as name, email, company, and use case."
    )]
    pub async fn save_lead(&self, args: Parameters<Lead>) -> Result<String, String> {
        info!(timeline = ?args.0.timeline_bucket(), "Executing tool 'save_lead'");
        self.store_lead(args.0).await.map_err(|e| e.to_string())
    }

    #[tool(description = "Stores the conversation summary and lead details after the call ends.")]
    pub async fn save_summary(&self, args: Parameters<SaveSummaryArgs>) -> Result<String, String> {
        info!("Executing tool 'save_summary'");
        let SaveSummaryArgs { summary, lead } = args.0;
        self.store_summary(summary, lead)
            .await
            .map_err(|e| e.to_string())
    }
}

impl SalesAgentService {
    /// Asks the hosted TTS endpoint to render `text`; the body usually carries an audio URL.
    pub async fn speak(&self, text: &str) -> Result<String, ToolError> {
        let _hold = self.gate.disallow();
        self.tools
            .invoke(ToolEndpoint::MurfTts, &json!({ "text": text }))
            .await
    }

    pub async fn search_faq(&self, query: &str) -> Result<String, ToolError> {
        let _hold = self.gate.disallow();
        self.tools
            .invoke(ToolEndpoint::FaqSearch, &json!({ "query": query }))
            .await
    }

    /// Persists the lead once per call. A rejected or failed save may be retried.
    pub async fn store_lead(&self, lead: Lead) -> Result<String, ToolError> {
        let _hold = self.gate.disallow();
        let lead = lead.trimmed();
        lead.validate()
            .map_err(|e| ToolError::InvalidArguments(e.to_string()))?;
        if self.call_state.lock().await.lead.is_some() {
            return Err(ToolError::InvalidArguments(
                "a lead has already been saved for this call".to_string(),
            ));
        }

        let body = self.tools.invoke(ToolEndpoint::SaveLead, &lead).await?;

        let mut state = self.call_state.lock().await;
        state.lead = Some(lead);
        info!(email = ?state.lead.as_ref().map(|l| &l.email), "Lead saved");
        self.publish(&state).await;
        Ok(body)
    }

    /// Persists the end-of-call summary against the lead saved earlier.
    pub async fn store_summary(
        &self,
        summary: String,
        supplied: Option<Lead>,
    ) -> Result<String, ToolError> {
        let _hold = self.gate.disallow();
        if summary.trim().is_empty() {
            return Err(ToolError::InvalidArguments(
                "summary must not be empty".to_string(),
            ));
        }

        let lead = {
            let state = self.call_state.lock().await;
            if state.is_ended() {
                return Err(ToolError::InvalidArguments(
                    "a summary has already been saved for this call".to_string(),
                ));
            }
            let saved = state.lead.clone().ok_or_else(|| {
                ToolError::InvalidArguments(
                    "save_lead must succeed before save_summary".to_string(),
                )
            })?;
            if supplied.map(Lead::trimmed).is_some_and(|l| l != saved) {
                warn!("Summary lead differs from the saved lead; using the saved one.");
            }
            saved
        };

        let record = CallSummary { summary, lead };
        let body = self.tools.invoke(ToolEndpoint::SaveSummary, &record).await?;

        let mut state = self.call_state.lock().await;
        state.summary = Some(record);
        info!("Call summary saved");
        self.publish(&state).await;
        Ok(body)
    }

    async fn publish(&self, state: &CallState) {
        if let Some(tx) = &self.state_tx {
            if tx.send(state.clone()).await.is_err() {
                warn!("Failed to broadcast call state: receiver dropped.");
            }
        }
    }
}

//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds all shared
//! resources: the voice agent's runtime pieces and the demo session store.

use crate::{config::Config, demo::DemoState};
use salesvoice_core::{llm_client::LLMClient, profile::AgentProfile, tools::ToolClient};
use std::sync::Arc;

/// What every voice agent call is built from.
#[derive(Clone)]
pub struct AgentRuntime {
    /// `None` when the provider's API key is not configured.
    pub llm_client: Option<Arc<dyn LLMClient>>,
    pub system_prompt: Arc<String>,
    /// Instruction for the opening line of each call.
    pub greeting: Arc<String>,
    pub profile: AgentProfile,
    pub tools: ToolClient,
}

/// The shared application state, created once at startup and passed to all handlers.
pub struct AppState {
    pub agent: AgentRuntime,
    pub demo: DemoState,
    pub config: Arc<Config>,
}

//! Core of the sales voice agent: the remote tool contract, the conversational
//! agent exposed as an MCP tool server, and the demo voice-chat pipeline.

pub mod agent;
pub mod chat;
pub mod gemini;
pub mod lead;
pub mod llm_client;
pub mod murf;
pub mod profile;
pub mod tools;
pub mod voices;

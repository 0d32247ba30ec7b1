//! Main Entrypoint for the Sales Voice API Service
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Loading the conversational policy from the prompts directory.
//! 3. Initializing the voice agent's LLM and tool clients and the demo pipeline.
//! 4. Constructing the Axum router and applying middleware.
//! 5. Starting the web server and handling graceful shutdown.

use anyhow::Context;
use async_openai::config::OpenAIConfig;
use salesvoice_api::{
    config::{Config, Provider},
    demo::DemoState,
    router::create_router,
    state::{AgentRuntime, AppState},
};
use salesvoice_core::{
    chat::{ChatPipeline, LlmChatModel},
    gemini::GeminiTranscriber,
    llm_client::{LLMClient, OpenAICompatibleClient},
    murf::MurfClient,
    tools::ToolClient,
};
use std::{collections::HashMap, fs, net::SocketAddr, sync::Arc};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

const DEFAULT_GREETING: &str = "Greet the user and offer your assistance.";

/// Listens for the `Ctrl+C` signal to gracefully shut down the server.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to install Ctrl+C handler: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal. Shutting down gracefully...");
}

/// A helper function to load prompts from a directory.
fn load_prompts(prompts_path: &std::path::Path) -> anyhow::Result<HashMap<String, String>> {
    let mut prompts = HashMap::new();
    for entry in std::fs::read_dir(prompts_path)
        .with_context(|| format!("Could not read prompts directory {}", prompts_path.display()))?
    {
        let entry = entry?;
        let path = entry.path();
        if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("md") {
            let prompt_key = path
                .file_stem()
                .and_then(|s| s.to_str())
                .context("Could not get file stem")?
                .to_string();
            let content = fs::read_to_string(&path)?;
            prompts.insert(prompt_key, content);
        }
    }
    Ok(prompts)
}

fn openai_config(api_key: &str, api_base: &str) -> OpenAIConfig {
    OpenAIConfig::new()
        .with_api_key(api_key)
        .with_api_base(api_base)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
    info!("Configuration loaded. Initializing application state...");

    // --- 3. Load Conversational Policy ---
    let prompts = load_prompts(&config.prompts_path)?;
    let system_prompt = Arc::new(
        prompts
            .get("system_prompt")
            .context("system_prompt.md not found in prompts directory")?
            .trim()
            .to_string(),
    );
    let greeting = Arc::new(
        prompts
            .get("greeting")
            .map(|g| g.trim().to_string())
            .unwrap_or_else(|| DEFAULT_GREETING.to_string()),
    );

    // --- 4. Initialize Shared Services ---
    let agent_llm: Option<Arc<dyn LLMClient>> = match config.agent_api_key() {
        Some(api_key) => {
            info!(provider = ?config.provider, "Voice agent LLM configured.");
            Some(Arc::new(OpenAICompatibleClient::new(
                openai_config(api_key, config.provider.api_base()),
                config.chat_model.clone(),
            )))
        }
        None => {
            warn!(
                "{} is not set; voice agent calls will be refused.",
                config.provider.key_var()
            );
            None
        }
    };

    let tools = ToolClient::new(config.tools_base_url.clone(), config.tool_timeout);
    info!(base_url = %tools.base_url(), timeout = ?tools.timeout(), "Tool endpoints configured.");

    let demo_llm: Option<Arc<dyn LLMClient>> = config.google_api_key.as_deref().map(|key| {
        Arc::new(OpenAICompatibleClient::new(
            openai_config(key, Provider::Gemini.api_base()),
            config.demo_chat_model.clone(),
        )) as Arc<dyn LLMClient>
    });
    let transcriber =
        GeminiTranscriber::new(config.google_api_key.clone(), config.demo_chat_model.clone());
    let murf = MurfClient::new(config.murf_api_key.clone(), config.murf_audio_format);
    if !transcriber.is_configured() {
        warn!("GOOGLE_API_KEY is not set; demo transcription and chat are disabled.");
    }
    if !murf.is_configured() {
        warn!("MURF_API_KEY is not set; demo speech synthesis is disabled.");
    }
    let demo = DemoState::new(
        ChatPipeline::new(
            Arc::new(transcriber),
            Arc::new(LlmChatModel::new(demo_llm, None, "GOOGLE_API_KEY")),
            Arc::new(murf),
        ),
        config.murf_audio_format,
        config.google_api_key.is_some(),
        config.murf_api_key.is_some(),
    );

    let app_state = Arc::new(AppState {
        agent: AgentRuntime {
            llm_client: agent_llm,
            system_prompt,
            greeting,
            profile: config.profile.clone(),
            tools,
        },
        demo,
        config: Arc::new(config.clone()),
    });

    // --- 5. Create Router and Apply Middleware ---
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(app_state).layer(cors);

    // --- 6. Start Server ---
    info!(
        provider = ?config.provider,
        model = %config.chat_model,
        agent = %config.profile.agent_name,
        bind_address = %config.bind_address,
        "Service configured. Starting server..."
    );
    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server has shut down.");
    Ok(())
}

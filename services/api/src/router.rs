//! Axum Router Configuration
//!
//! This module defines the complete HTTP routing for the application,
//! including the demo REST API, the voice agent WebSocket endpoint, and the
//! OpenAPI documentation.

use crate::{
    audio_utils::Waveform,
    handlers,
    models::{
        CreateSessionPayload, DemoSession, ErrorResponse, Message, MessageRole,
        SelectVoicePayload, ServiceStatus, StageErrorBody, TextInputPayload, TurnResponse,
        VoiceOption,
    },
    state::AppState,
    ws::ws_handler,
};

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{delete, get, post, put},
};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Upper bound for uploaded recordings.
pub const MAX_AUDIO_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::list_voices,
        handlers::service_status,
        handlers::create_session,
        handlers::get_session,
        handlers::delete_session,
        handlers::submit_text,
        handlers::submit_audio,
        handlers::clear_messages,
        handlers::select_voice,
        handlers::get_speech,
        handlers::get_waveform,
        handlers::export_conversation,
    ),
    components(
        schemas(DemoSession, Message, MessageRole, CreateSessionPayload, TextInputPayload, SelectVoicePayload, TurnResponse, StageErrorBody, VoiceOption, ServiceStatus, Waveform, ErrorResponse)
    ),
    tags(
        (name = "Sales Voice Demo", description = "Voice chat demo: transcription, chat replies and Murf speech")
    )
)]
pub struct ApiDoc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    let demo_router = Router::new()
        .route("/voices", get(handlers::list_voices))
        .route("/status", get(handlers::service_status))
        .route("/sessions", post(handlers::create_session))
        .route(
            "/sessions/{id}",
            get(handlers::get_session).delete(handlers::delete_session),
        )
        .route("/sessions/{id}/text", post(handlers::submit_text))
        .route(
            "/sessions/{id}/audio",
            post(handlers::submit_audio).layer(DefaultBodyLimit::max(MAX_AUDIO_UPLOAD_BYTES)),
        )
        .route("/sessions/{id}/messages", delete(handlers::clear_messages))
        .route("/sessions/{id}/voice", put(handlers::select_voice))
        .route("/sessions/{id}/speech", get(handlers::get_speech))
        .route("/sessions/{id}/waveform", get(handlers::get_waveform))
        .route("/sessions/{id}/export", get(handlers::export_conversation));

    // Group all routes that require AppState into their own router.
    let api_router = Router::new()
        .route("/", get(handlers::index))
        .nest("/demo", demo_router)
        .route("/ws", get(ws_handler))
        // Apply the state ONLY to this group of routes.
        .with_state(app_state);

    // Create the final router that merges the stateful routes
    // with the stateless routes (like Swagger UI).
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(api_router)
}

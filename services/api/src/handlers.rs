//! Axum Handlers for the demo REST API
//!
//! Each handler works on one in-memory [`ChatSession`](salesvoice_core::chat::ChatSession)
//! looked up by id. Pipeline stage failures are not HTTP errors: they come
//! back inside a `200` [`TurnResponse`] so the page can show them inline.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{Html, IntoResponse, Json, Response},
};
use salesvoice_core::voices::{DEFAULT_VOICE_ID, MURF_VOICES, resolve_voice};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    audio_utils::{WAVEFORM_POINTS, Waveform, waveform_from_wav},
    demo::SharedSession,
    models::{
        CreateSessionPayload, DemoSession, ErrorResponse, SelectVoicePayload, ServiceStatus,
        TextInputPayload, TurnResponse, VoiceOption,
    },
    state::AppState,
};

pub const EXPORT_FILE_NAME: &str = "voice_chat_conversation.txt";

const INDEX_HTML: &str = include_str!("../static/index.html");

pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Unprocessable(String),
    InternalServerError(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(ErrorResponse { message })).into_response()
            }
            ApiError::NotFound(message) => {
                (StatusCode::NOT_FOUND, Json(ErrorResponse { message })).into_response()
            }
            ApiError::Unprocessable(message) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(ErrorResponse { message }),
            )
                .into_response(),
            ApiError::InternalServerError(err) => {
                error!("Internal Server Error: {:?}", err);
                let message = "An internal server error occurred.".to_string();
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse { message }),
                )
                    .into_response()
            }
        }
    }
}

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::InternalServerError(err.into())
    }
}

async fn find_session(state: &AppState, id: Uuid) -> Result<SharedSession, ApiError> {
    state
        .demo
        .sessions
        .get(id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("Session with id '{}' not found", id)))
}

fn voice_id_for(query: &str) -> Result<&'static str, ApiError> {
    resolve_voice(query)
        .map(|v| v.id)
        .ok_or_else(|| ApiError::BadRequest(format!("Unknown voice '{}'", query)))
}

/// Serve the single-page demo UI.
pub async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// List the voices replies can be spoken in.
#[utoipa::path(
    get,
    path = "/demo/voices",
    responses((status = 200, description = "Voice catalogue", body = [VoiceOption]))
)]
pub async fn list_voices() -> Json<Vec<VoiceOption>> {
    Json(MURF_VOICES.iter().map(VoiceOption::from).collect())
}

/// Report which remote services are configured.
#[utoipa::path(
    get,
    path = "/demo/status",
    responses((status = 200, description = "Service status", body = ServiceStatus))
)]
pub async fn service_status(State(state): State<Arc<AppState>>) -> Json<ServiceStatus> {
    Json(ServiceStatus {
        gemini: ServiceStatus::label(state.demo.gemini_configured),
        murf: ServiceStatus::label(state.demo.murf_configured),
        voice_agent: ServiceStatus::label(state.agent.llm_client.is_some()),
        audio_format: format!("{:?}", state.demo.audio_format).to_uppercase(),
    })
}

/// Open a new demo conversation.
#[utoipa::path(
    post,
    path = "/demo/sessions",
    request_body = CreateSessionPayload,
    responses(
        (status = 201, description = "Session created", body = DemoSession),
        (status = 400, description = "Unknown voice", body = ErrorResponse)
    )
)]
pub async fn create_session(
    State(state): State<Arc<AppState>>,
    payload: Option<Json<CreateSessionPayload>>,
) -> Result<impl IntoResponse, ApiError> {
    let payload = payload.map(|Json(p)| p).unwrap_or_default();
    let voice_id = match payload.voice.as_deref() {
        Some(query) => voice_id_for(query)?,
        None => DEFAULT_VOICE_ID,
    };

    let (id, session) = state.demo.sessions.create(voice_id).await;
    let view = DemoSession::from_session(id, &*session.lock().await);
    Ok((StatusCode::CREATED, Json(view)))
}

/// Get a session's conversation and settings.
#[utoipa::path(
    get,
    path = "/demo/sessions/{id}",
    responses(
        (status = 200, description = "Session details", body = DemoSession),
        (status = 404, description = "Session not found", body = ErrorResponse)
    ),
    params(("id" = Uuid, Path, description = "Session ID"))
)]
pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<DemoSession>, ApiError> {
    let session = find_session(&state, id).await?;
    let view = DemoSession::from_session(id, &*session.lock().await);
    Ok(Json(view))
}

/// Close a session and discard its conversation.
#[utoipa::path(
    delete,
    path = "/demo/sessions/{id}",
    responses(
        (status = 204, description = "Session closed"),
        (status = 404, description = "Session not found", body = ErrorResponse)
    ),
    params(("id" = Uuid, Path, description = "Session ID"))
)]
pub async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    if state.demo.sessions.remove(id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!(
            "Session with id '{}' not found",
            id
        )))
    }
}

/// Send a typed message through the pipeline.
#[utoipa::path(
    post,
    path = "/demo/sessions/{id}/text",
    request_body = TextInputPayload,
    responses(
        (status = 200, description = "Pipeline result; stage failures are reported in `error`", body = TurnResponse),
        (status = 404, description = "Session not found", body = ErrorResponse)
    ),
    params(("id" = Uuid, Path, description = "Session ID"))
)]
pub async fn submit_text(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<TextInputPayload>,
) -> Result<Json<TurnResponse>, ApiError> {
    let session = find_session(&state, id).await?;
    let mut session = session.lock().await;
    let outcome = state.demo.pipeline.submit_text(&mut session, &payload.text).await;
    if !outcome.is_noop() {
        info!(session_id = %id, failed = outcome.failure.is_some(), "Text turn finished");
    }
    Ok(Json(TurnResponse::new(outcome, &session)))
}

/// Send a WAV recording through the pipeline.
#[utoipa::path(
    post,
    path = "/demo/sessions/{id}/audio",
    request_body(content = Vec<u8>, content_type = "audio/wav"),
    responses(
        (status = 200, description = "Pipeline result with the recording's waveform", body = TurnResponse),
        (status = 404, description = "Session not found", body = ErrorResponse)
    ),
    params(("id" = Uuid, Path, description = "Session ID"))
)]
pub async fn submit_audio(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    body: Bytes,
) -> Result<Json<TurnResponse>, ApiError> {
    let session = find_session(&state, id).await?;
    let mut session = session.lock().await;
    let outcome = state.demo.pipeline.submit_audio(&mut session, &body).await;
    info!(session_id = %id, bytes = body.len(), failed = outcome.failure.is_some(), "Audio turn finished");

    let mut response = TurnResponse::new(outcome, &session);
    if !body.is_empty() {
        response.input_waveform = match waveform_from_wav(&body, WAVEFORM_POINTS) {
            Ok(waveform) => Some(waveform),
            Err(e) => {
                warn!(session_id = %id, "{}", e);
                None
            }
        };
    }
    Ok(Json(response))
}

/// Clear the conversation. The selected voice is kept.
#[utoipa::path(
    delete,
    path = "/demo/sessions/{id}/messages",
    responses(
        (status = 200, description = "Conversation cleared", body = DemoSession),
        (status = 404, description = "Session not found", body = ErrorResponse)
    ),
    params(("id" = Uuid, Path, description = "Session ID"))
)]
pub async fn clear_messages(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<DemoSession>, ApiError> {
    let session = find_session(&state, id).await?;
    let mut session = session.lock().await;
    session.clear();
    Ok(Json(DemoSession::from_session(id, &session)))
}

/// Choose the voice future replies are spoken in.
#[utoipa::path(
    put,
    path = "/demo/sessions/{id}/voice",
    request_body = SelectVoicePayload,
    responses(
        (status = 200, description = "Voice selected", body = DemoSession),
        (status = 400, description = "Unknown voice", body = ErrorResponse),
        (status = 404, description = "Session not found", body = ErrorResponse)
    ),
    params(("id" = Uuid, Path, description = "Session ID"))
)]
pub async fn select_voice(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SelectVoicePayload>,
) -> Result<Json<DemoSession>, ApiError> {
    let voice_id = voice_id_for(&payload.voice)?;
    let session = find_session(&state, id).await?;
    let mut session = session.lock().await;
    session.select_voice(voice_id);
    Ok(Json(DemoSession::from_session(id, &session)))
}

/// Download the most recent synthesized reply.
#[utoipa::path(
    get,
    path = "/demo/sessions/{id}/speech",
    responses(
        (status = 200, description = "Audio file", body = Vec<u8>, content_type = "audio/wav"),
        (status = 404, description = "Session or audio not found", body = ErrorResponse)
    ),
    params(("id" = Uuid, Path, description = "Session ID"))
)]
pub async fn get_speech(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let session = find_session(&state, id).await?;
    let session = session.lock().await;
    let audio = session
        .last_audio()
        .ok_or_else(|| ApiError::NotFound("No speech has been generated yet".to_string()))?
        .to_vec();
    Ok((
        [(header::CONTENT_TYPE, state.demo.audio_format.mime_type())],
        audio,
    )
        .into_response())
}

/// Waveform of the most recent synthesized reply. Marks it as drawn.
#[utoipa::path(
    get,
    path = "/demo/sessions/{id}/waveform",
    responses(
        (status = 200, description = "Peak envelope", body = Waveform),
        (status = 404, description = "Session or audio not found", body = ErrorResponse),
        (status = 422, description = "Audio could not be decoded", body = ErrorResponse)
    ),
    params(("id" = Uuid, Path, description = "Session ID"))
)]
pub async fn get_waveform(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Waveform>, ApiError> {
    let session = find_session(&state, id).await?;
    let mut session = session.lock().await;
    let audio = session
        .last_audio()
        .ok_or_else(|| ApiError::NotFound("No speech has been generated yet".to_string()))?;
    let waveform = waveform_from_wav(audio, WAVEFORM_POINTS);
    session.take_waveform_flag();
    waveform
        .map(Json)
        .map_err(|e| ApiError::Unprocessable(e.to_string()))
}

/// Download the conversation as a text file.
#[utoipa::path(
    get,
    path = "/demo/sessions/{id}/export",
    responses(
        (status = 200, description = "Transcript", body = String, content_type = "text/plain"),
        (status = 404, description = "Session not found or conversation empty", body = ErrorResponse)
    ),
    params(("id" = Uuid, Path, description = "Session ID"))
)]
pub async fn export_conversation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let session = find_session(&state, id).await?;
    let transcript = session
        .lock()
        .await
        .export_transcript()
        .ok_or_else(|| ApiError::NotFound("There is no conversation to export".to_string()))?;
    Ok((
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", EXPORT_FILE_NAME),
            ),
        ],
        transcript,
    )
        .into_response())
}

//! Speech-to-text through Gemini's `generateContent` endpoint.

use crate::chat::{StageError, Transcriber};
use async_trait::async_trait;
use base64::Engine;
use std::time::Duration;
use tracing::debug;

pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com";
pub const GEMINI_TIMEOUT: Duration = Duration::from_secs(30);

const TRANSCRIBE_PROMPT: &str = "Please transcribe the following audio. Return only the transcribed text without any additional commentary.";

// --- Local Gemini REST Types ---
mod gemini_types {
    use serde::{Deserialize, Serialize};

    #[derive(Serialize)]
    pub(super) struct GenerateContentRequest {
        pub contents: Vec<Content>,
    }
    #[derive(Serialize)]
    pub(super) struct Content {
        pub role: String,
        pub parts: Vec<Part>,
    }
    #[derive(Serialize)]
    #[serde(untagged)]
    pub(super) enum Part {
        Text { text: String },
        Inline {
            #[serde(rename = "inlineData")]
            inline_data: Blob,
        },
    }
    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct Blob {
        pub mime_type: String,
        pub data: String,
    }
    #[derive(Deserialize, Debug)]
    pub(super) struct GenerateContentResponse {
        #[serde(default)]
        pub candidates: Vec<Candidate>,
    }
    #[derive(Deserialize, Debug)]
    pub(super) struct Candidate {
        pub content: Option<CandidateContent>,
    }
    #[derive(Deserialize, Debug)]
    pub(super) struct CandidateContent {
        #[serde(default)]
        pub parts: Vec<CandidatePart>,
    }
    #[derive(Deserialize, Debug)]
    pub(super) struct CandidatePart {
        pub text: Option<String>,
    }
}

use gemini_types::{Blob, Content, GenerateContentRequest, GenerateContentResponse, Part};

pub struct GeminiTranscriber {
    http: reqwest::Client,
    api_key: Option<String>,
    model: String,
    base_url: String,
}

impl GeminiTranscriber {
    pub fn new(api_key: Option<String>, model: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key,
            model: model.into(),
            base_url: GEMINI_API_BASE.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }
}

#[async_trait]
impl Transcriber for GeminiTranscriber {
    async fn transcribe(&self, wav: &[u8]) -> Result<String, StageError> {
        let api_key = self.api_key.as_deref().ok_or(StageError::MissingCredential {
            key: "GOOGLE_API_KEY",
            feature: "speech-to-text",
        })?;

        let request = GenerateContentRequest {
            contents: vec![Content {
                role: "user".to_string(),
                parts: vec![
                    Part::Text {
                        text: TRANSCRIBE_PROMPT.to_string(),
                    },
                    Part::Inline {
                        inline_data: Blob {
                            mime_type: "audio/wav".to_string(),
                            data: base64::engine::general_purpose::STANDARD.encode(wav),
                        },
                    },
                ],
            }],
        };

        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );
        debug!(bytes = wav.len(), model = %self.model, "Requesting transcription");
        let response = self
            .http
            .post(&url)
            .timeout(GEMINI_TIMEOUT)
            .header("x-goog-api-key", api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| StageError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(StageError::Upstream { status, body });
        }

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| StageError::Transport(e.to_string()))?;

        let text: String = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();
        Ok(text)
    }
}

//! Murf text-to-speech client used by the demo.
//!
//! The generate endpoint renders the audio and answers with a URL to the
//! finished file, which is then downloaded in a second request.

use crate::chat::{SpeechSynthesizer, StageError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};

pub const MURF_API_BASE: &str = "https://api.murf.ai";
pub const MURF_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum AudioFormat {
    Mp3,
    #[default]
    Wav,
}

impl AudioFormat {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_uppercase().as_str() {
            "MP3" => Some(AudioFormat::Mp3),
            "WAV" => Some(AudioFormat::Wav),
            _ => None,
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "audio/mpeg",
            AudioFormat::Wav => "audio/wav",
        }
    }
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct SpeechRequest<'a> {
    voice_id: &'a str,
    style: &'a str,
    text: &'a str,
    rate: i32,
    pitch: i32,
    sample_rate: u32,
    format: AudioFormat,
    channel_type: &'a str,
    pronunciation_dictionary: HashMap<String, String>,
    encode_as_base64: bool,
    variation: u32,
    audio_duration: u32,
    model_version: &'a str,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct SpeechResponse {
    audio_file: Option<String>,
}

pub struct MurfClient {
    http: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    format: AudioFormat,
    timeout: Duration,
}

impl MurfClient {
    pub fn new(api_key: Option<String>, format: AudioFormat) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key,
            base_url: MURF_API_BASE.to_string(),
            format,
            timeout: MURF_TIMEOUT,
        }
    }

    /// Points the client at a different host, e.g. a local stub.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn fetch_audio(&self, url: &str) -> Result<Vec<u8>, StageError> {
        let response = self
            .http
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| StageError::Transport(e.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(StageError::Upstream { status, body });
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| StageError::Transport(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl SpeechSynthesizer for MurfClient {
    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<Vec<u8>, StageError> {
        let api_key = self.api_key.as_deref().ok_or(StageError::MissingCredential {
            key: "MURF_API_KEY",
            feature: "text-to-speech",
        })?;

        let request = SpeechRequest {
            voice_id,
            style: "Conversational",
            text,
            rate: 0,
            pitch: 0,
            sample_rate: 48000,
            format: self.format,
            channel_type: "STEREO",
            pronunciation_dictionary: HashMap::new(),
            encode_as_base64: false,
            variation: 1,
            audio_duration: 0,
            model_version: "GEN2",
        };

        let url = format!("{}/v1/speech/generate", self.base_url);
        debug!(voice_id, chars = text.len(), "Requesting Murf speech");
        let response = self
            .http
            .post(&url)
            .timeout(self.timeout)
            .header("api-key", api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| StageError::Transport(e.to_string()))?;

        let status = response.status();
        if status.as_u16() != 200 {
            let body = response.text().await.unwrap_or_default();
            return Err(StageError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: SpeechResponse = response
            .json()
            .await
            .map_err(|e| StageError::Transport(format!("Unreadable Murf response: {}", e)))?;
        let audio_url = parsed.audio_file.ok_or_else(|| {
            StageError::EmptyResponse("Murf response did not include an audio file.".to_string())
        })?;

        let audio = self.fetch_audio(&audio_url).await?;
        info!(bytes = audio.len(), "Murf speech downloaded");
        Ok(audio)
    }
}

use serde::{Deserialize, Serialize};

/// Speech-to-text model selection on the inference platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SttSettings {
    pub model: String,
    pub language: String,
}

/// Text-to-speech model and voice selection on the inference platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TtsSettings {
    pub model: String,
    pub voice: String,
    pub language: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoiseCancellation {
    /// Background voice cancellation tuned for wideband audio.
    Bvc,
    /// Background voice cancellation tuned for narrowband phone audio.
    BvcTelephony,
}

/// How a participant joined the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantKind {
    Standard,
    Sip,
}

/// The speech pipeline the hosting voice runtime should assemble for a call.
///
/// Only model identifiers live here; the models themselves run on an external
/// inference platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentProfile {
    pub agent_name: String,
    pub stt: SttSettings,
    /// Provider-qualified LLM id, e.g. `openai/gpt-4.1-mini`.
    pub llm: String,
    pub tts: TtsSettings,
    pub vad: String,
    pub turn_detection: String,
    pub preemptive_generation: bool,
}

impl Default for AgentProfile {
    fn default() -> Self {
        Self {
            agent_name: "Sales_Manager".to_string(),
            stt: SttSettings {
                model: "assemblyai/universal-streaming".to_string(),
                language: "en".to_string(),
            },
            llm: "openai/gpt-4.1-mini".to_string(),
            tts: TtsSettings {
                model: "elevenlabs/eleven_turbo_v2_5".to_string(),
                voice: "CwhRBWXzGAHq8TQ4Fs17".to_string(),
                language: "en-US".to_string(),
            },
            vad: "silero".to_string(),
            turn_detection: "multilingual".to_string(),
            preemptive_generation: true,
        }
    }
}

impl AgentProfile {
    /// Phone callers get the telephony-tuned filter.
    pub fn noise_cancellation_for(&self, kind: ParticipantKind) -> NoiseCancellation {
        match kind {
            ParticipantKind::Sip => NoiseCancellation::BvcTelephony,
            ParticipantKind::Standard => NoiseCancellation::Bvc,
        }
    }

    /// The LLM id without its provider prefix, as chat completion APIs expect it.
    pub fn chat_model(&self) -> &str {
        self.llm
            .split_once('/')
            .map(|(_, model)| model)
            .unwrap_or(&self.llm)
    }
}

use salesvoice_core::{
    murf::AudioFormat,
    profile::AgentProfile,
    tools::{DEFAULT_TOOL_TIMEOUT, DEFAULT_TOOLS_BASE_URL},
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// The chat completion backend the voice agent reasons with.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Provider {
    OpenAI,
    Gemini,
}

impl Provider {
    /// The environment variable holding this provider's API key.
    pub fn key_var(&self) -> &'static str {
        match self {
            Provider::OpenAI => "OPENAI_API_KEY",
            Provider::Gemini => "GOOGLE_API_KEY",
        }
    }

    pub fn api_base(&self) -> &'static str {
        match self {
            Provider::OpenAI => "https://api.openai.com/v1/",
            Provider::Gemini => "https://generativelanguage.googleapis.com/v1beta/openai",
        }
    }
}

/// Holds all configuration loaded from the environment at startup.
///
/// API keys are optional: a missing key disables the feature that needs it
/// and is reported when that feature is used.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub provider: Provider,
    pub openai_api_key: Option<String>,
    pub google_api_key: Option<String>,
    pub murf_api_key: Option<String>,
    /// Model the voice agent reasons with.
    pub chat_model: String,
    /// Model the demo uses for transcription and replies.
    pub demo_chat_model: String,
    pub murf_audio_format: AudioFormat,
    pub tools_base_url: String,
    pub tool_timeout: Duration,
    pub log_level: Level,
    pub prompts_path: PathBuf,
    pub profile: AgentProfile,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let provider_str = std::env::var("LLM_PROVIDER").unwrap_or_else(|_| "openai".to_string());
        let provider = match provider_str.to_lowercase().as_str() {
            "openai" => Provider::OpenAI,
            "gemini" => Provider::Gemini,
            other => {
                return Err(ConfigError::InvalidValue(
                    "LLM_PROVIDER".to_string(),
                    format!("'{}' is not one of 'openai', 'gemini'", other),
                ));
            }
        };

        let openai_api_key = non_empty_var("OPENAI_API_KEY");
        let google_api_key = non_empty_var("GOOGLE_API_KEY");
        let murf_api_key = non_empty_var("MURF_API_KEY");

        let mut profile = AgentProfile::default();
        if let Some(name) = non_empty_var("AGENT_NAME") {
            profile.agent_name = name;
        }
        if let Some(llm) = non_empty_var("AGENT_LLM") {
            profile.llm = llm;
        }
        if let Some(model) = non_empty_var("AGENT_STT_MODEL") {
            profile.stt.model = model;
        }
        if let Some(model) = non_empty_var("AGENT_TTS_MODEL") {
            profile.tts.model = model;
        }
        if let Some(voice) = non_empty_var("AGENT_TTS_VOICE") {
            profile.tts.voice = voice;
        }

        let chat_model = non_empty_var("CHAT_MODEL").unwrap_or_else(|| match provider {
            Provider::OpenAI => profile.chat_model().to_string(),
            Provider::Gemini => "gemini-2.0-flash".to_string(),
        });
        let demo_chat_model =
            non_empty_var("DEMO_CHAT_MODEL").unwrap_or_else(|| "gemini-2.0-flash".to_string());

        let format_str = std::env::var("MURF_AUDIO_FORMAT").unwrap_or_else(|_| "WAV".to_string());
        let murf_audio_format = AudioFormat::parse(&format_str).ok_or_else(|| {
            ConfigError::InvalidValue(
                "MURF_AUDIO_FORMAT".to_string(),
                format!("'{}' is not one of 'WAV', 'MP3'", format_str),
            )
        })?;

        let tools_base_url = non_empty_var("TOOLS_BASE_URL")
            .unwrap_or_else(|| DEFAULT_TOOLS_BASE_URL.to_string());

        let tool_timeout = match std::env::var("TOOL_TIMEOUT_SECS") {
            Ok(secs) => secs
                .parse::<u64>()
                .ok()
                .filter(|s| *s > 0)
                .map(Duration::from_secs)
                .ok_or_else(|| {
                    ConfigError::InvalidValue(
                        "TOOL_TIMEOUT_SECS".to_string(),
                        format!("'{}' is not a positive number of seconds", secs),
                    )
                })?,
            Err(_) => DEFAULT_TOOL_TIMEOUT,
        };

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let prompts_path = std::env::var("PROMPTS_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./prompts"));

        Ok(Self {
            bind_address,
            provider,
            openai_api_key,
            google_api_key,
            murf_api_key,
            chat_model,
            demo_chat_model,
            murf_audio_format,
            tools_base_url,
            tool_timeout,
            log_level,
            prompts_path,
            profile,
        })
    }

    /// The API key for the voice agent's chat provider.
    pub fn agent_api_key(&self) -> Option<&str> {
        match self.provider {
            Provider::OpenAI => self.openai_api_key.as_deref(),
            Provider::Gemini => self.google_api_key.as_deref(),
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;
    use tracing::Level;

    const VARS: &[&str] = &[
        "BIND_ADDRESS",
        "LLM_PROVIDER",
        "OPENAI_API_KEY",
        "GOOGLE_API_KEY",
        "MURF_API_KEY",
        "CHAT_MODEL",
        "DEMO_CHAT_MODEL",
        "MURF_AUDIO_FORMAT",
        "TOOLS_BASE_URL",
        "TOOL_TIMEOUT_SECS",
        "RUST_LOG",
        "PROMPTS_PATH",
        "AGENT_NAME",
        "AGENT_LLM",
        "AGENT_STT_MODEL",
        "AGENT_TTS_MODEL",
        "AGENT_TTS_VOICE",
    ];

    fn clear_env_vars() {
        for var in VARS {
            unsafe {
                env::remove_var(var);
            }
        }
    }

    #[test]
    fn test_config_error_display() {
        let missing_var = ConfigError::MissingVar("TEST_VAR".to_string());
        assert_eq!(
            format!("{}", missing_var),
            "Missing environment variable: TEST_VAR"
        );

        let invalid_value =
            ConfigError::InvalidValue("TEST_VAR".to_string(), "bad_value".to_string());
        assert_eq!(
            format!("{}", invalid_value),
            "Invalid value for environment variable TEST_VAR: bad_value"
        );
    }

    #[test]
    #[serial]
    fn test_config_defaults_without_any_keys() {
        clear_env_vars();

        let config = Config::from_env().expect("Config should load without keys");

        assert_eq!(config.bind_address.to_string(), "0.0.0.0:3000");
        assert_eq!(config.provider, Provider::OpenAI);
        assert_eq!(config.agent_api_key(), None);
        assert_eq!(config.murf_api_key, None);
        assert_eq!(config.chat_model, "gpt-4.1-mini");
        assert_eq!(config.demo_chat_model, "gemini-2.0-flash");
        assert_eq!(config.murf_audio_format, AudioFormat::Wav);
        assert_eq!(config.tools_base_url, DEFAULT_TOOLS_BASE_URL);
        assert_eq!(config.tool_timeout, Duration::from_secs(10));
        assert_eq!(config.log_level, Level::INFO);
        assert_eq!(config.prompts_path, PathBuf::from("./prompts"));
        assert_eq!(config.profile, AgentProfile::default());
    }

    #[test]
    #[serial]
    fn test_config_gemini_provider() {
        clear_env_vars();
        unsafe {
            env::set_var("LLM_PROVIDER", "Gemini");
            env::set_var("GOOGLE_API_KEY", "test-google-key");
        }

        let config = Config::from_env().expect("Config should load successfully");

        assert_eq!(config.provider, Provider::Gemini);
        assert_eq!(config.agent_api_key(), Some("test-google-key"));
        assert_eq!(config.chat_model, "gemini-2.0-flash");
        assert_eq!(config.provider.key_var(), "GOOGLE_API_KEY");
    }

    #[test]
    #[serial]
    fn test_config_custom_values() {
        clear_env_vars();
        unsafe {
            env::set_var("BIND_ADDRESS", "127.0.0.1:8080");
            env::set_var("OPENAI_API_KEY", "custom-openai-key");
            env::set_var("MURF_API_KEY", "murf-key");
            env::set_var("CHAT_MODEL", "gpt-4o");
            env::set_var("MURF_AUDIO_FORMAT", "mp3");
            env::set_var("TOOLS_BASE_URL", "http://localhost:4000/");
            env::set_var("TOOL_TIMEOUT_SECS", "3");
            env::set_var("RUST_LOG", "debug");
            env::set_var("PROMPTS_PATH", "/custom/prompts");
            env::set_var("AGENT_NAME", "Support_Agent");
            env::set_var("AGENT_TTS_VOICE", "voice-123");
        }

        let config = Config::from_env().expect("Config should load successfully");

        assert_eq!(config.bind_address.to_string(), "127.0.0.1:8080");
        assert_eq!(config.agent_api_key(), Some("custom-openai-key"));
        assert_eq!(config.murf_api_key.as_deref(), Some("murf-key"));
        assert_eq!(config.chat_model, "gpt-4o");
        assert_eq!(config.murf_audio_format, AudioFormat::Mp3);
        assert_eq!(config.tools_base_url, "http://localhost:4000/");
        assert_eq!(config.tool_timeout, Duration::from_secs(3));
        assert_eq!(config.log_level, Level::DEBUG);
        assert_eq!(config.prompts_path, PathBuf::from("/custom/prompts"));
        assert_eq!(config.profile.agent_name, "Support_Agent");
        assert_eq!(config.profile.tts.voice, "voice-123");
        assert_eq!(config.profile.llm, "openai/gpt-4.1-mini");
    }

    #[test]
    #[serial]
    fn test_blank_key_counts_as_missing() {
        clear_env_vars();
        unsafe {
            env::set_var("OPENAI_API_KEY", "   ");
        }

        let config = Config::from_env().unwrap();
        assert_eq!(config.openai_api_key, None);
    }

    #[test]
    #[serial]
    fn test_config_invalid_values() {
        for (var, value) in [
            ("BIND_ADDRESS", "not-a-valid-address"),
            ("LLM_PROVIDER", "anthropic"),
            ("MURF_AUDIO_FORMAT", "ogg"),
            ("TOOL_TIMEOUT_SECS", "0"),
            ("RUST_LOG", "not-a-level"),
        ] {
            clear_env_vars();
            unsafe {
                env::set_var(var, value);
            }

            match Config::from_env().unwrap_err() {
                ConfigError::InvalidValue(name, _) => assert_eq!(name, var),
                other => panic!("Expected InvalidValue for {}, got {:?}", var, other),
            }
        }
        clear_env_vars();
    }
}

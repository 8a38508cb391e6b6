//! Configuration management for the voicebridge gateway
//!
//! Settings load from an optional TOML file; provider credentials can also
//! be supplied through environment variables, which take precedence.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::{Error, Result};

/// Voicebridge gateway configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path to the conversation database
    pub database_path: Option<PathBuf>,

    /// Live speech recognition settings
    pub stt: SttConfig,

    /// Reply generation settings
    pub llm: LlmConfig,

    /// Speech synthesis settings
    pub tts: TtsConfig,

    /// Idle keep-alive sweep settings
    pub keepalive: KeepAliveConfig,
}

/// Live speech recognition (Deepgram) settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SttConfig {
    /// API key (`DEEPGRAM_API_KEY` env)
    pub api_key: String,

    /// Recognition model
    pub model: String,

    /// Recognition language
    pub language: String,

    /// Provider-side endpointing hint in milliseconds.
    /// A hint only; the caller's explicit stop signal ends the turn.
    pub endpointing_ms: u32,
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: "nova-3".to_string(),
            language: "en-US".to_string(),
            endpointing_ms: 1000,
        }
    }
}

/// Reply generation (Gemini) settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// API key (`GEMINI_API_KEY` env)
    pub api_key: String,

    /// Generation model
    pub model: String,

    /// Sampling temperature
    pub temperature: f32,

    /// Maximum reply length in tokens
    pub max_output_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: "gemini-2.5-flash".to_string(),
            temperature: 0.7,
            max_output_tokens: 2048,
        }
    }
}

/// Speech synthesis (ElevenLabs) settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TtsConfig {
    /// API key (`ELEVENLABS_API_KEY` env)
    pub api_key: String,

    /// Voice identity (`ELEVENLABS_VOICE_ID` env)
    pub voice_id: String,

    /// Synthesis model
    pub model_id: String,

    /// Voice stability (0.0 to 1.0)
    pub stability: f32,

    /// Voice similarity boost (0.0 to 1.0)
    pub similarity_boost: f32,

    /// Provider-side latency optimization level (0 to 4)
    pub optimize_streaming_latency: u32,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            voice_id: String::new(),
            model_id: "eleven_turbo_v2".to_string(),
            stability: 0.5,
            similarity_boost: 0.75,
            optimize_streaming_latency: 3,
        }
    }
}

/// Idle keep-alive sweep settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KeepAliveConfig {
    /// Seconds between sweeps
    pub interval_secs: u64,

    /// Idle time after which silence is injected
    pub idle_after_secs: u64,
}

impl Default for KeepAliveConfig {
    fn default() -> Self {
        Self {
            interval_secs: 4,
            idle_after_secs: 3,
        }
    }
}

impl Config {
    /// Load configuration from an optional TOML file plus environment overrides
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed, or if a required
    /// credential is missing after overrides are applied.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)?;
                toml::from_str(&raw)?
            }
            None => Self::default(),
        };

        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Overlay provider credentials from the environment
    fn apply_env(&mut self) {
        if let Ok(key) = std::env::var("DEEPGRAM_API_KEY") {
            self.stt.api_key = key;
        }
        if let Ok(key) = std::env::var("GEMINI_API_KEY") {
            self.llm.api_key = key;
        }
        if let Ok(key) = std::env::var("ELEVENLABS_API_KEY") {
            self.tts.api_key = key;
        }
        if let Ok(voice) = std::env::var("ELEVENLABS_VOICE_ID") {
            self.tts.voice_id = voice;
        }
    }

    fn validate(&self) -> Result<()> {
        if self.stt.api_key.is_empty() {
            return Err(Error::Config("Deepgram API key required".to_string()));
        }
        if self.llm.api_key.is_empty() {
            return Err(Error::Config("Gemini API key required".to_string()));
        }
        if self.tts.api_key.is_empty() {
            return Err(Error::Config("ElevenLabs API key required".to_string()));
        }
        if self.tts.voice_id.is_empty() {
            return Err(Error::Config("ElevenLabs voice id required".to_string()));
        }
        Ok(())
    }

    /// Resolved database path
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| PathBuf::from("voicebridge.db"))
    }
}

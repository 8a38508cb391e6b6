//! Error types for the voicebridge gateway

use thiserror::Error;

/// Result type alias for voicebridge operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the voicebridge gateway
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid configuration value
    #[error("configuration error: {0}")]
    Config(String),

    /// A required agent profile or system prompt is not registered
    #[error("missing configuration: {0}")]
    ConfigMissing(String),

    /// STT/LLM/TTS provider unreachable or returned a non-success status
    #[error("upstream provider error: {0}")]
    Upstream(String),

    /// Operation attempted on a recognition stream that already finished
    #[error("recognition stream already closed")]
    StreamClosed,

    /// Database error
    #[error("database error: {0}")]
    Database(String),

    /// Channel error (peer task gone)
    #[error("channel error: {0}")]
    Channel(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// WebSocket error
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

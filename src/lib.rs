//! Voicebridge - real-time voice conversation gateway
//!
//! Bridges a caller's live audio stream to a streaming speech recognizer,
//! a reply generator, and a streaming speech synthesizer, producing a
//! turn-based spoken dialogue:
//!
//! ```text
//! caller audio ──► ConversationSession ──► STT stream
//!                        ▲                     │
//!                        └──── transcripts ────┘
//!                        │
//!                 (end of turn)
//!                        │
//!                        ▼
//!              ResponseGenerator ──► SpeechSynthesizer ──► caller
//! ```
//!
//! Every session is independent: one worker task serializes its state, one
//! pipeline task answers its turns. A process-wide keep-alive sweep injects
//! silence into idle recognition streams so providers do not drop them
//! during caller silence.

pub mod agent;
pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod session;
pub mod voice;

pub use config::Config;
pub use db::DbPool;
pub use error::{Error, Result};
pub use session::{ConversationSession, IdleKeepAlive, SessionRegistry};

//! Live speech-to-text streaming
//!
//! Wraps the Deepgram live WebSocket API. Each open stream owns the write
//! half of the connection; a reader task parses provider messages and
//! delivers [`SttEvent`]s on a channel.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;

use crate::config::SttConfig;
use crate::voice::SAMPLE_RATE;
use crate::{Error, Result};

/// A transcript fragment from the recognition stream
#[derive(Debug, Clone)]
pub struct Transcript {
    pub text: String,
    /// The provider will not revise this fragment
    pub is_final: bool,
    /// Provider-side endpointing hint; informational only
    pub speech_final: bool,
}

/// Events delivered by an open recognition stream
#[derive(Debug, Clone)]
pub enum SttEvent {
    /// A partial or final transcript fragment
    Transcript(Transcript),
    /// Provider-reported error; the stream may still deliver further events
    Error(String),
    /// The provider closed the stream
    Closed,
}

/// An open live recognition stream
///
/// At most one stream is open per session; `finish` must complete before a
/// replacement is opened.
#[async_trait]
pub trait SttStream: Send {
    /// Forward a chunk of linear16 audio to the recognizer
    async fn send_audio(&mut self, chunk: Vec<u8>) -> Result<()>;

    /// Close the stream, flushing any pending recognition
    async fn finish(&mut self) -> Result<()>;
}

/// Opens live recognition streams
#[async_trait]
pub trait SpeechToText: Send + Sync {
    /// Open a stream; transcript events arrive on the returned receiver
    async fn open(&self) -> Result<(Box<dyn SttStream>, mpsc::Receiver<SttEvent>)>;
}

/// Capacity of the per-stream event channel
const EVENT_CHANNEL_DEPTH: usize = 64;

/// Deepgram live transcription client
pub struct DeepgramStt {
    config: SttConfig,
}

impl DeepgramStt {
    /// Create a new Deepgram client
    #[must_use]
    pub const fn new(config: SttConfig) -> Self {
        Self { config }
    }

    /// Build the listen URL with recognition options
    fn listen_url(&self) -> String {
        format!(
            "wss://api.deepgram.com/v1/listen?model={}&language={}&smart_format=true&encoding=linear16&sample_rate={SAMPLE_RATE}&interim_results=true&endpointing={}",
            self.config.model, self.config.language, self.config.endpointing_ms,
        )
    }
}

#[async_trait]
impl SpeechToText for DeepgramStt {
    async fn open(&self) -> Result<(Box<dyn SttStream>, mpsc::Receiver<SttEvent>)> {
        let mut request = self.listen_url().into_client_request()?;
        request.headers_mut().insert(
            "Authorization",
            HeaderValue::from_str(&format!("Token {}", self.config.api_key))
                .map_err(|e| Error::Config(format!("invalid API key: {e}")))?,
        );

        let (ws, _) = connect_async(request)
            .await
            .map_err(|e| Error::Upstream(format!("Deepgram connect failed: {e}")))?;
        let (writer, mut reader) = ws.split();

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_DEPTH);
        tokio::spawn(async move {
            while let Some(message) = reader.next().await {
                match message {
                    Ok(Message::Text(text)) => {
                        if let Some(event) = parse_listen_message(text.as_str()) {
                            if tx.send(event).await.is_err() {
                                break;
                            }
                        }
                    }
                    Ok(Message::Close(_)) => {
                        let _ = tx.send(SttEvent::Closed).await;
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        let _ = tx.send(SttEvent::Error(e.to_string())).await;
                        break;
                    }
                }
            }
        });

        tracing::debug!(model = %self.config.model, "recognition stream opened");

        Ok((Box::new(DeepgramStream { writer, finished: false }), rx))
    }
}

type WsSink = futures::stream::SplitSink<
    tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
    Message,
>;

/// Write half of an open Deepgram stream
struct DeepgramStream {
    writer: WsSink,
    finished: bool,
}

#[async_trait]
impl SttStream for DeepgramStream {
    async fn send_audio(&mut self, chunk: Vec<u8>) -> Result<()> {
        if self.finished {
            return Err(Error::StreamClosed);
        }
        self.writer.send(Message::binary(chunk)).await?;
        Ok(())
    }

    async fn finish(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        self.writer
            .send(Message::text(r#"{"type":"CloseStream"}"#))
            .await?;
        self.writer.close().await?;
        tracing::debug!("recognition stream finished");
        Ok(())
    }
}

/// Parse one provider message into an event
///
/// Empty transcripts (silence, keep-alive frames) produce no event.
fn parse_listen_message(raw: &str) -> Option<SttEvent> {
    let message: ListenMessage = match serde_json::from_str(raw) {
        Ok(message) => message,
        Err(e) => {
            tracing::debug!(error = %e, "unparseable recognition message");
            return None;
        }
    };

    match message.kind.as_str() {
        "Results" => {
            let text = message
                .channel?
                .alternatives
                .into_iter()
                .next()
                .map(|a| a.transcript)?;
            if text.is_empty() {
                return None;
            }
            Some(SttEvent::Transcript(Transcript {
                text,
                is_final: message.is_final,
                speech_final: message.speech_final,
            }))
        }
        "Error" => Some(SttEvent::Error(
            message.description.unwrap_or_else(|| raw.to_string()),
        )),
        _ => None,
    }
}

/// Message from the Deepgram live API
#[derive(Deserialize)]
struct ListenMessage {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    is_final: bool,
    #[serde(default)]
    speech_final: bool,
    channel: Option<ListenChannel>,
    description: Option<String>,
}

#[derive(Deserialize)]
struct ListenChannel {
    alternatives: Vec<ListenAlternative>,
}

#[derive(Deserialize)]
struct ListenAlternative {
    transcript: String,
}

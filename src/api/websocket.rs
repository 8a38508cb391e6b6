//! WebSocket caller transport
//!
//! One socket per caller. Binary frames carry audio both ways: caller
//! microphone chunks in, synthesized reply chunks out. JSON text frames
//! carry control and transcript events.

use std::sync::Arc;

use axum::{
    Router,
    extract::{
        Path, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
    routing::get,
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use super::ApiState;
use crate::session::{CallerEvent, ConversationSession, SessionContext, SessionEvent};

/// Incoming control message from the caller
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsIncoming {
    /// The caller finished speaking; finalize the turn
    Stop,
}

/// Outgoing message to the caller
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsOutgoing {
    /// Connection established, session assigned
    Connected { session_id: String },
    /// Live transcript so far (display only)
    TranscriptUpdate { transcript: String },
    /// The reply text that was spoken
    AgentResponse { text: String },
    /// The reply's audio is complete
    AudioStreamEnd,
    /// Synthesis failed; no more audio is coming for this reply
    SynthesisFailed,
    /// Connection-level error
    Error { code: String, message: String },
}

/// Depth of the outbound event channel
const OUTBOUND_DEPTH: usize = 64;

/// Build the caller transport router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/call/{agent_id}", get(ws_upgrade))
        .with_state(state)
}

/// Handle WebSocket upgrade request
async fn ws_upgrade(
    State(state): State<Arc<ApiState>>,
    Path(agent_id): Path<String>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, agent_id))
}

/// Drive one caller connection for its whole lifetime
async fn handle_socket(socket: WebSocket, state: Arc<ApiState>, agent_id: String) {
    let (mut sender, mut receiver) = socket.split();

    let profile = match state.directory.agent_profile(&agent_id) {
        Ok(profile) => profile,
        Err(e) => {
            tracing::warn!(agent_id = %agent_id, error = %e, "rejecting caller, no agent profile");
            send_json(
                &mut sender,
                &WsOutgoing::Error {
                    code: "unknown_agent".to_string(),
                    message: e.to_string(),
                },
            )
            .await;
            return;
        }
    };

    let session_id = Uuid::new_v4().to_string();
    tracing::info!(session_id = %session_id, agent_id = %agent_id, "caller connected");

    // History is best-effort; a caller without a recorded conversation
    // still gets answers, just without context
    if let Err(e) = state.store.create_conversation(&agent_id, &session_id) {
        tracing::warn!(session_id = %session_id, error = %e, "failed to record conversation start");
    }

    send_json(
        &mut sender,
        &WsOutgoing::Connected {
            session_id: session_id.clone(),
        },
    )
    .await;

    let (out_tx, mut out_rx) = mpsc::channel::<CallerEvent>(OUTBOUND_DEPTH);
    let ctx = SessionContext {
        stt: Arc::clone(&state.stt),
        responder: Arc::clone(&state.responder),
        synthesizer: Arc::clone(&state.synthesizer),
        registry: Arc::clone(&state.registry),
    };

    let handle = match ConversationSession::spawn(session_id.clone(), profile, ctx, out_tx).await {
        Ok(handle) => handle,
        Err(e) => {
            tracing::error!(session_id = %session_id, error = %e, "failed to start session");
            send_json(
                &mut sender,
                &WsOutgoing::Error {
                    code: "session_failed".to_string(),
                    message: e.to_string(),
                },
            )
            .await;
            return;
        }
    };

    // Forward session output to the socket
    let mut send_task = tokio::spawn(async move {
        while let Some(event) = out_rx.recv().await {
            let message = match event {
                CallerEvent::Audio(bytes) => Message::Binary(bytes.into()),
                CallerEvent::TranscriptUpdate(transcript) => {
                    match serde_json::to_string(&WsOutgoing::TranscriptUpdate { transcript }) {
                        Ok(text) => Message::Text(text.into()),
                        Err(_) => continue,
                    }
                }
                CallerEvent::AgentResponse(text) => {
                    match serde_json::to_string(&WsOutgoing::AgentResponse { text }) {
                        Ok(text) => Message::Text(text.into()),
                        Err(_) => continue,
                    }
                }
                CallerEvent::AudioStreamEnd => {
                    match serde_json::to_string(&WsOutgoing::AudioStreamEnd) {
                        Ok(text) => Message::Text(text.into()),
                        Err(_) => continue,
                    }
                }
                CallerEvent::SynthesisFailed => {
                    match serde_json::to_string(&WsOutgoing::SynthesisFailed) {
                        Ok(text) => Message::Text(text.into()),
                        Err(_) => continue,
                    }
                }
            };
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    // Forward caller input to the session
    let session = handle.clone();
    let recv_session_id = session_id.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(message)) = receiver.next().await {
            match message {
                Message::Binary(chunk) => {
                    if session
                        .send(SessionEvent::Audio(chunk.to_vec()))
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                Message::Text(text) => match serde_json::from_str::<WsIncoming>(text.as_str()) {
                    Ok(WsIncoming::Stop) => {
                        if session.send(SessionEvent::Stop).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::debug!(
                            session_id = %recv_session_id,
                            error = %e,
                            "ignoring malformed control message"
                        );
                    }
                },
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    let _ = handle.send(SessionEvent::Disconnect).await;
    tracing::info!(session_id = %session_id, "caller disconnected");
}

async fn send_json(
    sender: &mut futures::stream::SplitSink<WebSocket, Message>,
    message: &WsOutgoing,
) {
    if let Ok(text) = serde_json::to_string(message) {
        let _ = sender.send(Message::Text(text.into())).await;
    }
}

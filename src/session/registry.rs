//! Process-wide registry of live conversation sessions

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::sync::mpsc;
use tokio::time::Instant;

use super::{Phase, SessionEvent};
use crate::{Error, Result};

/// Cheap, cloneable handle to a running session
///
/// Events sent through the handle are serialized by the session's worker
/// task, so callers never touch session state directly.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    events: mpsc::Sender<SessionEvent>,
    last_activity: Arc<Mutex<Instant>>,
    phase: Arc<Mutex<Phase>>,
}

impl SessionHandle {
    pub(crate) fn new(events: mpsc::Sender<SessionEvent>, phase: Arc<Mutex<Phase>>) -> Self {
        Self {
            events,
            last_activity: Arc::new(Mutex::new(Instant::now())),
            phase,
        }
    }

    /// Deliver an event to the session's worker, waiting for queue space
    ///
    /// # Errors
    ///
    /// Returns `Channel` if the session has shut down
    pub async fn send(&self, event: SessionEvent) -> Result<()> {
        self.events
            .send(event)
            .await
            .map_err(|_| Error::Channel("session worker gone".to_string()))
    }

    /// Deliver an event without waiting; used by the keep-alive sweep
    ///
    /// # Errors
    ///
    /// Returns `Channel` if the queue is full or the session has shut down
    pub fn try_send(&self, event: SessionEvent) -> Result<()> {
        self.events
            .try_send(event)
            .map_err(|e| Error::Channel(e.to_string()))
    }

    /// Refresh the last-activity timestamp
    pub fn touch(&self) {
        if let Ok(mut at) = self.last_activity.lock() {
            *at = Instant::now();
        }
    }

    /// Time since the session's STT stream last received audio
    #[must_use]
    pub fn idle_for(&self) -> Duration {
        self.last_activity
            .lock()
            .map_or(Duration::ZERO, |at| at.elapsed())
    }

    /// Current lifecycle phase
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase.lock().map_or(Phase::Closed, |phase| *phase)
    }
}

/// Registry of active sessions, keyed by session id
///
/// Concurrent insert/lookup/remove from connection handlers plus snapshot
/// iteration from the keep-alive sweep.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, SessionHandle>>,
}

impl SessionRegistry {
    /// Create a new empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session handle under its id
    pub async fn register(&self, id: String, handle: SessionHandle) {
        self.sessions.write().await.insert(id, handle);
    }

    /// Get a session's handle
    pub async fn get(&self, id: &str) -> Option<SessionHandle> {
        self.sessions.read().await.get(id).cloned()
    }

    /// Remove a session, returning its handle if it was registered
    pub async fn remove(&self, id: &str) -> Option<SessionHandle> {
        self.sessions.write().await.remove(id)
    }

    /// Snapshot of all registered sessions for lock-free iteration
    pub async fn snapshot(&self) -> Vec<(String, SessionHandle)> {
        self.sessions
            .read()
            .await
            .iter()
            .map(|(id, handle)| (id.clone(), handle.clone()))
            .collect()
    }

    /// Number of active sessions
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Whether no sessions are active
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_handle() -> (SessionHandle, mpsc::Receiver<SessionEvent>) {
        let (tx, rx) = mpsc::channel(8);
        let phase = Arc::new(Mutex::new(Phase::Listening));
        (SessionHandle::new(tx, phase), rx)
    }

    #[tokio::test]
    async fn register_and_get() {
        let registry = SessionRegistry::new();
        let (handle, _rx) = sample_handle();

        registry.register("session-1".to_string(), handle).await;

        assert!(registry.get("session-1").await.is_some());
        assert!(registry.get("session-2").await.is_none());
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn remove_deregisters() {
        let registry = SessionRegistry::new();
        let (handle, _rx) = sample_handle();

        registry.register("session-1".to_string(), handle).await;
        assert!(registry.remove("session-1").await.is_some());
        assert!(registry.is_empty().await);
        assert!(registry.remove("session-1").await.is_none());
    }

    #[tokio::test]
    async fn snapshot_lists_all_sessions() {
        let registry = SessionRegistry::new();
        let (first, _rx1) = sample_handle();
        let (second, _rx2) = sample_handle();

        registry.register("a".to_string(), first).await;
        registry.register("b".to_string(), second).await;

        let mut ids: Vec<String> = registry
            .snapshot()
            .await
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn handle_delivers_events() {
        let (handle, mut rx) = sample_handle();

        handle.send(SessionEvent::Stop).await.unwrap();
        assert!(matches!(rx.recv().await, Some(SessionEvent::Stop)));

        drop(rx);
        assert!(handle.send(SessionEvent::Stop).await.is_err());
    }

    #[tokio::test]
    async fn touch_resets_idle_time() {
        let (handle, _rx) = sample_handle();

        handle.touch();
        assert!(handle.idle_for() < Duration::from_secs(1));
    }
}

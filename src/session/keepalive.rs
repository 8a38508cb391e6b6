//! Idle keep-alive sweep
//!
//! Streaming STT providers drop a connection that stays silent past their
//! inactivity timeout. The sweep injects short zero-amplitude frames into
//! idle sessions so streams survive caller silence; providers ignore the
//! frames for transcript purposes.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at};

use super::registry::SessionRegistry;
use super::SessionEvent;
use crate::config::KeepAliveConfig;
use crate::voice::silence_frame;

/// Duration of each injected silence frame
const SILENCE_FRAME_MS: u32 = 20;

/// Periodic silence injector for idle sessions
pub struct IdleKeepAlive {
    registry: Arc<SessionRegistry>,
    interval: Duration,
    idle_after: Duration,
}

impl IdleKeepAlive {
    /// Create a new keep-alive sweep over the registry
    #[must_use]
    pub fn new(registry: Arc<SessionRegistry>, config: &KeepAliveConfig) -> Self {
        Self {
            registry,
            interval: Duration::from_secs(config.interval_secs),
            idle_after: Duration::from_secs(config.idle_after_secs),
        }
    }

    /// Spawn the sweep loop; runs until the process exits
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(self) {
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        loop {
            ticker.tick().await;
            self.sweep().await;
        }
    }

    /// One pass over all registered sessions
    ///
    /// Injection failures are isolated per session; a full queue or a
    /// just-closed session must never stop the sweep.
    async fn sweep(&self) {
        for (id, handle) in self.registry.snapshot().await {
            if handle.idle_for() < self.idle_after {
                continue;
            }

            match handle.try_send(SessionEvent::Silence(silence_frame(SILENCE_FRAME_MS))) {
                Ok(()) => {
                    // pace further injections from now, not from the last real audio
                    handle.touch();
                    tracing::trace!(session_id = %id, "injected keep-alive silence");
                }
                Err(e) => {
                    tracing::debug!(session_id = %id, error = %e, "keep-alive injection failed");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use tokio::sync::mpsc;

    use super::*;
    use crate::session::{Phase, SessionHandle};

    fn test_config() -> KeepAliveConfig {
        KeepAliveConfig {
            interval_secs: 4,
            idle_after_secs: 3,
        }
    }

    fn idle_handle() -> (SessionHandle, mpsc::Receiver<SessionEvent>) {
        let (tx, rx) = mpsc::channel(8);
        let phase = Arc::new(Mutex::new(Phase::Listening));
        (SessionHandle::new(tx, phase), rx)
    }

    async fn recv_silence(
        rx: &mut mpsc::Receiver<SessionEvent>,
        secs: u64,
    ) -> Option<Vec<u8>> {
        match tokio::time::timeout(Duration::from_secs(secs), rx.recv()).await {
            Ok(Some(SessionEvent::Silence(frame))) => Some(frame),
            _ => None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn idle_session_gets_one_frame_per_tick() {
        let registry = Arc::new(SessionRegistry::new());
        let (handle, mut rx) = idle_handle();
        registry.register("s1".to_string(), handle).await;

        IdleKeepAlive::new(Arc::clone(&registry), &test_config()).spawn();

        // first sweep fires after one interval
        let frame = recv_silence(&mut rx, 5).await.expect("first injection");
        assert_eq!(frame.len(), 640); // 20ms of 16kHz linear16
        assert!(frame.iter().all(|&b| b == 0));

        // no burst between ticks
        assert!(recv_silence(&mut rx, 3).await.is_none());

        // next tick injects exactly one more
        assert!(recv_silence(&mut rx, 2).await.is_some());
        assert!(recv_silence(&mut rx, 3).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn active_session_is_left_alone() {
        let registry = Arc::new(SessionRegistry::new());
        let (handle, mut rx) = idle_handle();
        registry.register("s1".to_string(), handle.clone()).await;

        IdleKeepAlive::new(Arc::clone(&registry), &test_config()).spawn();

        // audio keeps arriving; the session is never idle past the threshold
        for _ in 0..4 {
            tokio::time::sleep(Duration::from_secs(2)).await;
            handle.touch();
            assert!(
                rx.try_recv().is_err(),
                "fresh session should not receive silence"
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn closed_session_does_not_stop_the_sweep() {
        let registry = Arc::new(SessionRegistry::new());

        // one session whose worker is gone, one healthy
        let (dead, dead_rx) = idle_handle();
        drop(dead_rx);
        let (alive, mut alive_rx) = idle_handle();

        registry.register("dead".to_string(), dead).await;
        registry.register("alive".to_string(), alive).await;

        IdleKeepAlive::new(Arc::clone(&registry), &test_config()).spawn();

        // the healthy session still gets its injection
        assert!(recv_silence(&mut alive_rx, 5).await.is_some());
    }
}

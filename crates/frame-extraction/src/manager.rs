//! Session registry, admission control, and the 60-second health monitor.
//!
//! An instance rather than a process-wide singleton, so the top-level
//! runtime owns it explicitly and can hand it an explicit start/stop
//! lifecycle instead of relying on a lazily-initialized static.

use crate::config::FrameExtractionConfig;
use crate::framer::JpegFramer;
use crate::metrics;
use crate::session::{Session, SessionSpec, SessionState, SessionStats};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Receives fully-parsed frames for dispatch into the recognition worker
/// pool (C3). The manager has no compile-time dependency on that crate.
#[async_trait]
pub trait FrameSink: Send + Sync {
    async fn accept(&self, spec: &SessionSpec, authoritative_event_id: Option<i64>, jpeg: Vec<u8>);
}

pub struct SessionManager {
    config: FrameExtractionConfig,
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    active_frame_processes: AtomicUsize,
    sink: Arc<dyn FrameSink>,
}

impl SessionManager {
    pub fn new(config: FrameExtractionConfig, sink: Arc<dyn FrameSink>) -> Arc<Self> {
        Arc::new(Self {
            config,
            sessions: RwLock::new(HashMap::new()),
            active_frame_processes: AtomicUsize::new(0),
            sink,
        })
    }

    /// Idempotent: a session with the same id already existing is a no-op success.
    pub async fn start(self: &Arc<Self>, spec: SessionSpec) -> Result<()> {
        {
            let sessions = self.sessions.read().await;
            if sessions.contains_key(&spec.session_id) {
                return Ok(());
            }
        }

        let session = Arc::new(Session::new(spec.clone(), self.config.ring_buffer_capacity));
        session.set_state(SessionState::Starting).await;

        {
            let mut sessions = self.sessions.write().await;
            sessions.insert(spec.session_id.clone(), session.clone());
        }
        metrics::SESSIONS_RUNNING.inc();

        let manager = self.clone();
        tokio::spawn(async move {
            manager.run_session(session).await;
        });

        Ok(())
    }

    pub async fn stop(&self, session_id: &str) -> Result<()> {
        let session = {
            let mut sessions = self.sessions.write().await;
            sessions.remove(session_id)
        };
        let Some(session) = session else {
            return Err(anyhow!("session '{}' not found", session_id));
        };
        session.stop(Duration::from_secs(5)).await?;
        metrics::SESSIONS_RUNNING.dec();
        Ok(())
    }

    pub async fn is_active(&self, session_id: &str) -> bool {
        match self.sessions.read().await.get(session_id) {
            Some(s) => matches!(s.state().await, SessionState::Starting | SessionState::Running),
            None => false,
        }
    }

    pub async fn stats(&self, session_id: &str) -> Option<SessionStats> {
        let session = self.sessions.read().await.get(session_id).cloned()?;
        Some(session.stats().await)
    }

    pub async fn list_active(&self) -> Vec<SessionStats> {
        let sessions = self.sessions.read().await;
        let mut out = Vec::with_capacity(sessions.len());
        for session in sessions.values() {
            out.push(session.stats().await);
        }
        out
    }

    /// Approximate process-wide retained-bytes total, used to enforce the
    /// heap soft ceiling at the frame ingest point.
    async fn global_retained_bytes(&self) -> u64 {
        let sessions: Vec<Arc<Session>> = self.sessions.read().await.values().cloned().collect();
        let mut total = 0u64;
        for session in &sessions {
            total += session.retained_bytes().await;
        }
        total
    }

    async fn run_session(self: Arc<Self>, session: Arc<Session>) {
        let child = match session.spawn_decoder(
            self.config.default_frame_width,
            self.config.default_frame_height,
            self.config.jpeg_quality,
        ) {
            Ok(c) => c,
            Err(e) => {
                warn!(session_id = %session.spec.session_id, error = %e, "failed to spawn decoder");
                session.set_state(SessionState::Failing).await;
                session.set_state(SessionState::Terminated).await;
                return;
            }
        };

        let mut stdout = match {
            let mut guard = session.child.lock().await;
            let mut child = child;
            let stdout = child.stdout.take();
            *guard = Some(child);
            stdout
        } {
            Some(s) => s,
            None => {
                session.set_state(SessionState::Failing).await;
                session.set_state(SessionState::Terminated).await;
                return;
            }
        };

        session.set_state(SessionState::Running).await;
        let authoritative_event_id = session.spec.authoritative_event_id();
        let mut framer = JpegFramer::new(self.config.jpeg_accumulator_cap_bytes);
        let mut buf = [0u8; 64 * 1024];

        // Parsed frames are handed to a dedicated consumer task over a
        // bounded channel, so a slow detector call (up to the timeout-guard
        // budget) stalls only that session's own dispatch, never the stdout
        // read loop draining the decoder's pipe.
        let (tx, mut rx) = tokio::sync::mpsc::channel::<Vec<u8>>(self.config.ring_buffer_capacity.max(1));
        let manager = self.clone();
        let consumer_session = session.clone();
        let consumer = tokio::spawn(async move {
            while let Some(frame) = rx.recv().await {
                manager.admit_frame(&consumer_session, authoritative_event_id, frame).await;
            }
        });

        loop {
            let n = match stdout.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    warn!(session_id = %session.spec.session_id, error = %e, "decoder read error");
                    break;
                }
            };

            for frame in framer.feed(&buf[..n]) {
                if tx.try_send(frame).is_err() {
                    metrics::FRAMES_DROPPED_TOTAL.with_label_values(&["queue_full"]).inc();
                }
            }
        }

        drop(tx);
        consumer.await.ok();

        session.set_state(SessionState::Failing).await;
        session.set_state(SessionState::Terminated).await;
        info!(session_id = %session.spec.session_id, "decoder exited");
    }

    /// Atomically claims a global-process slot, or returns `false` if the cap
    /// is already reached. `fetch_add`-then-check would let two concurrent
    /// callers both pass a stale read of the counter; `fetch_update` retries
    /// until it either claims a slot under the cap or observes the cap hit.
    fn try_claim_frame_process_slot(&self) -> bool {
        self.active_frame_processes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                if current >= self.config.max_global_processes {
                    None
                } else {
                    Some(current + 1)
                }
            })
            .is_ok()
    }

    async fn admit_frame(&self, session: &Arc<Session>, authoritative_event_id: Option<i64>, frame: Vec<u8>) {
        // Session-level throttle: at most one admitted frame per
        // `session_throttle_ms`, measured against the last admitted frame.
        let elapsed = session.last_frame_at.read().await.elapsed();
        if elapsed < Duration::from_millis(self.config.session_throttle_ms) {
            metrics::FRAMES_DROPPED_TOTAL.with_label_values(&["session_throttle"]).inc();
            return;
        }

        if self.global_retained_bytes().await > self.config.global_heap_ceiling_bytes {
            metrics::FRAMES_DROPPED_TOTAL.with_label_values(&["heap_ceiling"]).inc();
            return;
        }

        if !self.try_claim_frame_process_slot() {
            metrics::FRAMES_DROPPED_TOTAL.with_label_values(&["global_process_cap"]).inc();
            return;
        }

        metrics::ACTIVE_FRAME_PROCESSES.inc();
        session.push_frame(frame.clone()).await;

        let spec = session.spec.clone();
        self.sink.accept(&spec, authoritative_event_id, frame).await;
        self.active_frame_processes.fetch_sub(1, Ordering::SeqCst);
        metrics::ACTIVE_FRAME_PROCESSES.dec();
    }

    /// Run forever, ticking the health monitor every `health_monitor_interval_secs`.
    pub async fn spawn_health_monitor(self: &Arc<Self>) {
        let manager = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(manager.config.health_monitor_interval_secs));
            loop {
                interval.tick().await;
                manager.run_health_check().await;
            }
        });
    }

    async fn run_health_check(&self) {
        let sessions: Vec<Arc<Session>> = self.sessions.read().await.values().cloned().collect();
        for session in sessions {
            if session.last_frame_age_secs().await > self.config.stale_session_secs {
                warn!(session_id = %session.spec.session_id, "session stale, restarting");
                self.restart(session).await;
                continue;
            }
            if session.retained_bytes().await > self.config.max_session_retained_bytes {
                session.trim_to_newest(3).await;
            }
            if !session.is_decoder_alive().await && session.state().await == SessionState::Running {
                warn!(session_id = %session.spec.session_id, "decoder dead, restarting");
                self.restart(session).await;
            }
        }
    }

    async fn restart(self: &Arc<Self>, session: Arc<Session>) {
        let spec = session.spec.clone();
        session.stop(Duration::from_secs(5)).await.ok();
        {
            let mut sessions = self.sessions.write().await;
            sessions.remove(&spec.session_id);
        }
        tokio::time::sleep(Duration::from_secs(2)).await;
        metrics::DECODER_RESTARTS_TOTAL.with_label_values(&[]).inc();
        if let Err(e) = self.start(spec).await {
            warn!(error = %e, "failed to restart stale session");
        }
    }
}

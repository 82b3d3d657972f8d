//! A single RTSP frame-extraction session: decoder subprocess, JPEG framer,
//! and bounded ring buffer. Supervision (start/stop/restart, global admission)
//! lives in `manager`; this module owns one session's state.

use crate::framer::JpegFramer;
use anyhow::{Context, Result};
use std::collections::VecDeque;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tokio::process::{Child, Command};
use tokio::sync::{Mutex, RwLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Starting,
    Running,
    Stopping,
    Failing,
    Terminated,
}

#[derive(Debug, Clone)]
pub struct SessionSpec {
    pub session_id: String,
    pub camera_id: i64,
    pub organization_id: i64,
    pub rtsp_url: String,
    pub interval_sec: u64,
}

impl SessionSpec {
    /// If `session_id` matches `^event-(\d+)-camera-\d+-\d+$`, the captured
    /// group is the authoritative event id, bypassing C5 resolution.
    pub fn authoritative_event_id(&self) -> Option<i64> {
        let re = regex::Regex::new(r"^event-(\d+)-camera-\d+-\d+$").ok()?;
        let caps = re.captures(&self.session_id)?;
        caps.get(1)?.as_str().parse().ok()
    }
}

#[derive(Debug, Clone)]
pub struct SessionStats {
    pub session_id: String,
    pub state: SessionState,
    pub frames_buffered: usize,
    pub retained_bytes: u64,
    pub last_frame_age_secs: u64,
}

pub struct Session {
    pub spec: SessionSpec,
    pub state: RwLock<SessionState>,
    pub child: Mutex<Option<Child>>,
    pub last_frame_at: RwLock<Instant>,
    pub ring: Mutex<VecDeque<(u64, Vec<u8>)>>,
    next_seq: AtomicU64,
    ring_capacity: usize,
}

impl Session {
    pub fn new(spec: SessionSpec, ring_capacity: usize) -> Self {
        Self {
            spec,
            state: RwLock::new(SessionState::Idle),
            child: Mutex::new(None),
            last_frame_at: RwLock::new(Instant::now()),
            ring: Mutex::new(VecDeque::new()),
            next_seq: AtomicU64::new(0),
            ring_capacity,
        }
    }

    pub async fn state(&self) -> SessionState {
        *self.state.read().await
    }

    pub async fn set_state(&self, s: SessionState) {
        *self.state.write().await = s;
    }

    /// Spawn the decoder subprocess. `ffmpeg` is run in continuous mode,
    /// emitting a raw JPEG stream on stdout at `1/interval_sec` fps, rather
    /// than the one-shot `-vframes 1` invocation `common::frame_extractor`
    /// uses for single-still extraction.
    pub fn spawn_decoder(&self, width: u32, height: u32, quality: u32) -> Result<Child> {
        let scale = if width > 0 && height > 0 {
            format!(",scale={width}:{height}:force_original_aspect_ratio=decrease")
        } else {
            String::new()
        };
        let fps = 1.0 / (self.spec.interval_sec.max(1) as f64);
        let vf = format!("fps={fps}{scale}");

        Command::new("ffmpeg")
            .args([
                "-rtsp_transport", "tcp",
                "-fflags", "+genpts",
                "-max_delay", "5000000",
                "-i", &self.spec.rtsp_url,
                "-vf", &vf,
                "-q:v", &quality.clamp(2, 31).to_string(),
                "-f", "image2pipe",
                "pipe:1",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .context("failed to spawn ffmpeg decoder")
    }

    /// Insert a newly-parsed frame into the ring buffer, evicting the oldest
    /// entry if at capacity.
    pub async fn push_frame(&self, bytes: Vec<u8>) -> u64 {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        let mut ring = self.ring.lock().await;
        if ring.len() >= self.ring_capacity {
            ring.pop_front();
        }
        ring.push_back((seq, bytes));
        *self.last_frame_at.write().await = Instant::now();
        seq
    }

    pub async fn retained_bytes(&self) -> u64 {
        self.ring.lock().await.iter().map(|(_, b)| b.len() as u64).sum()
    }

    /// Keep only the newest `n` frames, dropping older ones.
    pub async fn trim_to_newest(&self, n: usize) {
        let mut ring = self.ring.lock().await;
        while ring.len() > n {
            ring.pop_front();
        }
    }

    pub async fn last_frame_age_secs(&self) -> u64 {
        self.last_frame_at.read().await.elapsed().as_secs()
    }

    pub async fn stats(&self) -> SessionStats {
        SessionStats {
            session_id: self.spec.session_id.clone(),
            state: self.state().await,
            frames_buffered: self.ring.lock().await.len(),
            retained_bytes: self.retained_bytes().await,
            last_frame_age_secs: self.last_frame_age_secs().await,
        }
    }

    pub async fn is_decoder_alive(&self) -> bool {
        let mut guard = self.child.lock().await;
        match guard.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    /// Graceful stop: send SIGTERM via `kill`, wait up to `grace` for exit,
    /// then force-kill.
    pub async fn stop(&self, grace: std::time::Duration) -> Result<()> {
        self.set_state(SessionState::Stopping).await;
        let mut guard = self.child.lock().await;
        let Some(child) = guard.as_mut() else {
            return Ok(());
        };
        child.start_kill().ok();
        let _ = tokio::time::timeout(grace, child.wait()).await;
        if matches!(child.try_wait(), Ok(None)) {
            child.kill().await.ok();
        }
        *guard = None;
        drop(guard);
        self.set_state(SessionState::Terminated).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(id: &str) -> SessionSpec {
        SessionSpec {
            session_id: id.to_string(),
            camera_id: 1,
            organization_id: 1,
            rtsp_url: "rtsp://example/stream".into(),
            interval_sec: 1,
        }
    }

    #[test]
    fn authoritative_event_id_parses_matching_session_id() {
        let s = spec("event-42-camera-7-1690000000");
        assert_eq!(s.authoritative_event_id(), Some(42));
    }

    #[test]
    fn authoritative_event_id_is_none_for_non_matching_id() {
        let s = spec("adhoc-session-1");
        assert_eq!(s.authoritative_event_id(), None);
    }

    #[tokio::test]
    async fn ring_buffer_evicts_oldest_at_capacity() {
        let session = Session::new(spec("s1"), 2);
        session.push_frame(vec![1]).await;
        session.push_frame(vec![2]).await;
        session.push_frame(vec![3]).await;
        let ring = session.ring.lock().await;
        let seqs: Vec<u64> = ring.iter().map(|(seq, _)| *seq).collect();
        assert_eq!(seqs, vec![1, 2]);
    }

    #[tokio::test]
    async fn trim_to_newest_drops_older_frames() {
        let session = Session::new(spec("s1"), 10);
        for i in 0..5 {
            session.push_frame(vec![i as u8]).await;
        }
        session.trim_to_newest(2).await;
        assert_eq!(session.ring.lock().await.len(), 2);
    }
}

//! Wires C6's start/stop decisions into C4: the concrete `CameraSessionStarter`
//! the orchestrator calls at reconciliation time.

use anyhow::Result;
use async_trait::async_trait;
use common::domain::{Camera, Event};
use frame_extraction::{SessionManager, SessionSpec};
use scheduler::{session_ids, CameraSessionStarter};
use std::sync::Arc;

pub struct OrchestratorSessionStarter {
    session_manager: Arc<SessionManager>,
    camera_username: Option<String>,
    camera_password: Option<String>,
    frame_interval_secs: u64,
}

impl OrchestratorSessionStarter {
    pub fn new(
        session_manager: Arc<SessionManager>,
        camera_username: Option<String>,
        camera_password: Option<String>,
        frame_interval_secs: u64,
    ) -> Self {
        Self { session_manager, camera_username, camera_password, frame_interval_secs }
    }
}

#[async_trait]
impl CameraSessionStarter for OrchestratorSessionStarter {
    async fn start_camera_for_event(&self, event: &Event, camera: &Camera) -> Result<()> {
        let epoch_ms = (common::validation::safe_unix_timestamp() as i64) * 1000;
        let (video_id, face_id) = session_ids(event.id, camera.id, epoch_ms);
        let rtsp_url = camera.effective_stream_url(self.camera_username.as_deref(), self.camera_password.as_deref());

        for session_id in [video_id, face_id] {
            let spec = SessionSpec {
                session_id,
                camera_id: camera.id,
                organization_id: camera.organization_id,
                rtsp_url: rtsp_url.clone(),
                interval_sec: self.frame_interval_secs,
            };
            self.session_manager.start(spec).await?;
        }
        Ok(())
    }

    /// Matches by session-id prefix: `event-<id>-camera-<id>-` for the video
    /// session, `face-rec-<id>-` for the recognition session. A camera bound
    /// to more than one simultaneously-active event can race on the
    /// face-recognition session name; accepted for now, see DESIGN.md.
    async fn stop_camera_session(&self, event_id: i64, camera_id: i64) -> Result<()> {
        let video_prefix = format!("event-{event_id}-camera-{camera_id}-");
        let face_prefix = format!("face-rec-{camera_id}-");
        for stats in self.session_manager.list_active().await {
            if stats.session_id.starts_with(&video_prefix) || stats.session_id.starts_with(&face_prefix) {
                self.session_manager.stop(&stats.session_id).await.ok();
            }
        }
        Ok(())
    }
}

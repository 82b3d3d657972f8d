//! Wires C4's frame stream into C3: the concrete `FrameSink` the session
//! manager dispatches parsed JPEGs through.

use async_trait::async_trait;
use common::repository::EventRepo;
use frame_extraction::{FrameSink, SessionSpec};
use recognition_worker::{ActiveEventForCamera, RecognitionWorker};
use std::sync::Arc;
use tracing::warn;

pub struct RecognitionFrameSink {
    worker: Arc<RecognitionWorker>,
    event_repo: Arc<dyn EventRepo>,
    frame_width: f32,
    frame_height: f32,
}

impl RecognitionFrameSink {
    pub fn new(
        worker: Arc<RecognitionWorker>,
        event_repo: Arc<dyn EventRepo>,
        frame_width: u32,
        frame_height: u32,
    ) -> Self {
        Self {
            worker,
            event_repo,
            frame_width: frame_width as f32,
            frame_height: frame_height as f32,
        }
    }

    async fn resolve_authoritative(&self, event_id: i64) -> Option<ActiveEventForCamera> {
        match self.event_repo.get(event_id).await {
            Ok(Some(event)) => Some(ActiveEventForCamera { event_id: event.id, organization_id: event.organization_id }),
            Ok(None) => None,
            Err(e) => {
                warn!(event_id, error = %e, "failed to resolve authoritative event for frame sink");
                None
            }
        }
    }
}

#[async_trait]
impl FrameSink for RecognitionFrameSink {
    async fn accept(&self, spec: &SessionSpec, authoritative_event_id: Option<i64>, jpeg: Vec<u8>) {
        let authoritative_event = match authoritative_event_id {
            Some(id) => self.resolve_authoritative(id).await,
            None => None,
        };

        if let Err(e) = self
            .worker
            .process_frame(spec.camera_id, &jpeg, self.frame_width, self.frame_height, authoritative_event)
            .await
        {
            warn!(camera_id = spec.camera_id, session_id = %spec.session_id, error = %e, "frame processing failed");
        }
    }
}

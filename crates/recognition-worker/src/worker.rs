//! The recognition worker (C3): the per-frame pipeline that turns a decoded
//! JPEG frame into zero or more persisted detections.
//!
//! detect -> validate -> NMS -> UI-overlay exclusion -> density cap ->
//! top-K cap -> resolve active event -> throttled image save -> per-face ANN
//! match -> persist. Each stage is a pure or narrowly-scoped function so the
//! pipeline can be exercised with the mock detector and an in-memory
//! repository without a GPU or database.

use crate::config::RecognitionWorkerConfig;
use crate::detector::{DetectedFace, FaceDetector};
use crate::metrics;
use anyhow::{Context, Result};
use async_trait::async_trait;
use common::domain::{BoundingBoxMeta, Detection, DetectionMetadata, DetectionStatus};
use common::face_geometry::{
    apply_density_cap, exclude_ui_overlays, non_max_suppression, validate, ScoredBox,
};
use common::repository::DetectionRepo;
use face_index::FaceIndex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// The active scheduled event bound to a camera, as resolved by the C5
/// event/camera binding service. Defined here (rather than depended on from
/// the scheduler crate) so the worker has no compile-time dependency on the
/// orchestrator; the concrete resolver is wired in by the top-level runtime.
#[derive(Debug, Clone)]
pub struct ActiveEventForCamera {
    pub event_id: i64,
    pub organization_id: i64,
}

#[async_trait]
pub trait ActiveEventResolver: Send + Sync {
    async fn resolve_active_event(&self, camera_id: i64) -> Result<Option<ActiveEventForCamera>>;
}

pub struct RecognitionWorker {
    detector: Arc<dyn FaceDetector>,
    face_index: Arc<FaceIndex>,
    event_resolver: Arc<dyn ActiveEventResolver>,
    detection_repo: Arc<dyn DetectionRepo>,
    config: RecognitionWorkerConfig,
    last_saved_at: Mutex<HashMap<i64, Instant>>,
}

impl RecognitionWorker {
    pub fn new(
        detector: Arc<dyn FaceDetector>,
        face_index: Arc<FaceIndex>,
        event_resolver: Arc<dyn ActiveEventResolver>,
        detection_repo: Arc<dyn DetectionRepo>,
        config: RecognitionWorkerConfig,
    ) -> Self {
        Self {
            detector,
            face_index,
            event_resolver,
            detection_repo,
            config,
            last_saved_at: Mutex::new(HashMap::new()),
        }
    }

    /// Process one decoded frame for `camera_id`. Returns the detections
    /// persisted for this frame (empty if no active event is bound, or no
    /// face survives the quality filters).
    ///
    /// `authoritative_event`, when set, comes from C4's session-id regex
    /// extraction and bypasses the C5 binding lookup entirely.
    pub async fn process_frame(
        &self,
        camera_id: i64,
        jpeg: &[u8],
        frame_width: f32,
        frame_height: f32,
        authoritative_event: Option<ActiveEventForCamera>,
    ) -> Result<Vec<Detection>> {
        let active_event = match authoritative_event {
            Some(e) => Some(e),
            None => self.event_resolver.resolve_active_event(camera_id).await?,
        };
        let Some(active_event) = active_event else {
            metrics::FRAMES_PROCESSED_TOTAL.with_label_values(&["no_active_event"]).inc();
            return Ok(Vec::new());
        };

        let output = self.detector.detect(jpeg).await.context("face detection failed")?;
        if output.faces.is_empty() {
            metrics::FRAMES_PROCESSED_TOTAL.with_label_values(&["no_faces_detected"]).inc();
            return Ok(Vec::new());
        }

        let scored: Vec<ScoredBox> = output
            .faces
            .iter()
            .map(|f| ScoredBox { bbox: f.bbox.clone(), confidence: f.confidence })
            .collect();

        let valid: Vec<ScoredBox> = scored.into_iter().filter(|b| validate(b).is_ok()).collect();
        let suppressed = non_max_suppression(valid, common::face_geometry::NMS_IOU_THRESHOLD);
        let no_overlays = exclude_ui_overlays(suppressed, frame_width, frame_height);
        let capped = apply_density_cap(no_overlays);

        let mut capped = capped;
        capped.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        capped.truncate(common::face_geometry::TOP_K);

        if capped.is_empty() {
            metrics::FRAMES_PROCESSED_TOTAL.with_label_values(&["no_faces_valid"]).inc();
            return Ok(Vec::new());
        }

        let should_save_image = self.should_save_image(camera_id).await;
        let saved_image_url = if should_save_image {
            self.save_frame(camera_id, jpeg).await.ok()
        } else {
            None
        };

        let mut detections = Vec::with_capacity(capped.len());
        for (face_index_in_frame, scored_box) in capped.iter().enumerate() {
            let detected_face = output
                .faces
                .iter()
                .find(|f| (f.bbox.x - scored_box.bbox.x).abs() < f32::EPSILON && (f.bbox.y - scored_box.bbox.y).abs() < f32::EPSILON)
                .cloned();
            let Some(detected_face) = detected_face else { continue };

            match self
                .build_and_persist_detection(
                    camera_id,
                    &active_event,
                    face_index_in_frame,
                    scored_box,
                    &detected_face,
                    saved_image_url.clone(),
                )
                .await
            {
                Ok(detection) => detections.push(detection),
                Err(e) => {
                    warn!(error = %e, camera_id, face_index_in_frame, "skipping face after persist failure");
                }
            }
        }

        metrics::FRAMES_PROCESSED_TOTAL.with_label_values(&["processed"]).inc();
        info!(camera_id, active_event = active_event.event_id, count = detections.len(), "frame processed");
        Ok(detections)
    }

    async fn should_save_image(&self, camera_id: i64) -> bool {
        let mut guard = self.last_saved_at.lock().await;
        let now = Instant::now();
        let throttle = std::time::Duration::from_millis(self.config.image_save_throttle_ms);
        match guard.get(&camera_id) {
            Some(last) if now.duration_since(*last) < throttle => false,
            _ => {
                guard.insert(camera_id, now);
                true
            }
        }
    }

    async fn save_frame(&self, camera_id: i64, jpeg: &[u8]) -> Result<String> {
        let dir = Path::new(&self.config.static_root).join("detections");
        tokio::fs::create_dir_all(&dir).await.context("failed to create detections dir")?;
        let filename = format!("{}-{}.jpg", camera_id, common::validation::safe_unix_timestamp());
        let path = dir.join(&filename);
        tokio::fs::write(&path, jpeg).await.context("failed to write detection frame")?;
        Ok(format!("/uploads/detections/{filename}"))
    }

    async fn build_and_persist_detection(
        &self,
        camera_id: i64,
        active_event: &ActiveEventForCamera,
        face_index_in_frame: usize,
        scored_box: &ScoredBox,
        detected_face: &DetectedFace,
        image_url: Option<String>,
    ) -> Result<Detection> {
        let matches = if detected_face.embedding.is_empty() {
            Vec::new()
        } else {
            self.face_index.search(&detected_face.embedding, 1).await
        };
        let best = matches.into_iter().find(|m| m.is_match);

        let (status, person_face_id, person_name, similarity) = match &best {
            Some(m) if m.similarity >= 0.999 => {
                (DetectionStatus::Confirmada, Some(m.person_face_id), Some(m.person_name.clone()), m.similarity)
            }
            Some(m) => (DetectionStatus::Reconhecida, Some(m.person_face_id), Some(m.person_name.clone()), m.similarity),
            None => (DetectionStatus::Detected, None, None, 0.0),
        };

        let metadata = DetectionMetadata {
            bounding_box: BoundingBoxMeta {
                x: scored_box.bbox.x.max(0.0) as u32,
                y: scored_box.bbox.y.max(0.0) as u32,
                width: scored_box.bbox.width.max(0.0) as u32,
                height: scored_box.bbox.height.max(0.0) as u32,
            },
            is_known: best.is_some(),
            recognition_confidence: similarity,
            person_name,
            encoding_length: detected_face.embedding.len(),
            face_detection_confidence: scored_box.confidence,
            processing_timestamp: chrono::Utc::now().to_rfc3339(),
            full_detection_image_url: image_url.clone().unwrap_or_default(),
            face_index: face_index_in_frame,
            auto_confirmed: matches!(status, DetectionStatus::Confirmada),
        };

        let metadata_json = serde_json::to_string(&metadata).context("failed to serialize detection metadata")?;

        let detection = Detection {
            id: 0,
            organization_id: active_event.organization_id,
            event_id: active_event.event_id,
            camera_id,
            person_face_id,
            detected_at: common::validation::safe_unix_timestamp() as i64,
            confidence: scored_box.confidence,
            status,
            image_url: image_url.unwrap_or_default(),
            embedding: if detected_face.embedding.is_empty() {
                None
            } else {
                Some(common::domain::PersonFace::encode_embedding(&detected_face.embedding))
            },
            metadata: metadata_json,
        };

        match self.detection_repo.create(&detection).await {
            Ok(d) => {
                metrics::DETECTIONS_TOTAL.with_label_values(&[detection_status_label(d.status)]).inc();
                Ok(d)
            }
            Err(e) => {
                warn!(error = %e, camera_id, "failed to persist detection");
                Err(e)
            }
        }
    }
}

fn detection_status_label(status: DetectionStatus) -> &'static str {
    match status {
        DetectionStatus::Detected => "detected",
        DetectionStatus::Reconhecida => "reconhecida",
        DetectionStatus::Confirmada => "confirmada",
        DetectionStatus::Rejeitada => "rejeitada",
    }
}

//! Test double for `FaceDetector`: returns pre-seeded detections instead of
//! running inference, and records dispose/reinitialize calls so
//! timeout-recovery behavior can be asserted without a real ONNX runtime.

use super::{DetectOutput, DetectedFace, FaceDetector};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;

pub struct MockFaceDetector {
    faces: Mutex<Vec<DetectedFace>>,
    processing_ms: u64,
    dispose_calls: AtomicU64,
    reinitialize_calls: AtomicU64,
    hang: Mutex<Option<std::time::Duration>>,
}

impl MockFaceDetector {
    pub fn new(faces: Vec<DetectedFace>) -> Self {
        Self {
            faces: Mutex::new(faces),
            processing_ms: 5,
            dispose_calls: AtomicU64::new(0),
            reinitialize_calls: AtomicU64::new(0),
            hang: Mutex::new(None),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Makes the next `detect` call sleep for `duration` before returning,
    /// so callers can exercise the timeout-guard's disposal path.
    pub async fn hang_next_call_for(&self, duration: std::time::Duration) {
        *self.hang.lock().await = Some(duration);
    }

    pub fn dispose_calls(&self) -> u64 {
        self.dispose_calls.load(Ordering::SeqCst)
    }

    pub fn reinitialize_calls(&self) -> u64 {
        self.reinitialize_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FaceDetector for MockFaceDetector {
    async fn detect(&self, _jpeg: &[u8]) -> Result<DetectOutput> {
        if let Some(duration) = self.hang.lock().await.take() {
            tokio::time::sleep(duration).await;
        }
        Ok(DetectOutput {
            faces: self.faces.lock().await.clone(),
            processing_ms: self.processing_ms,
        })
    }

    async fn dispose(&self) -> Result<()> {
        self.dispose_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn reinitialize(&self) -> Result<()> {
        self.reinitialize_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::face_geometry::BoundingBox;

    #[tokio::test]
    async fn returns_seeded_faces() {
        let detector = MockFaceDetector::new(vec![DetectedFace {
            bbox: BoundingBox { x: 0.0, y: 0.0, width: 50.0, height: 50.0 },
            confidence: 0.9,
            embedding: vec![0.1, 0.2],
        }]);
        let out = detector.detect(&[]).await.unwrap();
        assert_eq!(out.faces.len(), 1);
    }

    #[tokio::test]
    async fn dispose_and_reinitialize_are_counted() {
        let detector = MockFaceDetector::empty();
        detector.dispose().await.unwrap();
        detector.reinitialize().await.unwrap();
        assert_eq!(detector.dispose_calls(), 1);
        assert_eq!(detector.reinitialize_calls(), 1);
    }
}

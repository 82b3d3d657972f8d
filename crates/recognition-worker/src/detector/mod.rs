//! The face detector (C2): an opaque capability returning boxes, scores, and
//! embeddings. The core depends only on the `FaceDetector` trait; the ONNX
//! runtime behind `OrtFaceDetector` is a black box per the component design.

pub mod mock;
pub mod ort_detector;
pub mod timeout_guard;

use anyhow::Result;
use async_trait::async_trait;
use common::face_geometry::BoundingBox;

#[derive(Debug, Clone)]
pub struct DetectedFace {
    pub bbox: BoundingBox,
    pub confidence: f32,
    pub embedding: Vec<f32>,
}

#[derive(Debug, Clone)]
pub struct DetectOutput {
    pub faces: Vec<DetectedFace>,
    pub processing_ms: u64,
}

#[async_trait]
pub trait FaceDetector: Send + Sync {
    async fn detect(&self, jpeg: &[u8]) -> Result<DetectOutput>;

    /// Dispose of any held session/handle. Called by the timeout wrapper
    /// before a reinitialize so a hung call can't leak resources.
    async fn dispose(&self) -> Result<()>;

    async fn reinitialize(&self) -> Result<()>;
}

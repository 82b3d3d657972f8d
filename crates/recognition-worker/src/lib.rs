pub mod config;
pub mod detector;
pub mod metrics;
pub mod worker;

pub use config::RecognitionWorkerConfig;
pub use detector::{DetectOutput, DetectedFace, FaceDetector};
pub use detector::mock::MockFaceDetector;
pub use detector::ort_detector::{OrtFaceDetector, OrtFaceDetectorConfig};
pub use detector::timeout_guard::TimeoutGuardedDetector;
pub use worker::{ActiveEventForCamera, ActiveEventResolver, RecognitionWorker};

use std::env;

/// Configuration for the recognition worker (C2 detector wrapper + C3 pipeline).
#[derive(Debug, Clone)]
pub struct RecognitionWorkerConfig {
    pub detection_model_path: String,
    pub embedding_model_path: Option<String>,
    pub execution_provider: String,
    pub device_id: i32,
    pub detector_timeout_ms: u64,
    pub face_index_threshold: f32,
    pub image_save_throttle_ms: u64,
    pub static_root: String,
}

impl RecognitionWorkerConfig {
    pub fn from_env() -> Self {
        Self {
            detection_model_path: env::var("FACE_DETECTION_MODEL")
                .unwrap_or_else(|_| "./models/face_detection.onnx".to_string()),
            embedding_model_path: env::var("FACE_EMBEDDING_MODEL").ok(),
            execution_provider: env::var("FACE_RECOGNITION_EXECUTION_PROVIDER")
                .unwrap_or_else(|_| "CPU".to_string()),
            device_id: env::var("FACE_RECOGNITION_DEVICE_ID")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
            detector_timeout_ms: env::var("FACE_DETECTOR_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10_000),
            face_index_threshold: env::var("FACE_INDEX_THRESHOLD")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(0.75),
            image_save_throttle_ms: env::var("DETECTION_IMAGE_THROTTLE_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(1000),
            static_root: env::var("STATIC_ROOT").unwrap_or_else(|_| "./data/uploads".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        // SAFETY: single-threaded test, no concurrent env mutation elsewhere in this module.
        for var in [
            "FACE_DETECTION_MODEL",
            "FACE_EMBEDDING_MODEL",
            "FACE_RECOGNITION_EXECUTION_PROVIDER",
            "FACE_RECOGNITION_DEVICE_ID",
            "FACE_DETECTOR_TIMEOUT_MS",
            "FACE_INDEX_THRESHOLD",
            "DETECTION_IMAGE_THROTTLE_MS",
            "STATIC_ROOT",
        ] {
            env::remove_var(var);
        }
        let cfg = RecognitionWorkerConfig::from_env();
        assert_eq!(cfg.execution_provider, "CPU");
        assert_eq!(cfg.detector_timeout_ms, 10_000);
        assert_eq!(cfg.image_save_throttle_ms, 1000);
        assert!((cfg.face_index_threshold - 0.75).abs() < f32::EPSILON);
    }
}

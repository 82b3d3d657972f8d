use std::env;

/// Configuration for the frame extraction session manager.
#[derive(Debug, Clone)]
pub struct FrameExtractionConfig {
    pub max_global_processes: usize,
    pub global_heap_ceiling_bytes: u64,
    pub gc_hint_threshold_bytes: u64,
    pub session_throttle_ms: u64,
    pub ring_buffer_capacity: usize,
    pub stale_session_secs: u64,
    pub max_session_retained_bytes: u64,
    pub health_monitor_interval_secs: u64,
    pub jpeg_accumulator_cap_bytes: usize,
    pub default_frame_width: u32,
    pub default_frame_height: u32,
    pub jpeg_quality: u32,
}

impl Default for FrameExtractionConfig {
    fn default() -> Self {
        Self {
            max_global_processes: 50,
            global_heap_ceiling_bytes: 1 << 30,
            gc_hint_threshold_bytes: 200 * (1 << 20),
            session_throttle_ms: 1000,
            ring_buffer_capacity: 5,
            stale_session_secs: 300,
            max_session_retained_bytes: 50 * (1 << 20),
            health_monitor_interval_secs: 60,
            jpeg_accumulator_cap_bytes: 5 * (1 << 20),
            default_frame_width: 1280,
            default_frame_height: 720,
            jpeg_quality: 5,
        }
    }
}

impl FrameExtractionConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_global_processes: env::var("FRAME_MAX_GLOBAL_PROCESSES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_global_processes),
            session_throttle_ms: env::var("FRAME_SESSION_THROTTLE_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.session_throttle_ms),
            stale_session_secs: env::var("FRAME_STALE_SESSION_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.stale_session_secs),
            jpeg_quality: env::var("FRAME_JPEG_QUALITY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.jpeg_quality),
            ..defaults
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_budgets() {
        let cfg = FrameExtractionConfig::default();
        assert_eq!(cfg.max_global_processes, 50);
        assert_eq!(cfg.global_heap_ceiling_bytes, 1 << 30);
        assert_eq!(cfg.ring_buffer_capacity, 5);
        assert_eq!(cfg.stale_session_secs, 300);
        assert_eq!(cfg.max_session_retained_bytes, 50 * (1 << 20));
        assert_eq!(cfg.jpeg_accumulator_cap_bytes, 5 * (1 << 20));
    }
}

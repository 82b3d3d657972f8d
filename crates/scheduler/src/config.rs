use std::env;

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub camera_username: Option<String>,
    pub camera_password: Option<String>,
}

impl SchedulerConfig {
    pub fn from_env() -> Self {
        Self {
            camera_username: env::var("CAMERA_RTSP_USERNAME").ok(),
            camera_password: env::var("CAMERA_RTSP_PASSWORD").ok(),
        }
    }
}

//! Shared mutable state for the thin HTTP control surface: session
//! bookkeeping behind an `Arc<Inner>` with narrow accessor methods.

use common::repository::CameraRepo;
use frame_extraction::SessionManager;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Clone)]
pub struct AppState {
    inner: Arc<Inner>,
}

struct Inner {
    session_manager: Arc<SessionManager>,
    camera_repo: Arc<dyn CameraRepo>,
    camera_username: Option<String>,
    camera_password: Option<String>,
    frame_interval_secs: u64,
    session_urls: RwLock<HashMap<String, String>>,
    face_rec_sessions: RwLock<HashMap<i64, String>>,
}

impl AppState {
    pub fn new(
        session_manager: Arc<SessionManager>,
        camera_repo: Arc<dyn CameraRepo>,
        camera_username: Option<String>,
        camera_password: Option<String>,
        frame_interval_secs: u64,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                session_manager,
                camera_repo,
                camera_username,
                camera_password,
                frame_interval_secs,
                session_urls: RwLock::new(HashMap::new()),
                face_rec_sessions: RwLock::new(HashMap::new()),
            }),
        }
    }

    pub fn session_manager(&self) -> &Arc<SessionManager> {
        &self.inner.session_manager
    }

    pub fn camera_repo(&self) -> &Arc<dyn CameraRepo> {
        &self.inner.camera_repo
    }

    pub fn camera_username(&self) -> Option<&str> {
        self.inner.camera_username.as_deref()
    }

    pub fn camera_password(&self) -> Option<&str> {
        self.inner.camera_password.as_deref()
    }

    pub fn frame_interval_secs(&self) -> u64 {
        self.inner.frame_interval_secs
    }

    pub async fn remember_session_url(&self, session_id: String, url: String) {
        self.inner.session_urls.write().await.insert(session_id, url);
    }

    pub async fn forget_session_url(&self, session_id: &str) {
        self.inner.session_urls.write().await.remove(session_id);
    }

    pub async fn session_url(&self, session_id: &str) -> Option<String> {
        self.inner.session_urls.read().await.get(session_id).cloned()
    }

    pub async fn remember_face_recognition_session(&self, camera_id: i64, session_id: String) {
        self.inner.face_rec_sessions.write().await.insert(camera_id, session_id);
    }

    pub async fn take_face_recognition_session(&self, camera_id: i64) -> Option<String> {
        self.inner.face_rec_sessions.write().await.remove(&camera_id)
    }

    pub async fn face_recognition_session(&self, camera_id: i64) -> Option<String> {
        self.inner.face_rec_sessions.read().await.get(&camera_id).cloned()
    }
}

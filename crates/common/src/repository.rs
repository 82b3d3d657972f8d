//! Repository traits consumed by the pipeline core.
//!
//! Kept dialect-free: the ANN bootstrap, orchestrator, and recognition worker
//! depend on these traits, never on a concrete Postgres type, the same split
//! `coordinator`'s `LeaseStore` trait draws between callers and `MemoryLeaseStore`.

use crate::domain::{Camera, Detection, Event, EventCamera, Person, PersonFace};
use anyhow::Result;
use async_trait::async_trait;

#[async_trait]
pub trait PersonFaceRepo: Send + Sync {
    /// All faces eligible for the ANN index: active person, active face,
    /// non-null embedding.
    async fn list_indexable(&self) -> Result<Vec<(PersonFace, Person)>>;
    async fn get(&self, id: i64) -> Result<Option<PersonFace>>;
    async fn create(&self, face: &PersonFace) -> Result<PersonFace>;
}

#[async_trait]
pub trait EventCameraRepo: Send + Sync {
    async fn find_active_by_event_id(&self, event_id: i64) -> Result<Vec<EventCamera>>;
    async fn find_by_camera_id(&self, camera_id: i64) -> Result<Vec<EventCamera>>;
}

#[async_trait]
pub trait EventRepo: Send + Sync {
    async fn get(&self, id: i64) -> Result<Option<Event>>;
    async fn list_scheduled_active(&self) -> Result<Vec<Event>>;
    async fn set_active(&self, id: i64, is_active: bool) -> Result<()>;
}

#[async_trait]
pub trait CameraRepo: Send + Sync {
    async fn get(&self, id: i64) -> Result<Option<Camera>>;
}

#[async_trait]
pub trait DetectionRepo: Send + Sync {
    async fn create(&self, detection: &Detection) -> Result<Detection>;
    async fn list_by_person_face(&self, person_face_id: i64) -> Result<Vec<Detection>>;
}

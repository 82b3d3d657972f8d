//! In-memory repository used by tests, grounded on `coordinator::store::MemoryLeaseStore`'s
//! `RwLock<StoreInner>`-over-HashMap pattern.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use common::domain::{Camera, Detection, Event, EventCamera, FaceStatus, Person, PersonFace, PersonStatus};
use common::repository::{CameraRepo, DetectionRepo, EventCameraRepo, EventRepo, PersonFaceRepo};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::RwLock;

#[derive(Default)]
struct Inner {
    persons: HashMap<i64, Person>,
    faces: HashMap<i64, PersonFace>,
    cameras: HashMap<i64, Camera>,
    events: HashMap<i64, Event>,
    event_cameras: HashMap<i64, EventCamera>,
    detections: HashMap<i64, Detection>,
}

pub struct MemoryRepository {
    inner: RwLock<Inner>,
    next_id: AtomicI64,
}

impl Default for MemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            next_id: AtomicI64::new(1),
        }
    }

    fn next(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    pub async fn insert_person(&self, person: Person) {
        self.inner.write().await.persons.insert(person.id, person);
    }

    pub async fn insert_face(&self, face: PersonFace) {
        self.inner.write().await.faces.insert(face.id, face);
    }

    pub async fn insert_camera(&self, camera: Camera) {
        self.inner.write().await.cameras.insert(camera.id, camera);
    }

    pub async fn insert_event(&self, event: Event) {
        self.inner.write().await.events.insert(event.id, event);
    }

    pub async fn insert_event_camera(&self, ec: EventCamera) {
        self.inner
            .write()
            .await
            .event_cameras
            .insert(ec.id, ec);
    }
}

#[async_trait]
impl PersonFaceRepo for MemoryRepository {
    async fn list_indexable(&self) -> Result<Vec<(PersonFace, Person)>> {
        let inner = self.inner.read().await;
        Ok(inner
            .faces
            .values()
            .filter(|f| f.status == FaceStatus::Active && f.embedding.is_some())
            .filter_map(|f| {
                inner
                    .persons
                    .get(&f.person_id)
                    .filter(|p| p.status == PersonStatus::Active)
                    .map(|p| (f.clone(), p.clone()))
            })
            .collect())
    }

    async fn get(&self, id: i64) -> Result<Option<PersonFace>> {
        Ok(self.inner.read().await.faces.get(&id).cloned())
    }

    async fn create(&self, face: &PersonFace) -> Result<PersonFace> {
        let mut inner = self.inner.write().await;
        let mut created = face.clone();
        created.id = self.next();
        inner.faces.insert(created.id, created.clone());
        Ok(created)
    }
}

#[async_trait]
impl EventCameraRepo for MemoryRepository {
    async fn find_active_by_event_id(&self, event_id: i64) -> Result<Vec<EventCamera>> {
        let inner = self.inner.read().await;
        Ok(inner
            .event_cameras
            .values()
            .filter(|ec| ec.event_id == event_id && ec.is_active)
            .cloned()
            .collect())
    }

    async fn find_by_camera_id(&self, camera_id: i64) -> Result<Vec<EventCamera>> {
        let inner = self.inner.read().await;
        Ok(inner
            .event_cameras
            .values()
            .filter(|ec| ec.camera_id == camera_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl EventRepo for MemoryRepository {
    async fn get(&self, id: i64) -> Result<Option<Event>> {
        Ok(self.inner.read().await.events.get(&id).cloned())
    }

    async fn list_scheduled_active(&self) -> Result<Vec<Event>> {
        let inner = self.inner.read().await;
        Ok(inner
            .events
            .values()
            .filter(|e| e.is_scheduled && e.is_active)
            .cloned()
            .collect())
    }

    async fn set_active(&self, id: i64, is_active: bool) -> Result<()> {
        let mut inner = self.inner.write().await;
        let event = inner
            .events
            .get_mut(&id)
            .ok_or_else(|| anyhow!("event {} not found", id))?;
        event.is_active = is_active;
        Ok(())
    }
}

#[async_trait]
impl CameraRepo for MemoryRepository {
    async fn get(&self, id: i64) -> Result<Option<Camera>> {
        Ok(self.inner.read().await.cameras.get(&id).cloned())
    }
}

#[async_trait]
impl DetectionRepo for MemoryRepository {
    async fn create(&self, detection: &Detection) -> Result<Detection> {
        let mut inner = self.inner.write().await;
        let mut created = detection.clone();
        created.id = self.next();
        inner.detections.insert(created.id, created.clone());
        Ok(created)
    }

    async fn list_by_person_face(&self, person_face_id: i64) -> Result<Vec<Detection>> {
        let inner = self.inner.read().await;
        let mut rows: Vec<Detection> = inner
            .detections
            .values()
            .filter(|d| d.person_face_id == Some(person_face_id))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.detected_at.cmp(&a.detected_at));
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::domain::{DetectionStatus, FaceStatus, PersonStatus};

    #[tokio::test]
    async fn detection_round_trips_and_assigns_id() {
        let repo = MemoryRepository::new();
        let detection = Detection {
            id: 0,
            organization_id: 1,
            event_id: 1,
            camera_id: 1,
            person_face_id: None,
            detected_at: 1000,
            confidence: 0.9,
            status: DetectionStatus::Detected,
            image_url: "/uploads/detections/x.jpg".into(),
            embedding: None,
            metadata: "{}".into(),
        };
        let created = repo.create(&detection).await.unwrap();
        assert_ne!(created.id, 0);
        assert_eq!(created.confidence, 0.9);
    }

    #[tokio::test]
    async fn list_indexable_requires_active_person_and_face() {
        let repo = MemoryRepository::new();
        repo.insert_person(Person {
            id: 1,
            organization_id: 1,
            name: "Alice".into(),
            document_number: None,
            status: PersonStatus::Active,
        })
        .await;
        repo.insert_face(PersonFace {
            id: 1,
            person_id: 1,
            embedding: Some(vec![0, 0, 128, 63]),
            reliability: 1.0,
            status: FaceStatus::Active,
        })
        .await;

        let rows = repo.list_indexable().await.unwrap();
        assert_eq!(rows.len(), 1);
    }
}

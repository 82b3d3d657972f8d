//! Event/camera binding service (C5): resolves the single active scheduled
//! event bound to a camera, if any.

use anyhow::{anyhow, Result};
use chrono::Local;
use common::domain::Event;
use common::repository::{EventCameraRepo, EventRepo};
use recognition_worker::{ActiveEventForCamera, ActiveEventResolver};
use std::sync::Arc;

pub struct EventCameraBindingService {
    event_camera_repo: Arc<dyn EventCameraRepo>,
    event_repo: Arc<dyn EventRepo>,
}

impl EventCameraBindingService {
    pub fn new(event_camera_repo: Arc<dyn EventCameraRepo>, event_repo: Arc<dyn EventRepo>) -> Self {
        Self { event_camera_repo, event_repo }
    }

    async fn resolve_active_event_row(&self, camera_id: i64) -> Result<Event> {
        let now = Local::now().time();
        let bindings = self.event_camera_repo.find_by_camera_id(camera_id).await?;

        for binding in bindings.into_iter().filter(|b| b.is_active) {
            let Some(event) = self.event_repo.get(binding.event_id).await? else {
                continue;
            };
            if !event.is_active {
                continue;
            }
            if event.is_within_time_window(now) {
                return Ok(event);
            }
        }

        Err(anyhow!("no active events"))
    }

    pub async fn resolve_active_event(&self, camera_id: i64) -> Result<i64> {
        self.resolve_active_event_row(camera_id).await.map(|e| e.id)
    }
}

#[async_trait::async_trait]
impl ActiveEventResolver for EventCameraBindingService {
    async fn resolve_active_event(&self, camera_id: i64) -> Result<Option<ActiveEventForCamera>> {
        match self.resolve_active_event_row(camera_id).await {
            Ok(event) => Ok(Some(ActiveEventForCamera { event_id: event.id, organization_id: event.organization_id })),
            Err(_) => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::domain::{Event, EventCamera, RecurrenceType};
    use std::sync::Mutex;

    struct FixedEventCameraRepo(Vec<EventCamera>);
    #[async_trait::async_trait]
    impl EventCameraRepo for FixedEventCameraRepo {
        async fn find_active_by_event_id(&self, event_id: i64) -> Result<Vec<EventCamera>> {
            Ok(self.0.iter().filter(|e| e.event_id == event_id && e.is_active).cloned().collect())
        }
        async fn find_by_camera_id(&self, camera_id: i64) -> Result<Vec<EventCamera>> {
            Ok(self.0.iter().filter(|e| e.camera_id == camera_id).cloned().collect())
        }
    }

    struct FixedEventRepo(Mutex<Vec<Event>>);
    #[async_trait::async_trait]
    impl EventRepo for FixedEventRepo {
        async fn get(&self, id: i64) -> Result<Option<Event>> {
            Ok(self.0.lock().unwrap().iter().find(|e| e.id == id).cloned())
        }
        async fn list_scheduled_active(&self) -> Result<Vec<Event>> {
            Ok(self.0.lock().unwrap().iter().filter(|e| e.is_scheduled && e.is_active).cloned().collect())
        }
        async fn set_active(&self, id: i64, is_active: bool) -> Result<()> {
            let mut events = self.0.lock().unwrap();
            if let Some(e) = events.iter_mut().find(|e| e.id == id) {
                e.is_active = is_active;
            }
            Ok(())
        }
    }

    fn always_on_event(id: i64) -> Event {
        Event {
            id,
            organization_id: 1,
            name: "always".into(),
            is_scheduled: true,
            is_active: true,
            recurrence_type: RecurrenceType::Daily,
            scheduled_date: None,
            start_time: None,
            end_time: None,
            week_days: None,
        }
    }

    #[tokio::test]
    async fn resolves_first_active_binding_with_no_time_window() {
        let ec_repo = Arc::new(FixedEventCameraRepo(vec![EventCamera { id: 1, event_id: 10, camera_id: 5, is_active: true }]));
        let event_repo = Arc::new(FixedEventRepo(Mutex::new(vec![always_on_event(10)])));
        let service = EventCameraBindingService::new(ec_repo, event_repo);
        assert_eq!(service.resolve_active_event(5).await.unwrap(), 10);
    }

    #[tokio::test]
    async fn returns_error_when_no_active_bindings() {
        let ec_repo = Arc::new(FixedEventCameraRepo(vec![]));
        let event_repo = Arc::new(FixedEventRepo(Mutex::new(vec![])));
        let service = EventCameraBindingService::new(ec_repo, event_repo);
        assert!(service.resolve_active_event(5).await.is_err());
    }

    #[tokio::test]
    async fn inactive_binding_is_skipped() {
        let ec_repo = Arc::new(FixedEventCameraRepo(vec![EventCamera { id: 1, event_id: 10, camera_id: 5, is_active: false }]));
        let event_repo = Arc::new(FixedEventRepo(Mutex::new(vec![always_on_event(10)])));
        let service = EventCameraBindingService::new(ec_repo, event_repo);
        assert!(service.resolve_active_event(5).await.is_err());
    }
}

//! Scheduled-event orchestrator (C6): a 60-second tick that reconciles
//! scheduled events against running camera sessions.
//!
//! Grounded on `coordinator/src/cluster.rs`'s `start_election_monitor` /
//! `start_heartbeat_sender` ticker pattern (`Arc<Self>` + `tokio::time::interval`
//! loop spawned at `Start()`), not its Raft election logic.

use anyhow::Result;
use chrono::{Datelike, Local};
use common::domain::{Camera, Event, RecurrenceType, WeekDay};
use common::repository::{CameraRepo, EventCameraRepo, EventRepo};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{info, warn};

const TICK_INTERVAL_SECS: u64 = 60;

/// Starts (or stops) the video and face-recognition decoder sessions bound
/// to an event/camera pair. Implemented by the top-level runtime, which owns
/// the C4 `SessionManager`; the orchestrator only decides *when*.
#[async_trait::async_trait]
pub trait CameraSessionStarter: Send + Sync {
    async fn start_camera_for_event(&self, event: &Event, camera: &Camera) -> Result<()>;
    async fn stop_camera_session(&self, event_id: i64, camera_id: i64) -> Result<()>;
}

pub struct ScheduledEventOrchestrator {
    event_repo: Arc<dyn EventRepo>,
    event_camera_repo: Arc<dyn EventCameraRepo>,
    camera_repo: Arc<dyn CameraRepo>,
    starter: Arc<dyn CameraSessionStarter>,
    active_sessions: RwLock<HashSet<(i64, i64)>>,
}

impl ScheduledEventOrchestrator {
    pub fn new(
        event_repo: Arc<dyn EventRepo>,
        event_camera_repo: Arc<dyn EventCameraRepo>,
        camera_repo: Arc<dyn CameraRepo>,
        starter: Arc<dyn CameraSessionStarter>,
    ) -> Arc<Self> {
        Arc::new(Self {
            event_repo,
            event_camera_repo,
            camera_repo,
            starter,
            active_sessions: RwLock::new(HashSet::new()),
        })
    }

    /// Runs one reconciliation immediately, then every `TICK_INTERVAL_SECS`
    /// forever. Call via `tokio::spawn(orchestrator.clone().run())`.
    pub async fn run(self: Arc<Self>) {
        if let Err(e) = self.tick().await {
            warn!(error = %e, "initial orchestrator tick failed");
        }

        let mut ticker = tokio::time::interval(Duration::from_secs(TICK_INTERVAL_SECS));
        ticker.tick().await; // consume the immediate first tick, we already ran one above
        loop {
            ticker.tick().await;
            if let Err(e) = self.tick().await {
                warn!(error = %e, "orchestrator tick failed");
            }
        }
    }

    pub async fn tick(&self) -> Result<()> {
        let events = self.event_repo.list_scheduled_active().await?;
        let now = Local::now();

        for event in events {
            let should_be_active = should_be_active(&event, now.naive_local());
            let cameras = self.event_camera_repo.find_active_by_event_id(event.id).await?;

            for ec in cameras {
                let key = (event.id, ec.camera_id);
                let is_currently_active = self.active_sessions.read().await.contains(&key);

                if should_be_active && !is_currently_active {
                    let Some(camera) = self.camera_repo.get(ec.camera_id).await? else { continue };
                    if let Err(e) = self.starter.start_camera_for_event(&event, &camera).await {
                        warn!(event_id = event.id, camera_id = ec.camera_id, error = %e, "failed to start camera session");
                        continue;
                    }
                    self.active_sessions.write().await.insert(key);
                } else if !should_be_active && is_currently_active {
                    if let Err(e) = self.starter.stop_camera_session(event.id, ec.camera_id).await {
                        warn!(event_id = event.id, camera_id = ec.camera_id, error = %e, "failed to stop camera session");
                        continue;
                    }
                    self.active_sessions.write().await.remove(&key);
                }
            }
        }
        Ok(())
    }

    /// Turns the event active and re-evaluates the schedule immediately, or
    /// turns it inactive and stops every session bound to it.
    pub async fn handle_event_status_change(&self, event_id: i64, is_active: bool) -> Result<()> {
        self.event_repo.set_active(event_id, is_active).await?;
        if !is_active {
            self.stop_all_sessions_for_event(event_id).await?;
        } else {
            self.tick().await?;
        }
        Ok(())
    }

    pub async fn manually_start_event(&self, event_id: i64) -> Result<()> {
        self.handle_event_status_change(event_id, true).await
    }

    pub async fn manually_stop_event(&self, event_id: i64) -> Result<()> {
        self.handle_event_status_change(event_id, false).await
    }

    async fn stop_all_sessions_for_event(&self, event_id: i64) -> Result<()> {
        let keys: Vec<(i64, i64)> = {
            let sessions = self.active_sessions.read().await;
            sessions.iter().filter(|(eid, _)| *eid == event_id).cloned().collect()
        };
        for (eid, camera_id) in keys {
            self.starter.stop_camera_session(eid, camera_id).await?;
            self.active_sessions.write().await.remove(&(eid, camera_id));
        }
        Ok(())
    }
}

/// `shouldBeActive(event, now)`: time window plus recurrence rule.
fn should_be_active(event: &Event, now: chrono::NaiveDateTime) -> bool {
    if !event.is_within_time_window(now.time()) {
        return false;
    }
    match event.recurrence_type {
        RecurrenceType::Once => event.scheduled_date.as_deref() == Some(&now.date().format("%Y-%m-%d").to_string()),
        RecurrenceType::Daily => true,
        RecurrenceType::Weekly => {
            let today = WeekDay::from_chrono(now.date().weekday());
            event.parsed_week_days().contains(&today)
        }
        RecurrenceType::Monthly => false,
    }
}

/// Builds the two session ids for an event/camera start: the video session
/// and the independent face-recognition session.
pub fn session_ids(event_id: i64, camera_id: i64, epoch_ms: i64) -> (String, String) {
    (
        format!("event-{event_id}-camera-{camera_id}-{epoch_ms}"),
        format!("face-rec-{camera_id}-{epoch_ms}"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::domain::{Event, RecurrenceType};
    use chrono::NaiveDate;

    fn base_event(recurrence: RecurrenceType) -> Event {
        Event {
            id: 1,
            organization_id: 1,
            name: "e".into(),
            is_scheduled: true,
            is_active: true,
            recurrence_type: recurrence,
            scheduled_date: None,
            start_time: None,
            end_time: None,
            week_days: None,
        }
    }

    #[test]
    fn daily_event_is_always_active_within_open_window() {
        let event = base_event(RecurrenceType::Daily);
        let now = NaiveDate::from_ymd_opt(2026, 7, 26).unwrap().and_hms_opt(12, 0, 0).unwrap();
        assert!(should_be_active(&event, now));
    }

    #[test]
    fn monthly_is_always_reserved_false() {
        let event = base_event(RecurrenceType::Monthly);
        let now = NaiveDate::from_ymd_opt(2026, 7, 26).unwrap().and_hms_opt(12, 0, 0).unwrap();
        assert!(!should_be_active(&event, now));
    }

    #[test]
    fn weekly_checks_today_against_parsed_week_days() {
        let mut event = base_event(RecurrenceType::Weekly);
        event.week_days = Some("sunday".into());
        // 2026-07-26 is a Sunday.
        let now = NaiveDate::from_ymd_opt(2026, 7, 26).unwrap().and_hms_opt(12, 0, 0).unwrap();
        assert!(should_be_active(&event, now));

        event.week_days = Some("monday".into());
        assert!(!should_be_active(&event, now));
    }

    #[test]
    fn once_checks_scheduled_date_equals_today() {
        let mut event = base_event(RecurrenceType::Once);
        event.scheduled_date = Some("2026-07-26".into());
        let now = NaiveDate::from_ymd_opt(2026, 7, 26).unwrap().and_hms_opt(12, 0, 0).unwrap();
        assert!(should_be_active(&event, now));

        event.scheduled_date = Some("2026-07-27".into());
        assert!(!should_be_active(&event, now));
    }

    #[test]
    fn time_window_excludes_outside_hours() {
        let mut event = base_event(RecurrenceType::Daily);
        event.start_time = Some("09:00".into());
        event.end_time = Some("17:00".into());
        let night = NaiveDate::from_ymd_opt(2026, 7, 26).unwrap().and_hms_opt(22, 0, 0).unwrap();
        assert!(!should_be_active(&event, night));
    }

    #[test]
    fn session_ids_follow_documented_format() {
        let (video, face) = session_ids(10, 5, 1690000000000);
        assert_eq!(video, "event-10-camera-5-1690000000000");
        assert_eq!(face, "face-rec-5-1690000000000");
    }
}

//! Postgres-backed repository implementation.
//!
//! Grounded on `auth-service::repository::AuthRepository`'s `bind`-chain
//! `sqlx::query_as` style (rather than the `query_as!` compile-time-checked
//! macro style `device-manager::store` uses), since this workspace has no
//! live database to check macros against.

use anyhow::{Context, Result};
use async_trait::async_trait;
use common::domain::{Camera, Detection, Event, EventCamera, FaceStatus, Person, PersonFace, PersonStatus};
use common::repository::{CameraRepo, DetectionRepo, EventCameraRepo, EventRepo, PersonFaceRepo};
use sqlx::{PgPool, Row};

#[derive(Clone)]
pub struct PgRepository {
    pool: PgPool,
}

impl PgRepository {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url)
            .await
            .context("failed to connect to database")?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl PersonFaceRepo for PgRepository {
    async fn list_indexable(&self) -> Result<Vec<(PersonFace, Person)>> {
        let rows = sqlx::query(
            r#"
            SELECT pf.id AS face_id, pf.person_id AS face_person_id, pf.embedding, pf.reliability, pf.status AS face_status,
                   p.id AS person_id, p.organization_id, p.name, p.document_number, p.status AS person_status
            FROM person_faces pf
            JOIN persons p ON p.id = pf.person_id
            WHERE pf.status = 'active' AND p.status = 'active' AND pf.embedding IS NOT NULL
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("failed to list indexable person faces")?;

        rows.into_iter()
            .map(|row| {
                let face = PersonFace {
                    id: row.try_get("face_id")?,
                    person_id: row.try_get("face_person_id")?,
                    embedding: row.try_get("embedding")?,
                    reliability: row.try_get("reliability")?,
                    status: row.try_get::<FaceStatus, _>("face_status")?,
                };
                let person = Person {
                    id: row.try_get("person_id")?,
                    organization_id: row.try_get("organization_id")?,
                    name: row.try_get("name")?,
                    document_number: row.try_get("document_number")?,
                    status: row.try_get::<PersonStatus, _>("person_status")?,
                };
                Ok((face, person))
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .context("failed to decode indexable person face rows")
    }

    async fn get(&self, id: i64) -> Result<Option<PersonFace>> {
        let row = sqlx::query_as::<_, PersonFace>(
            "SELECT id, person_id, embedding, reliability, status FROM person_faces WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("failed to fetch person face")?;
        Ok(row)
    }

    async fn create(&self, face: &PersonFace) -> Result<PersonFace> {
        let row = sqlx::query_as::<_, PersonFace>(
            r#"
            INSERT INTO person_faces (person_id, embedding, reliability, status)
            VALUES ($1, $2, $3, $4)
            RETURNING id, person_id, embedding, reliability, status
            "#,
        )
        .bind(face.person_id)
        .bind(&face.embedding)
        .bind(face.reliability)
        .bind(face.status)
        .fetch_one(&self.pool)
        .await
        .context("failed to create person face")?;
        Ok(row)
    }
}

#[async_trait]
impl EventCameraRepo for PgRepository {
    async fn find_active_by_event_id(&self, event_id: i64) -> Result<Vec<EventCamera>> {
        let rows = sqlx::query_as::<_, EventCamera>(
            "SELECT id, event_id, camera_id, is_active FROM event_cameras WHERE event_id = $1 AND is_active = true",
        )
        .bind(event_id)
        .fetch_all(&self.pool)
        .await
        .context("failed to list active event cameras")?;
        Ok(rows)
    }

    async fn find_by_camera_id(&self, camera_id: i64) -> Result<Vec<EventCamera>> {
        let rows = sqlx::query_as::<_, EventCamera>(
            "SELECT id, event_id, camera_id, is_active FROM event_cameras WHERE camera_id = $1",
        )
        .bind(camera_id)
        .fetch_all(&self.pool)
        .await
        .context("failed to list event cameras by camera")?;
        Ok(rows)
    }
}

#[async_trait]
impl EventRepo for PgRepository {
    async fn get(&self, id: i64) -> Result<Option<Event>> {
        let row = sqlx::query_as::<_, Event>(
            r#"
            SELECT id, organization_id, name, is_scheduled, is_active, recurrence_type,
                   scheduled_date, start_time, end_time, week_days
            FROM events WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("failed to fetch event")?;
        Ok(row)
    }

    async fn list_scheduled_active(&self) -> Result<Vec<Event>> {
        let rows = sqlx::query_as::<_, Event>(
            r#"
            SELECT id, organization_id, name, is_scheduled, is_active, recurrence_type,
                   scheduled_date, start_time, end_time, week_days
            FROM events WHERE is_scheduled = true AND is_active = true
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("failed to list scheduled active events")?;
        Ok(rows)
    }

    async fn set_active(&self, id: i64, is_active: bool) -> Result<()> {
        sqlx::query("UPDATE events SET is_active = $1 WHERE id = $2")
            .bind(is_active)
            .bind(id)
            .execute(&self.pool)
            .await
            .context("failed to update event active flag")?;
        Ok(())
    }
}

#[async_trait]
impl CameraRepo for PgRepository {
    async fn get(&self, id: i64) -> Result<Option<Camera>> {
        let row = sqlx::query_as::<_, Camera>(
            "SELECT id, organization_id, name, stream_url, is_active FROM cameras WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("failed to fetch camera")?;
        Ok(row)
    }
}

#[async_trait]
impl DetectionRepo for PgRepository {
    async fn create(&self, detection: &Detection) -> Result<Detection> {
        let row = sqlx::query_as::<_, Detection>(
            r#"
            INSERT INTO detections (
                organization_id, event_id, camera_id, person_face_id,
                detected_at, confidence, status, image_url, embedding, metadata
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING id, organization_id, event_id, camera_id, person_face_id,
                      detected_at, confidence, status, image_url, embedding, metadata
            "#,
        )
        .bind(detection.organization_id)
        .bind(detection.event_id)
        .bind(detection.camera_id)
        .bind(detection.person_face_id)
        .bind(detection.detected_at)
        .bind(detection.confidence)
        .bind(detection.status)
        .bind(&detection.image_url)
        .bind(&detection.embedding)
        .bind(&detection.metadata)
        .fetch_one(&self.pool)
        .await
        .context("failed to create detection")?;
        Ok(row)
    }

    async fn list_by_person_face(&self, person_face_id: i64) -> Result<Vec<Detection>> {
        let rows = sqlx::query_as::<_, Detection>(
            r#"
            SELECT id, organization_id, event_id, camera_id, person_face_id,
                   detected_at, confidence, status, image_url, embedding, metadata
            FROM detections WHERE person_face_id = $1 ORDER BY detected_at DESC
            "#,
        )
        .bind(person_face_id)
        .fetch_all(&self.pool)
        .await
        .context("failed to list detections by person face")?;
        Ok(rows)
    }
}

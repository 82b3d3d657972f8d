//! Cross-crate integration tests for the face-recognition pipeline:
//! repository -> face index -> event binding -> recognition worker, wired
//! the way the root binary wires them, minus the RTSP decoder subprocess.

use common::domain::{Camera, Event, EventCamera, FaceStatus, Person, PersonFace, PersonStatus, RecurrenceType};
use common::face_geometry::BoundingBox;
use face_index::FaceIndex;
use recognition_worker::{DetectedFace, MockFaceDetector, RecognitionWorker, RecognitionWorkerConfig};
use repository::MemoryRepository;
use scheduler::EventCameraBindingService;
use std::sync::Arc;

fn worker_config() -> RecognitionWorkerConfig {
    RecognitionWorkerConfig {
        detection_model_path: String::new(),
        embedding_model_path: None,
        execution_provider: "CPU".into(),
        device_id: 0,
        detector_timeout_ms: 1000,
        face_index_threshold: 0.75,
        image_save_throttle_ms: 0,
        static_root: std::env::temp_dir().to_string_lossy().into_owned(),
    }
}

fn a_face(embedding: Vec<f32>) -> DetectedFace {
    DetectedFace {
        bbox: BoundingBox { x: 200.0, y: 200.0, width: 150.0, height: 150.0 },
        confidence: 0.9,
        embedding,
    }
}

async fn seeded_repo() -> (Arc<MemoryRepository>, i64, i64) {
    let repo = Arc::new(MemoryRepository::new());

    let person = Person { id: 1, organization_id: 1, name: "Alice".into(), document_number: None, status: PersonStatus::Active };
    let enrolled_embedding = vec![1.0_f32, 0.0, 0.0, 0.0];
    let face = PersonFace {
        id: 1,
        person_id: person.id,
        embedding: Some(PersonFace::encode_embedding(&enrolled_embedding)),
        reliability: 1.0,
        status: FaceStatus::Active,
    };
    repo.insert_person(person).await;
    repo.insert_face(face).await;

    let camera = Camera { id: 10, organization_id: 1, name: "Lobby".into(), stream_url: "rtsp://cam/lobby".into(), is_active: true };
    repo.insert_camera(camera).await;

    let event = Event {
        id: 100,
        organization_id: 1,
        name: "Business hours".into(),
        is_scheduled: true,
        is_active: true,
        recurrence_type: RecurrenceType::Daily,
        scheduled_date: None,
        start_time: None,
        end_time: None,
        week_days: None,
    };
    repo.insert_event(event).await;
    repo.insert_event_camera(EventCamera { id: 1000, event_id: 100, camera_id: 10, is_active: true }).await;

    (repo, 100, 10)
}

#[tokio::test]
async fn known_face_is_confirmed_through_the_full_binding_chain() {
    let (repo, _event_id, camera_id) = seeded_repo().await;
    let face_index = Arc::new(FaceIndex::new(repo.clone()));
    face_index.initialize().await.unwrap();

    let binding = Arc::new(EventCameraBindingService::new(repo.clone(), repo.clone()));
    let detector = Arc::new(MockFaceDetector::new(vec![a_face(vec![1.0, 0.0, 0.0, 0.0])]));
    let worker = RecognitionWorker::new(detector, face_index, binding, repo.clone(), worker_config());

    let detections = worker.process_frame(camera_id, &[0xFF, 0xD8], 1280.0, 720.0, None).await.unwrap();

    assert_eq!(detections.len(), 1);
    assert_eq!(detections[0].person_face_id, Some(1));
    assert_eq!(format!("{:?}", detections[0].status), "Confirmada");
}

#[tokio::test]
async fn unknown_face_persists_with_no_person_match() {
    let (repo, _event_id, camera_id) = seeded_repo().await;
    let face_index = Arc::new(FaceIndex::new(repo.clone()));
    face_index.initialize().await.unwrap();

    let binding = Arc::new(EventCameraBindingService::new(repo.clone(), repo.clone()));
    let detector = Arc::new(MockFaceDetector::new(vec![a_face(vec![0.0, 1.0, 0.0, 0.0])]));
    let worker = RecognitionWorker::new(detector, face_index, binding, repo.clone(), worker_config());

    let detections = worker.process_frame(camera_id, &[0xFF, 0xD8], 1280.0, 720.0, None).await.unwrap();

    assert_eq!(detections.len(), 1);
    assert_eq!(detections[0].person_face_id, None);
    assert!(detections[0].embedding.is_some());
    assert_eq!(format!("{:?}", detections[0].status), "Detected");
}

#[tokio::test]
async fn camera_with_no_active_binding_discards_frame_without_error() {
    let repo = Arc::new(MemoryRepository::new());
    let camera = Camera { id: 20, organization_id: 1, name: "Dock".into(), stream_url: "rtsp://cam/dock".into(), is_active: true };
    repo.insert_camera(camera).await;

    let face_index = Arc::new(FaceIndex::new(repo.clone()));
    face_index.initialize().await.unwrap();

    let binding = Arc::new(EventCameraBindingService::new(repo.clone(), repo.clone()));
    let detector = Arc::new(MockFaceDetector::new(vec![a_face(vec![1.0, 0.0, 0.0, 0.0]), a_face(vec![0.0, 1.0, 0.0, 0.0])]));
    let worker = RecognitionWorker::new(detector, face_index, binding, repo.clone(), worker_config());

    let detections = worker.process_frame(20, &[0xFF, 0xD8], 1280.0, 720.0, None).await.unwrap();
    assert!(detections.is_empty());
}

#[tokio::test]
async fn newly_added_face_is_searchable_alongside_initialized_entries() {
    let (repo, _event_id, _camera_id) = seeded_repo().await;
    let face_index = Arc::new(FaceIndex::new(repo.clone()));
    face_index.initialize().await.unwrap();

    let person = Person { id: 2, organization_id: 1, name: "Bob".into(), document_number: None, status: PersonStatus::Active };
    let new_embedding = vec![0.0_f32, 0.0, 1.0, 0.0];
    let face = PersonFace {
        id: 2,
        person_id: 2,
        embedding: Some(PersonFace::encode_embedding(&new_embedding)),
        reliability: 1.0,
        status: FaceStatus::Active,
    };
    face_index.add(&face, &person).await.unwrap();

    let matches = face_index.search(&new_embedding, 1).await;
    assert!(matches.iter().any(|m| m.person_face_id == 2 && m.is_match));
}

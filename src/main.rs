mod config;
mod error;
mod routes;
mod sink;
mod starter;
mod state;

use crate::config::RuntimeConfig;
use crate::sink::RecognitionFrameSink;
use crate::starter::OrchestratorSessionStarter;
use crate::state::AppState;
use anyhow::Result;
use common::repository::{CameraRepo, DetectionRepo, EventCameraRepo, EventRepo, PersonFaceRepo};
use face_index::FaceIndex;
use frame_extraction::SessionManager;
use recognition_worker::{
    FaceDetector, MockFaceDetector, OrtFaceDetector, OrtFaceDetectorConfig, RecognitionWorker,
    TimeoutGuardedDetector,
};
use repository::{MemoryRepository, PgRepository};
use scheduler::{EventCameraBindingService, ScheduledEventOrchestrator};
use std::env;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init();

    let config = RuntimeConfig::from_env()?;
    let bind_addr = config.bind_addr;

    let (person_face_repo, event_camera_repo, event_repo, camera_repo, detection_repo): (
        Arc<dyn PersonFaceRepo>,
        Arc<dyn EventCameraRepo>,
        Arc<dyn EventRepo>,
        Arc<dyn CameraRepo>,
        Arc<dyn DetectionRepo>,
    ) = match &config.database_url {
        Some(url) => {
            let pg = Arc::new(PgRepository::connect(url).await?);
            (pg.clone(), pg.clone(), pg.clone(), pg.clone(), pg)
        }
        None => {
            let mem = Arc::new(MemoryRepository::new());
            (mem.clone(), mem.clone(), mem.clone(), mem.clone(), mem)
        }
    };

    let face_index = Arc::new(FaceIndex::new(person_face_repo.clone()));
    let worker_config = config.recognition_worker_config();
    face_index.set_threshold(worker_config.face_index_threshold).await;
    face_index.initialize().await?;

    let detector: Arc<dyn FaceDetector> = match env::var("FACE_DETECTOR_BACKEND").as_deref() {
        Ok("mock") => Arc::new(MockFaceDetector::empty()),
        _ => Arc::new(OrtFaceDetector::new(OrtFaceDetectorConfig {
            detection_model_path: worker_config.detection_model_path.clone(),
            embedding_model_path: worker_config.embedding_model_path.clone(),
            execution_provider: worker_config.execution_provider.clone(),
            device_id: worker_config.device_id,
            ..Default::default()
        })),
    };
    let guarded_detector: Arc<dyn FaceDetector> =
        Arc::new(TimeoutGuardedDetector::new(detector, worker_config.detector_timeout_ms));

    let binding_service = Arc::new(EventCameraBindingService::new(event_camera_repo.clone(), event_repo.clone()));

    let worker = Arc::new(RecognitionWorker::new(
        guarded_detector,
        face_index.clone(),
        binding_service.clone(),
        detection_repo,
        worker_config,
    ));

    let frame_extraction_config = config.frame_extraction_config();
    let frame_width = frame_extraction_config.default_frame_width;
    let frame_height = frame_extraction_config.default_frame_height;
    let sink = Arc::new(RecognitionFrameSink::new(worker, event_repo.clone(), frame_width, frame_height));
    let session_manager = SessionManager::new(frame_extraction_config, sink);
    session_manager.spawn_health_monitor().await;

    let scheduler_config = config.scheduler_config();
    let starter = Arc::new(OrchestratorSessionStarter::new(
        session_manager.clone(),
        scheduler_config.camera_username.clone(),
        scheduler_config.camera_password.clone(),
        config.frame_interval_secs,
    ));
    let orchestrator = ScheduledEventOrchestrator::new(event_repo, event_camera_repo, camera_repo.clone(), starter);
    tokio::spawn(orchestrator.clone().run());

    let state = AppState::new(
        session_manager,
        camera_repo,
        scheduler_config.camera_username,
        scheduler_config.camera_password,
        config.frame_interval_secs,
    );
    let app = routes::router(state);
    let listener = TcpListener::bind(bind_addr).await?;

    info!(addr = %bind_addr, "quadrant-vms listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
            let _ = sigterm.recv().await;
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

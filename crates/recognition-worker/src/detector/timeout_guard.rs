//! Wraps a `FaceDetector` with a per-call deadline. A detector that hangs
//! past the deadline is disposed and reinitialized before the call returns,
//! so a stuck ONNX session can't wedge the worker permanently — the next
//! call gets a fresh session. The timed-out call itself reports an empty
//! frame rather than an error, matching every other "detector found nothing"
//! outcome.

use super::{DetectOutput, FaceDetector};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

pub struct TimeoutGuardedDetector {
    inner: Arc<dyn FaceDetector>,
    timeout: Duration,
}

impl TimeoutGuardedDetector {
    pub fn new(inner: Arc<dyn FaceDetector>, timeout_ms: u64) -> Self {
        Self {
            inner,
            timeout: Duration::from_millis(timeout_ms),
        }
    }
}

#[async_trait]
impl FaceDetector for TimeoutGuardedDetector {
    async fn detect(&self, jpeg: &[u8]) -> Result<DetectOutput> {
        match tokio::time::timeout(self.timeout, self.inner.detect(jpeg)).await {
            Ok(result) => result,
            Err(_) => {
                let timeout_ms = self.timeout.as_millis() as u64;
                warn!(timeout_ms, "detector call timed out, recycling session");
                if let Err(e) = self.inner.dispose().await {
                    warn!(error = %e, "dispose after timeout failed");
                }
                if let Err(e) = self.inner.reinitialize().await {
                    warn!(error = %e, "reinitialize after timeout failed");
                }
                Ok(DetectOutput { faces: vec![], processing_ms: timeout_ms })
            }
        }
    }

    async fn dispose(&self) -> Result<()> {
        self.inner.dispose().await
    }

    async fn reinitialize(&self) -> Result<()> {
        self.inner.reinitialize().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::mock::MockFaceDetector;

    #[tokio::test]
    async fn fast_call_passes_through() {
        let mock = Arc::new(MockFaceDetector::empty());
        let guarded = TimeoutGuardedDetector::new(mock, 1000);
        let out = guarded.detect(&[]).await.unwrap();
        assert_eq!(out.faces.len(), 0);
    }

    #[tokio::test]
    async fn hung_call_times_out_and_recycles_session() {
        let mock = Arc::new(MockFaceDetector::empty());
        mock.hang_next_call_for(Duration::from_millis(200)).await;
        let guarded = TimeoutGuardedDetector::new(mock.clone(), 20);

        let out = guarded.detect(&[]).await.unwrap();
        assert!(out.faces.is_empty());
        assert_eq!(mock.dispose_calls(), 1);
        assert_eq!(mock.reinitialize_calls(), 1);
    }
}

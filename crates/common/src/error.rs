//! Typed error taxonomy for the pipeline core.
//!
//! Handlers and the top-level runtime convert these into `anyhow::Error` with
//! `.context(...)` at the boundary; internal pipeline stages match on variants
//! to decide retry/drop/ignore behavior per the propagation policy.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("operation timed out after {0}ms")]
    Timeout(u64),

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("no active event for camera {0}")]
    NoActiveEvent(i64),

    #[error("index at capacity")]
    CapacityExhausted,

    #[error("persistence error: {0}")]
    Persist(#[from] sqlx::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dimension_mismatch_formats_both_sides() {
        let e = CoreError::DimensionMismatch {
            expected: 128,
            actual: 512,
        };
        assert!(e.to_string().contains("128"));
        assert!(e.to_string().contains("512"));
    }
}

// Metric names/help strings below are static literals; construction cannot
// fail for them in practice.
#![allow(clippy::expect_used)]

use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    pub static ref FRAMES_PROCESSED_TOTAL: IntCounterVec = {
        let counter = IntCounterVec::new(
            Opts::new("recognition_frames_processed_total", "Frames passed through the recognition worker, by outcome"),
            &["status"],
        )
        .expect("metric creation");
        REGISTRY.register(Box::new(counter.clone())).ok();
        counter
    };
    pub static ref DETECTIONS_TOTAL: IntCounterVec = {
        let counter = IntCounterVec::new(
            Opts::new("recognition_detections_total", "Detections persisted, by resulting status"),
            &["status"],
        )
        .expect("metric creation");
        REGISTRY.register(Box::new(counter.clone())).ok();
        counter
    };
}

pub fn render() -> String {
    let mut buf = Vec::new();
    let encoder = TextEncoder::new();
    let mfs = REGISTRY.gather();
    encoder.encode(&mfs, &mut buf).ok();
    String::from_utf8(buf).unwrap_or_default()
}

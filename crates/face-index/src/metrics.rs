// Metric names/help strings below are static literals; construction cannot
// fail for them in practice.
#![allow(clippy::expect_used)]

use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    pub static ref FACE_INDEX_SIZE: IntGauge = {
        let gauge = IntGauge::new("face_index_size", "number of committed faces in the ANN index")
            .expect("metric creation");
        REGISTRY.register(Box::new(gauge.clone())).ok();
        gauge
    };
    pub static ref FACE_INDEX_REBUILDS_TOTAL: IntCounter = {
        let counter = IntCounter::new(
            "face_index_rebuilds_total",
            "number of ANN index rebuilds performed",
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

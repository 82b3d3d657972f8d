// Metric names/help strings below are static literals; construction cannot
// fail for them in practice.
#![allow(clippy::expect_used)]

use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

pub static SESSIONS_RUNNING: Lazy<IntGauge> = Lazy::new(|| {
    let g = IntGauge::new("frame_sessions_active", "Number of running extraction sessions")
        .expect("metric can be created");
    REGISTRY.register(Box::new(g.clone())).ok();
    g
});

pub static DECODER_RESTARTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let c = IntCounterVec::new(
        Opts::new("frame_session_restarts_total", "Total decoder subprocess restarts"),
        &[],
    )
    .expect("metric can be created");
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

pub static FRAMES_DROPPED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let c = IntCounterVec::new(
        Opts::new(
            "frame_drops_total",
            "Total frames dropped by admission control or parser resets",
        ),
        &["reason"],
    )
    .expect("metric can be created");
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

pub static ACTIVE_FRAME_PROCESSES: Lazy<IntGauge> = Lazy::new(|| {
    let g = IntGauge::new("frame_extraction_active_frame_processes", "Frames currently in flight through C3")
        .expect("metric can be created");
    REGISTRY.register(Box::new(g.clone())).ok();
    g
});

pub fn render() -> String {
    let mut buf = Vec::new();
    let encoder = TextEncoder::new();
    let mfs = REGISTRY.gather();
    encoder.encode(&mfs, &mut buf).ok();
    String::from_utf8(buf).unwrap_or_default()
}

// Prometheus metrics for the Arbiter API

use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    pub static ref SUBMISSIONS_QUEUED: IntCounter =
        IntCounter::new("arbiter_submissions_queued_total", "Submissions pushed to the queue")
            .expect("metric can be created");
    pub static ref SUBMISSIONS_REJECTED: IntCounterVec = IntCounterVec::new(
        Opts::new("arbiter_submissions_rejected_total", "Submissions refused at admission"),
        &["reason"]
    )
    .expect("metric can be created");
    pub static ref ATTEMPTS_STARTED: IntCounter =
        IntCounter::new("arbiter_attempts_started_total", "Contest attempts started")
            .expect("metric can be created");
    pub static ref ASSETS_STORED: IntCounter =
        IntCounter::new("arbiter_assets_stored_total", "Assets written to object storage")
            .expect("metric can be created");
}

pub fn register_metrics() -> prometheus::Result<()> {
    REGISTRY.register(Box::new(SUBMISSIONS_QUEUED.clone()))?;
    REGISTRY.register(Box::new(SUBMISSIONS_REJECTED.clone()))?;
    REGISTRY.register(Box::new(ATTEMPTS_STARTED.clone()))?;
    REGISTRY.register(Box::new(ASSETS_STORED.clone()))?;
    Ok(())
}

pub fn render() -> String {
    let mut buffer = Vec::new();
    if let Err(e) = TextEncoder::new().encode(&REGISTRY.gather(), &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
    }
    String::from_utf8(buffer).unwrap_or_default()
}

//! Metrics helper structs for convenient metric recording

use std::time::Duration;

use prometheus::{Encoder, TextEncoder};

use super::{
    FETCH_LATENCY, NOTIFICATIONS_DELIVERED_TOTAL, OVERRIDE_RESOLUTIONS_TOTAL, POLL_CYCLES_TOTAL,
    SUBSCRIPTIONS_ACTIVE,
};

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

/// Helper struct for recording poll loop metrics
pub struct PollMetrics;

impl PollMetrics {
    pub fn record_delivered_cycle(count: usize) {
        POLL_CYCLES_TOTAL.with_label_values(&["delivered"]).inc();
        NOTIFICATIONS_DELIVERED_TOTAL.inc_by(count as u64);
    }

    pub fn record_empty_cycle() {
        POLL_CYCLES_TOTAL.with_label_values(&["empty"]).inc();
    }

    pub fn record_failed_cycle() {
        POLL_CYCLES_TOTAL.with_label_values(&["error"]).inc();
    }

    pub fn observe_fetch(elapsed: Duration) {
        FETCH_LATENCY.observe(elapsed.as_secs_f64());
    }

    pub fn subscription_opened() {
        SUBSCRIPTIONS_ACTIVE.inc();
    }

    pub fn subscription_closed() {
        SUBSCRIPTIONS_ACTIVE.dec();
    }
}

/// Helper struct for recording override metrics
pub struct OverrideMetrics;

impl OverrideMetrics {
    pub fn record(outcome: &str) {
        OVERRIDE_RESOLUTIONS_TOTAL.with_label_values(&[outcome]).inc();
    }
}

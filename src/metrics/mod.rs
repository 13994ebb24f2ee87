//! Prometheus metrics for the subscription engine.
//!
//! - Poll metrics (cycles by outcome, notifications delivered, fetch latency)
//! - Subscription metrics (active subscriptions)
//! - Override metrics (resolutions by outcome)

mod helpers;

pub use helpers::{encode_metrics, OverrideMetrics, PollMetrics};

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "change_notifications";

lazy_static! {
    /// Poll cycles by outcome (delivered, empty, error)
    pub static ref POLL_CYCLES_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_poll_cycles_total", METRIC_PREFIX),
        "Total poll cycles by outcome",
        &["outcome"]
    ).unwrap();

    /// Notifications handed to subscribers
    pub static ref NOTIFICATIONS_DELIVERED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_notifications_delivered_total", METRIC_PREFIX),
        "Total notifications delivered to subscribers"
    ).unwrap();

    /// Source fetch latency in seconds
    pub static ref FETCH_LATENCY: Histogram = register_histogram!(
        format!("{}_fetch_latency_seconds", METRIC_PREFIX),
        "Latency of notification source fetches",
        vec![0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    ).unwrap();

    /// Subscriptions currently polling or waiting for demand
    pub static ref SUBSCRIPTIONS_ACTIVE: IntGauge = register_int_gauge!(
        format!("{}_subscriptions_active", METRIC_PREFIX),
        "Number of registered subscriptions"
    ).unwrap();

    /// Override resolutions by outcome (applied, unchanged, skipped_deleted, failed)
    pub static ref OVERRIDE_RESOLUTIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_override_resolutions_total", METRIC_PREFIX),
        "Override resolutions by outcome",
        &["outcome"]
    ).unwrap();
}

//! Metrics definitions for the accelerator.
//!
//! All metrics follow Prometheus naming conventions:
//! - `acc_` prefix
//! - `_total` suffix for counters
//!
//! # Cardinality
//!
//! Labels are bounded:
//! - `event`: 2 values (start, end)
//! - `status`: 3 values (success, error, network_error)
//! - `stream_type`: 3 values (camera, screen, sip)

use common::types::StreamType;
use metrics::{counter, gauge};

/// Record a call lifecycle transition.
///
/// Metric: `acc_calls_total`
/// Labels: `event` (start, end)
pub fn record_call(event: &'static str) {
    counter!("acc_calls_total", "event" => event).increment(1);
}

/// Record a publish outcome.
///
/// Metric: `acc_publish_total`
/// Labels: `status` (success, error, network_error)
pub fn record_publish(status: &'static str) {
    counter!("acc_publish_total", "status" => status).increment(1);
}

/// Record a subscribe outcome.
///
/// Metric: `acc_subscribe_total`
/// Labels: `stream_type`, `status` (success, error)
///
/// Cardinality: 6
pub fn record_subscribe(stream_type: StreamType, status: &'static str) {
    counter!(
        "acc_subscribe_total",
        "stream_type" => stream_type.as_str(),
        "status" => status
    )
    .increment(1);
}

/// Record a call refused by the connection limit.
///
/// Metric: `acc_admission_rejected_total`
pub fn record_admission_rejected() {
    counter!("acc_admission_rejected_total").increment(1);
}

/// Record callback invocations for one dispatched event.
///
/// Metric: `acc_events_dispatched_total`
///
/// Event names are not used as a label; custom names are unbounded.
pub fn record_events_dispatched(listeners: usize) {
    counter!("acc_events_dispatched_total").increment(listeners as u64);
}

/// Set the number of subscribers in the registry.
///
/// Metric: `acc_subscribers_active`
pub fn set_subscribers_active(count: usize) {
    // usize to f64 conversion is safe for realistic subscriber counts
    #[allow(clippy::cast_precision_loss)]
    gauge!("acc_subscribers_active").set(count as f64);
}

//! # Engine Metrics
//!
//! Prometheus counters for stream lifecycle events. Nothing here is touched
//! per item.
//!
//! ## Usage
//!
//! Enable with the `metrics` feature:
//! ```toml
//! flowline-engine = { path = "...", features = ["metrics"] }
//! ```
//!
//! ## Metrics Exported
//!
//! - `flowline_subscriptions_total` - Subscriptions handed out by sources
//! - `flowline_cancellations_total` - Sources cancelled by their downstream
//! - `flowline_errors_total` - Errors originated by the engine, by kind
//! - `flowline_inner_streams_total` - Inner streams subscribed by flat-map

#[cfg(feature = "metrics")]
use lazy_static::lazy_static;

#[cfg(feature = "metrics")]
use prometheus::{register_int_counter, register_int_counter_vec, IntCounter, IntCounterVec};

#[cfg(feature = "metrics")]
lazy_static! {
    /// Subscriptions handed out by sources
    pub static ref SUBSCRIPTIONS: IntCounter = register_int_counter!(
        "flowline_subscriptions_total",
        "Total number of subscriptions created by sources"
    )
    .expect("Failed to create SUBSCRIPTIONS metric");

    /// Sources cancelled by their downstream
    pub static ref CANCELLATIONS: IntCounter = register_int_counter!(
        "flowline_cancellations_total",
        "Total number of cancelled source subscriptions"
    )
    .expect("Failed to create CANCELLATIONS metric");

    /// Errors raised inside the engine, labeled by error kind
    pub static ref ERRORS: IntCounterVec = register_int_counter_vec!(
        "flowline_errors_total",
        "Total number of errors raised by stream stages",
        &["kind"]
    )
    .expect("Failed to create ERRORS metric");

    /// Inner streams subscribed by flat-map operators
    pub static ref INNER_STREAMS: IntCounter = register_int_counter!(
        "flowline_inner_streams_total",
        "Total number of inner streams subscribed by flat-map"
    )
    .expect("Failed to create INNER_STREAMS metric");
}

/// Register every engine metric with the default registry.
#[cfg(feature = "metrics")]
pub fn register_metrics() {
    lazy_static::initialize(&SUBSCRIPTIONS);
    lazy_static::initialize(&CANCELLATIONS);
    lazy_static::initialize(&ERRORS);
    lazy_static::initialize(&INNER_STREAMS);
}

#[cfg(feature = "metrics")]
pub fn record_subscription() {
    SUBSCRIPTIONS.inc();
}

#[cfg(feature = "metrics")]
pub fn record_cancellation() {
    CANCELLATIONS.inc();
}

/// Record an error by its `FlowError::kind` label
#[cfg(feature = "metrics")]
pub fn record_error(kind: &str) {
    ERRORS.with_label_values(&[kind]).inc();
}

#[cfg(feature = "metrics")]
pub fn record_inner_stream() {
    INNER_STREAMS.inc();
}

// No-op implementations when metrics feature is disabled
#[cfg(not(feature = "metrics"))]
pub fn register_metrics() {}

#[cfg(not(feature = "metrics"))]
pub fn record_subscription() {}

#[cfg(not(feature = "metrics"))]
pub fn record_cancellation() {}

#[cfg(not(feature = "metrics"))]
pub fn record_error(_kind: &str) {}

#[cfg(not(feature = "metrics"))]
pub fn record_inner_stream() {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recorders_never_panic() {
        register_metrics();
        record_subscription();
        record_cancellation();
        record_error("callback");
        record_inner_stream();
    }

    #[cfg(feature = "metrics")]
    #[test]
    fn test_error_counter_is_labeled() {
        let before = ERRORS.with_label_values(&["null_element"]).get();
        record_error("null_element");
        assert_eq!(ERRORS.with_label_values(&["null_element"]).get(), before + 1);
    }
}

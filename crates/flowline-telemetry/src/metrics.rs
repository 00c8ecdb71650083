//! Prometheus export of the engine counters.

use prometheus::{Encoder, TextEncoder};

use crate::TelemetryError;

/// Encode every metric in the default registry as Prometheus text format.
///
/// Registers the engine counters first, so they appear (at zero) even
/// before any stream ran.
pub fn encode_metrics() -> Result<String, TelemetryError> {
    flowline_engine::metrics::register_metrics();

    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::Metrics(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::Metrics(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowline_engine::{Collector, Multi};

    #[test]
    fn test_engine_counters_are_exported() {
        let text = encode_metrics().unwrap();
        assert!(text.contains("flowline_subscriptions_total"));
        assert!(text.contains("flowline_cancellations_total"));
        assert!(text.contains("flowline_inner_streams_total"));
    }

    #[test]
    fn test_subscriptions_are_counted() {
        let before = flowline_engine::metrics::SUBSCRIPTIONS.get();
        let count = Multi::range(0, 3)
            .collect(Collector::counting())
            .blocking_get()
            .unwrap();
        assert_eq!(count, 3);
        assert!(flowline_engine::metrics::SUBSCRIPTIONS.get() > before);
    }
}

//! Prometheus metric set.
//!
//! Everything is registered against an owned [`Registry`] so tests can build
//! isolated instances; the management server gathers from
//! [`Metrics::registry`].

use prometheus::{
    Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
};

/// Buckets for detector scan durations: detection is sub-millisecond for
/// typical chat messages.
const DETECTOR_BUCKETS: &[f64] = &[0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1];

/// Counters and gauges exposed by the proxy.
#[derive(Clone)]
pub struct Metrics {
    pub registry: Registry,

    /// Requests processed, by method and host.
    pub requests_total: IntCounterVec,
    /// Secrets detected, by interceptor and secret type.
    pub secrets_detected_total: IntCounterVec,
    /// Secrets replaced with placeholders.
    pub secrets_replaced_total: IntCounter,
    /// Placeholders restored to secrets in responses.
    pub placeholders_restored_total: IntCounter,
    /// Placeholders with no mapping at restoration time.
    pub placeholders_not_found_total: IntCounter,
    /// Streaming chunks processed.
    pub streaming_chunks_total: IntCounter,
    /// TLS errors, by kind.
    pub tls_errors_total: IntCounterVec,
    /// Upstream transport errors, by host and kind.
    pub upstream_errors_total: IntCounterVec,
    /// Mapping store write failures.
    pub storage_errors_total: IntCounter,
    /// Bytes through the proxy, by direction (`request` / `response`).
    pub bytes_transferred_total: IntCounterVec,
    /// Request/response processing latency, by direction.
    pub request_duration_seconds: HistogramVec,
    /// Time spent in secret detection, by interceptor.
    pub interceptor_duration_seconds: HistogramVec,
    /// Current number of stored mappings.
    pub mapping_store_size: IntGauge,
    /// Currently open client connections.
    pub active_connections: IntGauge,
    /// Whole-stream restoration latency.
    pub stream_flush_duration_seconds: Histogram,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let requests_total = IntCounterVec::new(
            Opts::new(
                "keymask_requests_total",
                "Total number of requests processed by the proxy",
            ),
            &["method", "host"],
        )
        .expect("valid metric");

        let secrets_detected_total = IntCounterVec::new(
            Opts::new(
                "keymask_secrets_detected_total",
                "Total number of secrets detected",
            ),
            &["interceptor", "type"],
        )
        .expect("valid metric");

        let secrets_replaced_total = IntCounter::new(
            "keymask_secrets_replaced_total",
            "Total number of secrets replaced with placeholders",
        )
        .expect("valid metric");

        let placeholders_restored_total = IntCounter::new(
            "keymask_placeholders_restored_total",
            "Total number of placeholders restored to secrets in responses",
        )
        .expect("valid metric");

        let placeholders_not_found_total = IntCounter::new(
            "keymask_placeholders_not_found_total",
            "Placeholders seen in responses with no stored mapping",
        )
        .expect("valid metric");

        let streaming_chunks_total = IntCounter::new(
            "keymask_streaming_chunks_processed_total",
            "Total number of streaming chunks processed",
        )
        .expect("valid metric");

        let tls_errors_total = IntCounterVec::new(
            Opts::new("keymask_tls_errors_total", "Total number of TLS errors"),
            &["type"],
        )
        .expect("valid metric");

        let upstream_errors_total = IntCounterVec::new(
            Opts::new(
                "keymask_upstream_errors_total",
                "Total number of upstream connection errors",
            ),
            &["host", "type"],
        )
        .expect("valid metric");

        let storage_errors_total = IntCounter::new(
            "keymask_storage_errors_total",
            "Mapping store operations that failed",
        )
        .expect("valid metric");

        let bytes_transferred_total = IntCounterVec::new(
            Opts::new(
                "keymask_bytes_transferred_total",
                "Total bytes transferred through the proxy",
            ),
            &["direction"],
        )
        .expect("valid metric");

        let request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "keymask_request_duration_seconds",
                "Request processing duration in seconds",
            ),
            &["direction"],
        )
        .expect("valid metric");

        let interceptor_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "keymask_interceptor_duration_seconds",
                "Time spent in secret detection",
            )
            .buckets(DETECTOR_BUCKETS.to_vec()),
            &["interceptor"],
        )
        .expect("valid metric");

        let mapping_store_size = IntGauge::new(
            "keymask_mapping_store_size",
            "Current number of secret mappings stored",
        )
        .expect("valid metric");

        let active_connections = IntGauge::new(
            "keymask_active_connections",
            "Current number of active proxy connections",
        )
        .expect("valid metric");

        let stream_flush_duration_seconds = Histogram::with_opts(HistogramOpts::new(
            "keymask_stream_flush_duration_seconds",
            "Time spent restoring placeholders in streaming flushes",
        ))
        .expect("valid metric");

        for collector in [
            Box::new(requests_total.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(secrets_detected_total.clone()),
            Box::new(secrets_replaced_total.clone()),
            Box::new(placeholders_restored_total.clone()),
            Box::new(placeholders_not_found_total.clone()),
            Box::new(streaming_chunks_total.clone()),
            Box::new(tls_errors_total.clone()),
            Box::new(upstream_errors_total.clone()),
            Box::new(storage_errors_total.clone()),
            Box::new(bytes_transferred_total.clone()),
            Box::new(request_duration_seconds.clone()),
            Box::new(interceptor_duration_seconds.clone()),
            Box::new(mapping_store_size.clone()),
            Box::new(active_connections.clone()),
            Box::new(stream_flush_duration_seconds.clone()),
        ] {
            registry.register(collector).expect("unique metric names");
        }

        Self {
            registry,
            requests_total,
            secrets_detected_total,
            secrets_replaced_total,
            placeholders_restored_total,
            placeholders_not_found_total,
            streaming_chunks_total,
            tls_errors_total,
            upstream_errors_total,
            storage_errors_total,
            bytes_transferred_total,
            request_duration_seconds,
            interceptor_duration_seconds,
            mapping_store_size,
            active_connections,
            stream_flush_duration_seconds,
        }
    }

    /// Records a detected secret.
    pub fn record_detection(&self, interceptor: &str, kind: &str) {
        self.secrets_detected_total
            .with_label_values(&[interceptor, kind])
            .inc();
    }

    /// Records an upstream error.
    pub fn record_upstream_error(&self, host: &str, kind: &str) {
        self.upstream_errors_total
            .with_label_values(&[host, kind])
            .inc();
    }

    /// Records a TLS error.
    pub fn record_tls_error(&self, kind: &str) {
        self.tls_errors_total.with_label_values(&[kind]).inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_register_without_collision() {
        let metrics = Metrics::new();
        metrics.record_detection("pattern", "token");
        metrics.record_detection("pattern", "token");
        metrics.record_tls_error("handshake");
        metrics.secrets_replaced_total.inc();

        let families = metrics.registry.gather();
        assert!(families
            .iter()
            .any(|f| f.get_name() == "keymask_secrets_detected_total"));
    }

    #[test]
    fn detection_counter_accumulates_per_label() {
        let metrics = Metrics::new();
        metrics.record_detection("entropy", "high_entropy");
        metrics.record_detection("entropy", "high_entropy");
        let value = metrics
            .secrets_detected_total
            .with_label_values(&["entropy", "high_entropy"])
            .get();
        assert_eq!(value, 2);
    }

    #[test]
    fn independent_instances_do_not_share_state() {
        let a = Metrics::new();
        let b = Metrics::new();
        a.secrets_replaced_total.inc();
        assert_eq!(a.secrets_replaced_total.get(), 1);
        assert_eq!(b.secrets_replaced_total.get(), 0);
    }
}

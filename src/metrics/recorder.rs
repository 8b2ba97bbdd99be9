//! Metrics recording implementation using Prometheus.

use prometheus::{
    CounterVec, Encoder, HistogramVec, IntCounter, Opts, Registry, TextEncoder,
    register_counter_vec_with_registry, register_histogram_vec_with_registry,
    register_int_counter_with_registry,
};
use std::sync::Arc;

/// Trait for recording client metrics.
pub trait MetricsRecorder: Send + Sync + 'static {
    /// Records a completed logical request (including any retry) and its outcome.
    fn record_request(&self, method: &str, outcome: &str);

    /// Records the wall-clock duration of a logical request.
    fn record_request_duration(&self, method: &str, duration_secs: f64);

    /// Records a network call to the refresh endpoint.
    fn record_refresh(&self, result: &str);

    /// Records a request that was resent after a successful refresh.
    fn record_retry(&self);

    /// Records a redirect to the login destination.
    fn record_redirect(&self);
}

/// Recorder used when metrics are disabled.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopMetrics;

impl MetricsRecorder for NoopMetrics {
    fn record_request(&self, _method: &str, _outcome: &str) {}
    fn record_request_duration(&self, _method: &str, _duration_secs: f64) {}
    fn record_refresh(&self, _result: &str) {}
    fn record_retry(&self) {}
    fn record_redirect(&self) {}
}

/// Prometheus metrics collector.
#[derive(Clone)]
pub struct Metrics {
    registry: Arc<Registry>,

    requests_total: CounterVec,
    request_duration_seconds: HistogramVec,

    refresh_total: CounterVec,
    retries_total: IntCounter,
    redirects_total: IntCounter,
}

impl Metrics {
    /// Creates a new metrics instance with its own Prometheus registry.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Arc::new(Registry::new());

        let requests_total = register_counter_vec_with_registry!(
            Opts::new(
                "api_client_requests_total",
                "Total number of logical API requests"
            ),
            &["method", "outcome"],
            registry.clone()
        )?;

        let request_duration_seconds = register_histogram_vec_with_registry!(
            "api_client_request_duration_seconds",
            "Logical API request duration in seconds, refresh and retry included",
            &["method"],
            vec![
                0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0
            ],
            registry.clone()
        )?;

        let refresh_total = register_counter_vec_with_registry!(
            Opts::new(
                "api_client_session_refresh_total",
                "Network calls made to the session refresh endpoint"
            ),
            &["result"],
            registry.clone()
        )?;

        let retries_total = register_int_counter_with_registry!(
            Opts::new(
                "api_client_retries_total",
                "Requests resent after a successful session refresh"
            ),
            registry.clone()
        )?;

        let redirects_total = register_int_counter_with_registry!(
            Opts::new(
                "api_client_login_redirects_total",
                "Redirects to the login destination after a failed refresh"
            ),
            registry.clone()
        )?;

        Ok(Metrics {
            registry,
            requests_total,
            request_duration_seconds,
            refresh_total,
            retries_total,
            redirects_total,
        })
    }

    /// Renders all metrics in Prometheus text format.
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            tracing::warn!("Failed to encode metrics: {}", e);
            return String::new();
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }
}

impl MetricsRecorder for Metrics {
    fn record_request(&self, method: &str, outcome: &str) {
        self.requests_total
            .with_label_values(&[method, outcome])
            .inc();
    }

    fn record_request_duration(&self, method: &str, duration_secs: f64) {
        self.request_duration_seconds
            .with_label_values(&[method])
            .observe(duration_secs);
    }

    fn record_refresh(&self, result: &str) {
        self.refresh_total.with_label_values(&[result]).inc();
    }

    fn record_retry(&self) {
        self.retries_total.inc();
    }

    fn record_redirect(&self) {
        self.redirects_total.inc();
    }
}

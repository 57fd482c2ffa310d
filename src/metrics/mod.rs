//! Prometheus metrics for the incident service.
//!
//! Covers HTTP traffic (via [`track_metrics`]) and the incident lifecycle:
//! creations, completions, transcript appends and index write conflicts.
//!
//! # Example
//! ```no_run
//! use ecall_incidents::metrics::INCIDENTS_CREATED_TOTAL;
//!
//! INCIDENTS_CREATED_TOTAL.inc();
//! ```

mod middleware;

pub use middleware::track_metrics;

use lazy_static::lazy_static;
use prometheus::core::Collector;
use prometheus::{Counter, CounterVec, HistogramOpts, HistogramVec, Opts, Registry};

const NAMESPACE: &str = "ecall_incidents";

lazy_static! {
    /// Global Prometheus registry for all metrics
    pub static ref PROMETHEUS_REGISTRY: Registry = Registry::new();

    // ============================================================================
    // HTTP Metrics
    // ============================================================================

    /// Total number of HTTP requests received
    ///
    /// Labels: method, path, status_code
    pub static ref HTTP_REQUESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("http_requests_total", "Total number of HTTP requests")
            .namespace(NAMESPACE),
        &["method", "path", "status_code"]
    ).expect("Failed to create HTTP_REQUESTS_TOTAL metric");

    /// HTTP request duration in seconds
    ///
    /// Labels: method, path
    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "http_request_duration_seconds",
            "HTTP request duration in seconds"
        )
        .namespace(NAMESPACE)
        .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        &["method", "path"]
    ).expect("Failed to create HTTP_REQUEST_DURATION_SECONDS metric");

    // ============================================================================
    // Incident Metrics
    // ============================================================================

    /// Total number of incidents created
    pub static ref INCIDENTS_CREATED_TOTAL: Counter = Counter::with_opts(
        Opts::new("incidents_created_total", "Total number of incidents created")
            .namespace(NAMESPACE)
    ).expect("Failed to create INCIDENTS_CREATED_TOTAL metric");

    /// Total number of incidents moved to completed
    pub static ref INCIDENTS_COMPLETED_TOTAL: Counter = Counter::with_opts(
        Opts::new("incidents_completed_total", "Total number of incidents completed")
            .namespace(NAMESPACE)
    ).expect("Failed to create INCIDENTS_COMPLETED_TOTAL metric");

    /// Total number of transcript messages appended
    pub static ref TRANSCRIPT_MESSAGES_TOTAL: Counter = Counter::with_opts(
        Opts::new("transcript_messages_total", "Total number of transcript messages appended")
            .namespace(NAMESPACE)
    ).expect("Failed to create TRANSCRIPT_MESSAGES_TOTAL metric");

    /// Compare-and-swap attempts on the active index that lost to another writer
    pub static ref INDEX_CAS_CONFLICTS_TOTAL: Counter = Counter::with_opts(
        Opts::new("index_cas_conflicts_total", "Active index compare-and-swap conflicts")
            .namespace(NAMESPACE)
    ).expect("Failed to create INDEX_CAS_CONFLICTS_TOTAL metric");
}

/// Register all metrics with the global registry
///
/// Safe to call more than once; metrics already registered are skipped.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    register(HTTP_REQUESTS_TOTAL.clone())?;
    register(HTTP_REQUEST_DURATION_SECONDS.clone())?;
    register(INCIDENTS_CREATED_TOTAL.clone())?;
    register(INCIDENTS_COMPLETED_TOTAL.clone())?;
    register(TRANSCRIPT_MESSAGES_TOTAL.clone())?;
    register(INDEX_CAS_CONFLICTS_TOTAL.clone())?;

    tracing::debug!("Prometheus metrics registered");
    Ok(())
}

fn register<C: Collector + 'static>(collector: C) -> Result<(), prometheus::Error> {
    match PROMETHEUS_REGISTRY.register(Box::new(collector)) {
        Ok(()) | Err(prometheus::Error::AlreadyReg) => Ok(()),
        Err(e) => Err(e),
    }
}

/// Render the registry in Prometheus text exposition format
pub fn gather_metrics() -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let metric_families = PROMETHEUS_REGISTRY.gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::from("# Error encoding metrics\n");
    }

    String::from_utf8(buffer).unwrap_or_else(|e| {
        tracing::error!("Failed to convert metrics to string: {}", e);
        String::from("# Error converting metrics\n")
    })
}

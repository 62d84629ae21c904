//! Prometheus metrics.
//!
//! Components record through the `metrics` facade; this module installs the
//! Prometheus recorder, describes every metric and renders the scrape output.

use axum::{extract::Request, middleware::Next, response::Response};
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::time::Instant;

/// Histogram buckets for request durations, in seconds.
const DURATION_BUCKETS: &[f64] = &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5];

/// Handle to the installed recorder.
#[derive(Clone, Default)]
pub struct MetricsRegistry {
    prometheus_handle: Option<PrometheusHandle>,
}

impl std::fmt::Debug for MetricsRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsRegistry")
            .field("prometheus_handle", &self.prometheus_handle.is_some())
            .finish()
    }
}

impl MetricsRegistry {
    /// Registry that renders nothing.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.prometheus_handle.is_some()
    }

    /// Render all metrics in Prometheus text format.
    pub fn render(&self) -> String {
        self.prometheus_handle
            .as_ref()
            .map(|h| h.render())
            .unwrap_or_default()
    }
}

/// Install the global Prometheus recorder.
///
/// # Errors
///
/// Returns an error when a recorder is already installed.
pub fn init_metrics(service_name: &str) -> anyhow::Result<MetricsRegistry> {
    let handle = PrometheusBuilder::new()
        .add_global_label("service", service_name)
        .set_buckets(DURATION_BUCKETS)?
        .install_recorder()?;

    register_metric_descriptions();
    tracing::info!(service_name = %service_name, "Metrics initialized");

    Ok(MetricsRegistry {
        prometheus_handle: Some(handle),
    })
}

fn register_metric_descriptions() {
    describe_counter!("bastion_http_requests_total", "HTTP requests by method, route and status");
    describe_histogram!("bastion_http_request_duration_seconds", "HTTP request duration in seconds");

    describe_counter!("bastion_errors_total", "Errors raised, by code and severity");

    describe_counter!("bastion_tokens_issued_total", "Credentials issued");
    describe_counter!("bastion_tokens_revoked_total", "Credentials revoked by jti");
    describe_counter!("bastion_token_validations_total", "Credential validations by outcome");
    describe_counter!("bastion_session_invalidations_total", "Per-user session invalidations");
    describe_counter!(
        "bastion_session_store_failures_total",
        "Session store calls that failed"
    );

    describe_counter!(
        "bastion_tenant_context_missing_total",
        "Tenant-scoped statements rejected for lack of a tenant"
    );
    describe_counter!("bastion_data_scope_total", "Data scope resolutions by outcome");

    describe_counter!("bastion_permission_checks_total", "Permission checks by outcome");
    describe_counter!("bastion_permission_cache_total", "Permission cache lookups by result");
}

/// Axum middleware recording request count and latency.
pub async fn track_requests(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let route = request
        .extensions()
        .get::<axum::extract::MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(request).await;

    let status = response.status().as_u16().to_string();
    histogram!(
        "bastion_http_request_duration_seconds",
        "method" => method.clone(),
        "route" => route.clone(),
    )
    .record(start.elapsed().as_secs_f64());
    counter!(
        "bastion_http_requests_total",
        "method" => method,
        "route" => route,
        "status" => status,
    )
    .increment(1);

    response
}

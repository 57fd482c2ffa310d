use crate::api::{handlers, AppState};
use crate::config::Config;
use crate::error::AppError;
use crate::metrics::track_metrics;
use axum::{
    error_handling::HandleErrorLayer,
    middleware,
    routing::{get, post},
    BoxError, Router,
};
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};

/// Build the main API router
///
/// Incident and health routes are mounted under `server.path_prefix`;
/// `/metrics` sits at the root and only exists when Prometheus is enabled.
pub fn build_router(state: AppState, config: &Config) -> Router {
    let api = Router::new()
        // Health endpoints
        .route("/health", get(handlers::health_check))
        .route("/health/live", get(handlers::health_check))
        .route("/health/ready", get(handlers::health_check))
        // Incident management
        .route(
            "/incidents",
            post(handlers::create_incident).get(handlers::list_incidents),
        )
        .route(
            "/incidents/:id",
            get(handlers::get_incident).patch(handlers::patch_incident),
        )
        .route("/incidents/:id/transcript", post(handlers::append_transcript));

    let mut app = match normalize_prefix(&config.server.path_prefix) {
        Some(prefix) => Router::new().nest(&prefix, api),
        None => api,
    };

    if config.observability.prometheus_enabled {
        app = app.route("/metrics", get(handlers::metrics));
    }

    let timeout = Duration::from_secs(config.server.request_timeout_secs);

    app
        // Add state
        .with_state(state)
        // Add middleware
        .layer(middleware::from_fn(track_metrics))
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(move |err: BoxError| async move {
                    middleware_error(err, timeout)
                }))
                .timeout(timeout),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().include_headers(true))
                .on_response(DefaultOnResponse::new().include_headers(true)),
        )
        .layer(CorsLayer::permissive())
}

/// Render errors raised by tower middleware in the response envelope
fn middleware_error(err: BoxError, timeout: Duration) -> AppError {
    if err.is::<tower::timeout::error::Elapsed>() {
        AppError::Timeout(format!("no response within {:?}", timeout))
    } else {
        AppError::Internal(format!("Unhandled middleware error: {}", err))
    }
}

/// `""`, `"/"` → no prefix; `"api/"` → `"/api"`
fn normalize_prefix(prefix: &str) -> Option<String> {
    let trimmed = prefix.trim().trim_matches('/');
    if trimmed.is_empty() {
        None
    } else {
        Some(format!("/{}", trimmed))
    }
}

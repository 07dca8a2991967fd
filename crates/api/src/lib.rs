//! HTTP worker hosting the order saga workflows.
//!
//! Provides REST endpoints to start scenario workflows, query their
//! progress and deliver address corrections, with structured logging
//! (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use saga::LocalRuntime;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use routes::orders::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/scenarios", get(routes::orders::scenarios))
        .route("/orders", post(routes::orders::create))
        .route("/orders/{id}", get(routes::orders::get))
        .route("/orders/{id}/progress", get(routes::orders::progress))
        .route("/orders/{id}/signal", post(routes::orders::signal))
        .route("/orders/{id}/update", post(routes::orders::update))
        .route("/orders/{id}/result", get(routes::orders::result))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates the application state with a simulated-activity runtime.
pub fn create_default_state(config: &Config) -> Arc<AppState> {
    Arc::new(AppState {
        runtime: LocalRuntime::simulated(config.runtime_config()),
    })
}

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

pub mod config;
pub mod error;
pub mod handlers;
pub mod normalize;
pub mod pipeline;
pub mod schema;

use pipeline::Pipeline;

/// Loaded once at startup and shared read-only by every request.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<dyn Pipeline>,
    pub threshold: f64,
}

impl AppState {
    pub fn new(pipeline: Arc<dyn Pipeline>, threshold: f64) -> Self {
        Self {
            pipeline,
            threshold,
        }
    }
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/health", get(handlers::health_check))
        .route("/predict_proba", post(handlers::predict_proba))
        .route("/predict", post(handlers::predict))
        .route("/predict_form", post(handlers::predict_form))
        // batches are unbounded
        .layer(DefaultBodyLimit::disable())
        .with_state(state)
}

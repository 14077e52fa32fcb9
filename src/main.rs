use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use churn_server::{
    app,
    config::Config,
    pipeline::{load_pipeline, load_threshold, Pipeline},
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();

    let pipeline = load_pipeline(&config.model_path)
        .with_context(|| format!("loading pipeline from {}", config.model_path.display()))?;
    tracing::info!(
        path = %config.model_path.display(),
        "loaded {}",
        pipeline.describe()
    );

    let threshold = load_threshold(&config.thresh_path)
        .with_context(|| format!("loading threshold from {}", config.thresh_path.display()))?;
    tracing::info!(path = %config.thresh_path.display(), threshold, "loaded threshold");

    let state = AppState::new(Arc::new(pipeline), threshold);
    let app = app(state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;

    tracing::info!("Churn server starting on http://{}", config.bind_addr);
    tracing::info!("Available endpoints:");
    tracing::info!("  - GET  /               - Manual test form");
    tracing::info!("  - GET  /health         - Health check");
    tracing::info!("  - POST /predict_proba  - Churn probabilities");
    tracing::info!("  - POST /predict        - Thresholded predictions");
    tracing::info!("  - POST /predict_form   - Form submission");

    axum::serve(listener, app).await.context("server failed")?;
    Ok(())
}

use axum::{body::Bytes, extract::State, response::IntoResponse, Json};
use serde::Serialize;
use uuid::Uuid;

use crate::error::ApiError;
use crate::normalize::{normalize, records_from_payload, FeatureTable};
use crate::pipeline::PipelineError;
use crate::schema::EXPECTED_COLUMNS;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct ProbaResponse {
    pub threshold: f64,
    pub probabilities: Vec<f64>,
}

#[derive(Debug, Serialize)]
pub struct PredictResponse {
    pub threshold: f64,
    pub predictions: Vec<u8>,
    pub probabilities: Vec<f64>,
}

pub fn label(probability: f64, threshold: f64) -> u8 {
    u8::from(probability >= threshold)
}

/// Runs the pipeline on the blocking pool and returns the class-1
/// probability for every row, in row order.
pub(crate) async fn churn_probabilities(
    state: &AppState,
    table: FeatureTable,
) -> Result<Vec<f64>, ApiError> {
    let rows = table.len();
    if rows == 0 {
        return Ok(Vec::new());
    }

    let pipeline = state.pipeline.clone();
    let proba = tokio::task::spawn_blocking(move || pipeline.predict_proba(&table)).await??;

    if proba.len() != rows {
        return Err(PipelineError::Unavailable(format!(
            "pipeline returned {} rows for {rows} inputs",
            proba.len()
        ))
        .into());
    }

    proba
        .into_iter()
        .enumerate()
        .map(|(row, [_, p1])| {
            if (0.0..=1.0).contains(&p1) {
                Ok(p1)
            } else {
                Err(PipelineError::InvalidProbability { row, value: p1 }.into())
            }
        })
        .collect()
}

async fn score_payload(state: &AppState, body: &[u8]) -> Result<Vec<f64>, ApiError> {
    let request_id = Uuid::new_v4();
    let records = records_from_payload(body)?;
    tracing::info!(%request_id, records = records.len(), "scoring batch");

    let table = normalize(records, &EXPECTED_COLUMNS);
    let probabilities = churn_probabilities(state, table).await.inspect_err(|e| {
        tracing::error!(%request_id, error = %e, "inference failed");
    })?;

    tracing::debug!(%request_id, ?probabilities, "batch scored");
    Ok(probabilities)
}

pub async fn predict_proba(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let probabilities = score_payload(&state, &body).await?;

    Ok(Json(ProbaResponse {
        threshold: state.threshold,
        probabilities,
    }))
}

pub async fn predict(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let probabilities = score_payload(&state, &body).await?;
    let predictions = probabilities
        .iter()
        .map(|p| label(*p, state.threshold))
        .collect();

    Ok(Json(PredictResponse {
        threshold: state.threshold,
        predictions,
        probabilities,
    }))
}

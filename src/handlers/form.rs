//! Manual-testing UI: a single-customer HTML form and its result page.

use askama::Template;
use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap},
    response::{Html, IntoResponse},
};
use uuid::Uuid;

use super::inference::{churn_probabilities, label};
use crate::error::ApiError;
use crate::normalize::{normalize, record_from_form};
use crate::pipeline::PipelineError;
use crate::schema::{EXPECTED_COLUMNS, FORM_NUMERIC_COLUMNS};
use crate::AppState;

#[derive(Template)]
#[template(path = "form.html")]
pub struct FormPage {
    pub threshold: f64,
}

#[derive(Template)]
#[template(path = "result.html")]
pub struct ResultPage {
    pub proba: String,
    pub pred: u8,
    pub threshold: f64,
}

pub async fn index(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let page = FormPage {
        threshold: state.threshold,
    };
    Ok(Html(page.render()?))
}

/// Decodes a URL-encoded body. Any other content type, or a body that does
/// not decode, is treated as an empty form.
pub fn form_fields(headers: &HeaderMap, body: &[u8]) -> Vec<(String, String)> {
    let urlencoded = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim_start().starts_with("application/x-www-form-urlencoded"));
    if !urlencoded {
        return Vec::new();
    }

    serde_urlencoded::from_bytes(body).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "undecodable form body, treating as empty");
        Vec::new()
    })
}

pub async fn predict_form(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let fields = form_fields(&headers, &body);
    let request_id = Uuid::new_v4();
    tracing::info!(%request_id, fields = fields.len(), "scoring form submission");

    let record = record_from_form(fields, &FORM_NUMERIC_COLUMNS);
    let table = normalize(vec![record], &EXPECTED_COLUMNS);
    let proba = churn_probabilities(&state, table)
        .await?
        .first()
        .copied()
        .ok_or_else(|| PipelineError::Unavailable("pipeline returned no rows".to_string()))?;

    let page = ResultPage {
        proba: format!("{proba:.3}"),
        pred: label(proba, state.threshold),
        threshold: state.threshold,
    };
    Ok(Html(page.render()?))
}

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::normalize::NormalizeError;
use crate::pipeline::PipelineError;

/// Per-request failures. Client input problems map to 400, everything that
/// goes wrong past normalization maps to 500.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    BadRequest(#[from] NormalizeError),
    #[error("inference failed: {0}")]
    Inference(#[from] PipelineError),
    #[error("inference task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
    #[error("failed to render page: {0}")]
    Render(#[from] askama::Error),
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::warn!(error = %self, "rejected request");
        }

        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

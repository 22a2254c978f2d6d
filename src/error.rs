//! Errors for dump loading, configuration and the HTTP layer.
//!
//! Reconstruction itself never fails: missing or malformed event data is
//! represented as absence in its output.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid fight dump: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid filename: {0}")]
    InvalidFilename(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("task failed: {0}")]
    Task(String),
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidFilename(_) | Self::InvalidQuery(_) => StatusCode::BAD_REQUEST,
            Self::Json(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Io(_) | Self::Config(_) | Self::Task(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = serde_json::json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        });

        (status, axum::Json(body)).into_response()
    }
}

use crate::adapters::backend::BackendError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication failed")]
    AuthError,
    #[error("Access token could not be refreshed")]
    SessionExpired,
    #[error("Not found")]
    NotFound,
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Backend rejected request ({status}): {detail}")]
    Backend { status: StatusCode, detail: String },
    #[error("Upstream error: {0}")]
    Upstream(String),
    #[error("Internal server error")]
    Internal,
}

pub type Result<T> = std::result::Result<T, AppError>;

impl From<BackendError> for AppError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Status { status, detail } => Self::Backend {
                status: StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY),
                detail,
            },
            other => Self::Upstream(other.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::AuthError => {
                tracing::debug!("Authentication failed");
                (StatusCode::UNAUTHORIZED, "Unauthorized".to_string())
            }
            Self::SessionExpired => {
                tracing::debug!("Session requires re-authentication");
                (StatusCode::UNAUTHORIZED, "RefreshAccessTokenError".to_string())
            }
            Self::NotFound => {
                tracing::debug!("Resource not found");
                (StatusCode::NOT_FOUND, "Not found".to_string())
            }
            Self::BadRequest(msg) => {
                tracing::debug!(message = %msg, "Bad request");
                (StatusCode::BAD_REQUEST, msg)
            }
            Self::Backend { status, detail } => {
                tracing::debug!(status = %status.as_u16(), detail = %detail, "Backend rejected request");
                (status, detail)
            }
            Self::Upstream(msg) => {
                tracing::error!(error = %msg, "Upstream error");
                (StatusCode::BAD_GATEWAY, "Bad gateway".to_string())
            }
            Self::Internal => {
                tracing::error!("Internal server error occurred");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid parameter: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Upstream fetch failed: {0}")]
    RemoteFetch(#[from] reqwest::Error),

    #[error("Upstream returned {0}")]
    RemoteStatus(StatusCode),

    #[error("Profile store error: {0}")]
    Store(#[from] std::io::Error),

    #[error("Malformed profile data: {0}")]
    Corrupt(#[from] serde_json::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::RemoteFetch(_) | AppError::RemoteStatus(_) => StatusCode::BAD_GATEWAY,
            AppError::Store(_) | AppError::Corrupt(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, self.to_string()).into_response()
    }
}

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Application-level errors
///
/// The recommendation variants (`ModelUnavailable`, `CorpusTooSmall`,
/// `UserUnknown`, `StrategyTimeout`) are recovered inside the strategy
/// orchestrator and drive the fallback chain; they never reach a caller of
/// `recommend()`.
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("External provider error: {0}")]
    ExternalProvider(String),

    #[error("Latent factor model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("Interaction corpus too small: {0} interactions")]
    CorpusTooSmall(usize),

    #[error("User {0} not present in the cached model")]
    UserUnknown(i64),

    #[error("Strategy {0} timed out")]
    StrategyTimeout(&'static str),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Database(_) | AppError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, self.to_string())
            }
            AppError::ExternalProvider(msg) => (StatusCode::BAD_GATEWAY, msg),
            AppError::HttpClient(_) => (StatusCode::BAD_GATEWAY, self.to_string()),
            // Recoverable engine errors should have been absorbed by the
            // fallback chain; seeing one here is an internal bug.
            AppError::ModelUnavailable(_)
            | AppError::CorpusTooSmall(_)
            | AppError::UserUnknown(_)
            | AppError::StrategyTimeout(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, self.to_string())
            }
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

/// Closed error taxonomy. Orchestration matches on variants; adapters raise
/// the variant that fits their failure, never a bag of strings.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("unauthenticated")]
    Unauthenticated,
    #[error("expired credential")]
    Expired,
    #[error("forbidden")]
    Forbidden,
    #[error("not found: {0}")]
    NotFound(String),
    #[error("message blocked")]
    MessageBlocked(crate::domain::models::GuardianVerdict),
    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("embedding service unavailable: {0}")]
    EmbeddingUnavailable(String),
    #[error("vector store error: {0}")]
    VectorStoreError(String),
    #[error("llm unavailable: {0}")]
    LLMUnavailable(String),
    #[error("llm exhausted: both primary and fallback failed")]
    LLMExhausted,
    #[error("web search unavailable: {0}")]
    WebSearchUnavailable(String),
    #[error("guardian unavailable, failing open: {0}")]
    GuardianUnavailable(String),
    #[error("turn deadline exceeded")]
    Timeout,
    #[error("storage error: {0}")]
    StorageError(String),
    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl AppError {
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "validation",
            AppError::Unauthenticated => "unauthenticated",
            AppError::Expired => "unauthenticated",
            AppError::Forbidden => "forbidden",
            AppError::NotFound(_) => "not_found",
            AppError::MessageBlocked(_) => "message_blocked",
            AppError::RateLimited { .. } => "rate_limited",
            AppError::DimensionMismatch { .. } => "validation",
            AppError::EmbeddingUnavailable(_) => "upstream_unavailable",
            AppError::VectorStoreError(_) => "internal",
            AppError::LLMUnavailable(_) => "upstream_unavailable",
            AppError::LLMExhausted => "upstream_unavailable",
            AppError::WebSearchUnavailable(_) => "upstream_unavailable",
            AppError::GuardianUnavailable(_) => "upstream_unavailable",
            AppError::Timeout => "timeout",
            AppError::StorageError(_) => "internal",
            AppError::Internal(_) => "internal",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::Validation(_) | AppError::DimensionMismatch { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Unauthenticated | AppError::Expired => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::MessageBlocked(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::EmbeddingUnavailable(_)
            | AppError::LLMUnavailable(_)
            | AppError::LLMExhausted
            | AppError::WebSearchUnavailable(_)
            | AppError::GuardianUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            AppError::VectorStoreError(_) | AppError::StorageError(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        match status {
            StatusCode::INTERNAL_SERVER_ERROR | StatusCode::SERVICE_UNAVAILABLE => {
                error!(error = %self, kind = self.kind(), "request failed");
            }
            _ => warn!(error = %self, kind = self.kind(), "request rejected"),
        }

        let body = ErrorBody {
            error: self.kind(),
            message: self.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        AppError::StorageError(e.to_string())
    }
}

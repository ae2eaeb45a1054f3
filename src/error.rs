use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

// Raised while building policies from the command line
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PolicyError {
    #[error("limit must be at least 1")]
    ZeroLimit,
    #[error("window must be longer than zero")]
    ZeroWindow,
    #[error("window must not exceed {max_secs}s")]
    WindowTooLong { max_secs: u64 },
    #[error("sweep interval must be at least 1s")]
    ZeroSweepInterval,
    #[error("retention of {retention}s is shorter than the longest window ({window}s)")]
    RetentionTooShort { retention: u64, window: u64 },
    #[error("malformed policy `{0}`, expected scope=limit/seconds")]
    Malformed(String),
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Too many requests, retry in {retry_after} seconds")]
    RateLimited { retry_after: u64 },
    #[error("Unknown scope `{0}`")]
    UnknownScope(String),
    #[error("Forbidden")]
    Forbidden,
    #[error("{0}")]
    Internal(String),
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid configuration: {0}")]
    Config(#[from] PolicyError),
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },
    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),
}

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::UnknownScope(_) => StatusCode::NOT_FOUND,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::Internal(msg) => {
                // keep the detail in the logs only
                tracing::error!("internal error: {}", msg);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let message = match &self {
            AppError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        };

        let body = ErrorBody {
            success: false,
            error: message,
        };
        let mut response = (status, axum::Json(body)).into_response();

        if let AppError::RateLimited { retry_after } = self {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after));
        }
        response
    }
}

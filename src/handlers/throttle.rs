use axum::Json;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use std::time::Instant;

use crate::client_ip::identify;
use crate::error::AppError;
use crate::metrics::REQUEST_TOTAL;
use crate::middleware::with_limit_headers;
use crate::rate_limit::{scoped_key, secs_until};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct DecisionBody {
    pub success: bool,
    pub scope: String,
    pub client: String,
    pub limit: u32,
    pub remaining: u32,
    pub reset_in: u64,
}

#[derive(Debug, Serialize)]
pub struct StatusBody {
    pub scope: String,
    pub client: String,
    pub limit: u32,
    pub remaining: u32,
    pub reset_in: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

// Counts one attempt for the caller against the scope's policy
pub async fn admit_handler(
    State(state): State<AppState>,
    Path(scope): Path<String>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let policy = state
        .policy(&scope)
        .ok_or_else(|| AppError::UnknownScope(scope.clone()))?;
    REQUEST_TOTAL.with_label_values(&[scope.as_str()]).inc();

    let client = identify(&headers);
    let decision = state.limiter.admit(&scoped_key(&scope, &client), policy);

    let response = if decision.success {
        let body = DecisionBody {
            success: true,
            limit: policy.limit(),
            remaining: decision.remaining,
            reset_in: secs_until(decision.reset_at, Instant::now()),
            scope,
            client,
        };
        Json(body).into_response()
    } else {
        tracing::warn!(%scope, %client, retry_after = ?decision.retry_after, "attempt throttled");
        AppError::RateLimited {
            retry_after: decision.retry_after.unwrap_or(1),
        }
        .into_response()
    };

    Ok(with_limit_headers(response, policy, decision.remaining, decision.reset_at))
}

// Attempts left for the caller, without using one up
pub async fn status_handler(
    State(state): State<AppState>,
    Path(scope): Path<String>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let policy = state
        .policy(&scope)
        .ok_or_else(|| AppError::UnknownScope(scope.clone()))?;

    let client = identify(&headers);
    let status = state.limiter.peek(&scoped_key(&scope, &client), policy);

    let body = StatusBody {
        limit: policy.limit(),
        remaining: status.remaining,
        reset_in: secs_until(status.reset_at, Instant::now()),
        retry_after: status.retry_after,
        scope,
        client,
    };
    Ok(with_limit_headers(
        Json(body).into_response(),
        policy,
        status.remaining,
        status.reset_at,
    ))
}

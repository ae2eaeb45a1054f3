use axum::extract::{Request, State};
use axum::http::{HeaderName, HeaderValue};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::time::Instant;

use crate::client_ip::identify;
use crate::error::AppError;
use crate::rate_limit::{RateLimitPolicy, scoped_key, secs_until};
use crate::state::AppState;

pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

const LIMIT_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-limit");
const REMAINING_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
const RESET_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-reset");

// Middleware state: which scope's policy guards the wrapped routes
#[derive(Clone)]
pub struct ScopeGuard {
    pub state: AppState,
    pub scope: &'static str,
}

// Admits the caller against the guard's scope, 429 once the window is used up
pub async fn rate_limit(State(guard): State<ScopeGuard>, req: Request, next: Next) -> Response {
    let Some(policy) = guard.state.policy(guard.scope) else {
        return AppError::UnknownScope(guard.scope.to_string()).into_response();
    };

    let client = identify(req.headers());
    let decision = guard
        .state
        .limiter
        .admit(&scoped_key(guard.scope, &client), policy);

    let response = if decision.success {
        next.run(req).await
    } else {
        tracing::warn!(scope = guard.scope, %client, "request throttled");
        AppError::RateLimited {
            retry_after: decision.retry_after.unwrap_or(1),
        }
        .into_response()
    };

    with_limit_headers(response, policy, decision.remaining, decision.reset_at)
}

// Admin routes stay closed unless a token is configured and presented
pub async fn require_admin(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let Some(expected) = state.config.admin_token.as_deref() else {
        return Err(AppError::Forbidden);
    };

    let presented = req
        .headers()
        .get(ADMIN_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok());

    if presented != Some(expected) {
        tracing::warn!(client = %identify(req.headers()), "rejected admin request");
        return Err(AppError::Forbidden);
    }
    Ok(next.run(req).await)
}

pub fn with_limit_headers(
    mut response: Response,
    policy: RateLimitPolicy,
    remaining: u32,
    reset_at: Instant,
) -> Response {
    let reset_in = secs_until(reset_at, Instant::now());
    let reset_epoch = chrono::Utc::now().timestamp() + reset_in as i64;

    let headers = response.headers_mut();
    headers.insert(LIMIT_HEADER, HeaderValue::from(policy.limit()));
    headers.insert(REMAINING_HEADER, HeaderValue::from(remaining));
    headers.insert(RESET_HEADER, HeaderValue::from(reset_epoch));
    response
}

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;

use crate::error::AppError;
use crate::rate_limit::{LimiterStats, scoped_key};
use crate::state::AppState;

pub async fn stats_handler(State(state): State<AppState>) -> Json<LimiterStats> {
    Json(state.limiter.stats())
}

// Clears one client's record for a scope, e.g. after a support request
pub async fn reset_handler(
    State(state): State<AppState>,
    Path((scope, client)): Path<(String, String)>,
) -> Result<StatusCode, AppError> {
    if state.policy(&scope).is_none() {
        return Err(AppError::UnknownScope(scope));
    }

    let existed = state.limiter.reset(&scoped_key(&scope, &client));
    tracing::info!(%scope, %client, existed, "rate limit reset by admin");
    Ok(StatusCode::NO_CONTENT)
}

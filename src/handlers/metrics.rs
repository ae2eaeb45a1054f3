use axum::extract::State;
use prometheus::{Encoder, TextEncoder};

use crate::error::AppError;
use crate::metrics::TRACKED_KEYS;
use crate::state::AppState;

pub async fn metrics_handler(State(state): State<AppState>) -> Result<String, AppError> {
    TRACKED_KEYS.set(state.limiter.stats().tracked_keys as f64);

    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| AppError::Internal(format!("metrics encoding failed: {e}")))?;
    String::from_utf8(buffer).map_err(|e| AppError::Internal(e.to_string()))
}

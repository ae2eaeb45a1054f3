use std::sync::Arc;
use crate::config::Config;
use crate::rate_limit::{RateLimitPolicy, RateLimiter};

// app's shared state
#[derive(Clone)]
pub struct AppState {
    pub limiter: RateLimiter,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            limiter: RateLimiter::new(),
            config: Arc::new(config),
        }
    }

    pub fn policy(&self, scope: &str) -> Option<RateLimitPolicy> {
        self.config.policy(scope)
    }
}

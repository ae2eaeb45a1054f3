use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::error::PolicyError;
use crate::metrics::{RATE_LIMIT_ADMITTED, RATE_LIMIT_EVICTED, RATE_LIMIT_REJECTED};

pub const DEFAULT_LIMIT: u32 = 5;
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);
// keeps every `Instant + window` well inside the clock's range
pub const MAX_WINDOW: Duration = Duration::from_secs(30 * 24 * 60 * 60);

// Rate limit entry - tracks requests per key
#[derive(Debug, Clone, Copy)]
pub struct RateLimitRecord {
    pub count: u32,
    pub first_request: Instant,
    pub last_request: Instant,
}

impl RateLimitRecord {
    fn open(now: Instant) -> Self {
        Self {
            count: 1,
            first_request: now,
            last_request: now,
        }
    }

    fn window_elapsed(&self, window: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.first_request) > window
    }
}

// how many requests a key may make per window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    limit: u32,
    window: Duration,
}

impl RateLimitPolicy {
    pub fn new(limit: u32, window: Duration) -> Result<Self, PolicyError> {
        if limit == 0 {
            return Err(PolicyError::ZeroLimit);
        }
        if window.is_zero() {
            return Err(PolicyError::ZeroWindow);
        }
        if window > MAX_WINDOW {
            return Err(PolicyError::WindowTooLong {
                max_secs: MAX_WINDOW.as_secs(),
            });
        }
        Ok(Self { limit, window })
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            window: DEFAULT_WINDOW,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub success: bool,
    pub remaining: u32,
    pub reset_at: Instant,
    // whole seconds until reset, only set on rejection
    pub retry_after: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status {
    pub remaining: u32,
    pub reset_at: Instant,
    pub retry_after: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LimiterStats {
    pub tracked_keys: usize,
    pub admitted_total: u64,
    pub rejected_total: u64,
    pub evicted_total: u64,
}

#[derive(Debug, Default)]
struct Counters {
    admitted: AtomicU64,
    rejected: AtomicU64,
    evicted: AtomicU64,
}

// In-memory counter table, clones share the same records
#[derive(Debug, Clone, Default)]
pub struct RateLimiter {
    records: Arc<DashMap<String, RateLimitRecord>>,
    counters: Arc<Counters>,
}

// One table holds every scope, so keys are namespaced per scope
pub fn scoped_key(scope: &str, client: &str) -> String {
    format!("{scope}:{client}")
}

// whole seconds from now until reset_at, rounded up
pub fn secs_until(reset_at: Instant, now: Instant) -> u64 {
    let left = reset_at.saturating_duration_since(now);
    left.as_secs() + u64::from(left.subsec_nanos() > 0)
}

fn retry_after_secs(reset_at: Instant, now: Instant) -> u64 {
    secs_until(reset_at, now).max(1)
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn admit(&self, key: &str, policy: RateLimitPolicy) -> Decision {
        self.admit_at(key, policy, Instant::now())
    }

    pub fn admit_at(&self, key: &str, policy: RateLimitPolicy, now: Instant) -> Decision {
        let decision = match self.records.entry(key.to_string()) {
            Entry::Vacant(slot) => {
                slot.insert(RateLimitRecord::open(now));
                fresh_window(policy, now)
            }
            Entry::Occupied(mut slot) => {
                let record = slot.get_mut();

                if record.window_elapsed(policy.window, now) {
                    // replace, never merge, an expired window
                    *record = RateLimitRecord::open(now);
                    fresh_window(policy, now)
                } else if record.count >= policy.limit {
                    let reset_at = record.first_request + policy.window;
                    Decision {
                        success: false,
                        remaining: 0,
                        reset_at,
                        retry_after: Some(retry_after_secs(reset_at, now)),
                    }
                } else {
                    record.count += 1;
                    record.last_request = now;
                    Decision {
                        success: true,
                        remaining: policy.limit.saturating_sub(record.count),
                        reset_at: record.first_request + policy.window,
                        retry_after: None,
                    }
                }
            }
        };

        if decision.success {
            self.counters.admitted.fetch_add(1, Ordering::Relaxed);
            RATE_LIMIT_ADMITTED.inc();
        } else {
            self.counters.rejected.fetch_add(1, Ordering::Relaxed);
            RATE_LIMIT_REJECTED.inc();
            tracing::debug!(key, retry_after = ?decision.retry_after, "rate limit exceeded");
        }
        decision
    }

    pub fn peek(&self, key: &str, policy: RateLimitPolicy) -> Status {
        self.peek_at(key, policy, Instant::now())
    }

    // same window logic as admit_at, never creates or counts
    pub fn peek_at(&self, key: &str, policy: RateLimitPolicy, now: Instant) -> Status {
        let live = self
            .records
            .get(key)
            .map(|record| *record)
            .filter(|record| !record.window_elapsed(policy.window, now));

        match live {
            None => Status {
                remaining: policy.limit,
                reset_at: now + policy.window,
                retry_after: None,
            },
            Some(record) => {
                let reset_at = record.first_request + policy.window;
                let remaining = policy.limit.saturating_sub(record.count);
                Status {
                    remaining,
                    reset_at,
                    retry_after: (remaining == 0).then(|| retry_after_secs(reset_at, now)),
                }
            }
        }
    }

    // returns whether a record existed
    pub fn reset(&self, key: &str) -> bool {
        self.records.remove(key).is_some()
    }

    pub fn sweep(&self, retention: Duration) -> usize {
        self.sweep_at(retention, Instant::now())
    }

    // drops every record untouched for longer than retention
    pub fn sweep_at(&self, retention: Duration, now: Instant) -> usize {
        let mut evicted = 0;
        self.records.retain(|_, record| {
            let keep = now.saturating_duration_since(record.last_request) <= retention;
            if !keep {
                evicted += 1;
            }
            keep
        });

        if evicted > 0 {
            self.counters
                .evicted
                .fetch_add(evicted as u64, Ordering::Relaxed);
            RATE_LIMIT_EVICTED.inc_by(evicted as f64);
        }
        evicted
    }

    #[cfg(test)]
    pub fn record(&self, key: &str) -> Option<RateLimitRecord> {
        self.records.get(key).map(|record| *record)
    }

    pub fn stats(&self) -> LimiterStats {
        LimiterStats {
            tracked_keys: self.records.len(),
            admitted_total: self.counters.admitted.load(Ordering::Relaxed),
            rejected_total: self.counters.rejected.load(Ordering::Relaxed),
            evicted_total: self.counters.evicted.load(Ordering::Relaxed),
        }
    }
}

fn fresh_window(policy: RateLimitPolicy, now: Instant) -> Decision {
    Decision {
        success: true,
        remaining: policy.limit - 1,
        reset_at: now + policy.window,
        retry_after: None,
    }
}

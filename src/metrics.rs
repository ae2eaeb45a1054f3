use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Gauge, register_counter, register_counter_vec, register_gauge,
};

lazy_static! {
    pub static ref REQUEST_TOTAL: CounterVec = register_counter_vec!(
        "formguard_requests_total",
        "Total number of throttle requests per scope",
        &["scope"]
    )
    .unwrap();
    pub static ref RATE_LIMIT_ADMITTED: Counter =
        register_counter!("formguard_admitted_total", "Requests admitted by the limiter").unwrap();
    pub static ref RATE_LIMIT_REJECTED: Counter =
        register_counter!("formguard_rejected_total", "Requests rejected by the limiter").unwrap();
    pub static ref RATE_LIMIT_EVICTED: Counter =
        register_counter!("formguard_evicted_total", "Records evicted by the janitor").unwrap();
    pub static ref TRACKED_KEYS: Gauge =
        register_gauge!("formguard_tracked_keys", "Current number of keys in the limiter").unwrap();
}

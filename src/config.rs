use clap::Parser;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::PolicyError;
use crate::rate_limit::RateLimitPolicy;

pub const ADMIN_SCOPE: &str = "admin";

// Built-in scopes: (name, limit, window seconds)
const DEFAULT_POLICIES: [(&str, u32, u64); 4] = [
    ("login", 5, 60),
    ("signup", 3, 600),
    ("password-reset", 3, 900),
    (ADMIN_SCOPE, 30, 60),
];

// CLI argument structure
#[derive(Parser, Debug, Clone)]
#[command(name = "formguard")]
#[command(about = "Fixed-window throttling for login, signup and password reset forms")]
pub struct Args {
    // Port to run the server on
    #[arg(short, long, default_value_t = 8080)]
    pub port: u16,

    // Extra or overriding policy, e.g. "login=10/60" (repeatable)
    #[arg(long = "policy", value_parser = parse_policy)]
    pub policies: Vec<(String, RateLimitPolicy)>,

    // Janitor sweep interval in seconds
    #[arg(long, default_value_t = 60)]
    pub sweep_interval: u64,

    // How long an untouched record is kept, in seconds
    #[arg(long, default_value_t = 3600)]
    pub retention: u64,

    // Token required by the admin endpoints; admin is disabled without it
    #[arg(long)]
    pub admin_token: Option<String>,
}

// Validated runtime configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub policies: BTreeMap<String, RateLimitPolicy>,
    pub sweep_interval: Duration,
    pub retention: Duration,
    pub admin_token: Option<String>,
}

impl Config {
    pub fn from_args(args: Args) -> Result<Self, PolicyError> {
        let mut policies = default_policies();
        policies.extend(args.policies);

        let longest = policies
            .values()
            .map(|p| p.window())
            .max()
            .unwrap_or_default();
        let retention = Duration::from_secs(args.retention);
        if retention < longest {
            return Err(PolicyError::RetentionTooShort {
                retention: args.retention,
                window: longest.as_secs(),
            });
        }

        if args.sweep_interval == 0 {
            return Err(PolicyError::ZeroSweepInterval);
        }

        Ok(Self {
            port: args.port,
            policies,
            sweep_interval: Duration::from_secs(args.sweep_interval),
            retention,
            admin_token: args.admin_token.filter(|t| !t.is_empty()),
        })
    }

    pub fn policy(&self, scope: &str) -> Option<RateLimitPolicy> {
        self.policies.get(scope).copied()
    }
}

pub fn default_policies() -> BTreeMap<String, RateLimitPolicy> {
    DEFAULT_POLICIES
        .iter()
        .filter_map(|(name, limit, secs)| {
            RateLimitPolicy::new(*limit, Duration::from_secs(*secs))
                .ok()
                .map(|p| (name.to_string(), p))
        })
        .collect()
}

// Parses "scope=limit/seconds"
pub fn parse_policy(raw: &str) -> Result<(String, RateLimitPolicy), PolicyError> {
    let malformed = || PolicyError::Malformed(raw.to_string());

    let (scope, rule) = raw.split_once('=').ok_or_else(malformed)?;
    let (limit, secs) = rule.split_once('/').ok_or_else(malformed)?;

    let scope = scope.trim();
    if scope.is_empty() || scope.contains(':') {
        return Err(malformed());
    }
    let limit: u32 = limit.trim().parse().map_err(|_| malformed())?;
    let secs: u64 = secs.trim().parse().map_err(|_| malformed())?;

    let policy = RateLimitPolicy::new(limit, Duration::from_secs(secs))?;
    Ok((scope.to_string(), policy))
}

mod client_ip;
mod config;
mod error;
mod handlers;
mod janitor;
mod metrics;
mod middleware;
mod rate_limit;
mod state;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{Args, Config};
use crate::error::StartupError;
use crate::janitor::Janitor;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<(), StartupError> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "formguard=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // parse cli arguments
    let config = Config::from_args(Args::parse())?;
    let port = config.port;

    for (scope, policy) in &config.policies {
        tracing::info!(
            %scope,
            limit = policy.limit(),
            window_secs = policy.window().as_secs(),
            "rate limit policy"
        );
    }
    if config.admin_token.is_none() {
        tracing::warn!("no admin token configured, admin endpoints are disabled");
    }

    let state = AppState::new(config);

    // the janitor lives exactly as long as the server
    let janitor = Janitor::spawn(
        state.limiter.clone(),
        state.config.sweep_interval,
        state.config.retention,
    );

    let app = handlers::router(state);

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|source| StartupError::Bind {
            addr: addr.clone(),
            source,
        })?;

    tracing::info!("formguard listening on http://{}", addr);

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(StartupError::Serve);

    janitor.shutdown().await;
    tracing::info!("formguard stopped");
    served
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}

use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use slide_limit::ConnectionPool;
use slide_limit::CounterStore;
use slide_limit::MemoryStore;
use slide_limit::RedisStore;
use slide_limit::SlidingWindow;
use tokio::net::TcpListener;
use tracing::error;
use tracing::info;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use crate::config::Args;
use crate::error::EdgeError;
use crate::state::AppState;

mod app;
mod config;
mod error;
mod handlers;
mod state;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = Args::parse();
    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "fact-edge failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<(), EdgeError> {
    info!("Setting up start-ups");
    let item = args.rate_limit_item()?;

    let (store, pool): (Arc<dyn CounterStore>, Option<Arc<ConnectionPool>>) = if args.memory_store
    {
        warn!("using in-process counters; limits are not shared between instances");
        (Arc::new(MemoryStore::new()), None)
    } else {
        let redis = RedisStore::open(&args.redis_url, args.pool_config())?;
        let pool = Arc::clone(redis.pool());
        match pool.ping().await {
            Ok(()) => info!("Redis connection established"),
            Err(err) => warn!(error = %err, policy = ?args.failure_policy(), "Redis unreachable at startup"),
        }
        (Arc::new(redis), Some(pool))
    };

    let limiter = Arc::new(SlidingWindow::new(store));
    let state = AppState::from_args(&args)?;
    let app = app::router(state, limiter, item, args.failure_policy());

    let listener = TcpListener::bind(args.listen).await?;
    info!(addr = %args.listen, limit = %item, "listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Shutting down");
    if let Some(pool) = pool {
        pool.close();
        info!("Redis connection pool closed");
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "unable to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

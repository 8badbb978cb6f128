//! tally-server entry point.
//!
//! Intentionally thin: parse configuration, set up tracing, connect and
//! migrate the database, start the accrual-sync job, serve the API.  One
//! cancellation token derived from SIGINT drives both the server's graceful
//! shutdown and the sync loop.

use std::{sync::Arc, time::Duration};

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{info, warn, Level};

use tally_accrual::Client;
use tally_core::Service;
use tally_server::{
    auth::AuthService,
    config::{Config, DEV_SECRET_KEY},
    routes, state,
};
use tally_sync::SyncJob;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Silent if the file does not exist; production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    let config = Config::parse();
    init_tracing(&config.log_level);
    if config.secret_key == DEV_SECRET_KEY {
        warn!("SECRET_KEY is the development placeholder; set a real one");
    }

    let pool = tally_db::connect(&config.database_uri, config.database_max_connections)
        .await
        .context("failed to connect to Postgres")?;
    tally_db::migrate(&pool).await.context("db migrate failed")?;

    let state = Arc::new(state::AppState::new(
        Service::new(pool.clone()),
        AuthService::new(&config.secret_key),
    ));

    let cancel = CancellationToken::new();
    spawn_signal_handler(cancel.clone());

    let sync_job = SyncJob::new(
        pool,
        Client::new(&config.accrual_address),
        Duration::from_secs(config.sync_frequency),
        config.rate_limit,
    );
    let sync_task = tokio::spawn(sync_job.run(cancel.clone()));

    let app = routes::build_router(Arc::clone(&state)).layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    info!("tally-server listening on http://{}", config.run_address);
    let listener = tokio::net::TcpListener::bind(config.run_address)
        .await
        .context("failed to bind listen address")?;

    let shutdown = cancel.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("server crashed")?;

    // The server may have stopped on its own; make sure the sync loop follows.
    cancel.cancel();
    sync_task.await.context("sync job panicked")?;
    info!("shutdown complete");

    Ok(())
}

fn init_tracing(level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .init();
}

fn spawn_signal_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
        }
        cancel.cancel();
    });
}

use std::net::SocketAddr;

use clap::Parser;

/// Placeholder secret for local development; `main` warns when it is used.
pub const DEV_SECRET_KEY: &str = "dev-secret-change-me";

/// Runtime configuration.  Every flag has an environment fallback so the
/// service runs unchanged under docker-compose or a plain shell.
#[derive(Debug, Parser)]
#[command(name = "tally-server", about = "Loyalty-points accrual server")]
pub struct Config {
    /// Address and port to serve the API on.
    #[arg(short = 'a', long, env = "RUN_ADDRESS", default_value = "0.0.0.0:8080")]
    pub run_address: SocketAddr,

    /// Postgres DSN.
    #[arg(short = 'd', long, env = "DATABASE_URI")]
    pub database_uri: String,

    /// Base address of the external accrual service.
    #[arg(
        short = 'r',
        long,
        env = "ACCRUAL_SYSTEM_ADDRESS",
        default_value = "accrual-api:8082"
    )]
    pub accrual_address: String,

    /// Secret for signing auth tokens.
    #[arg(short = 's', long, env = "SECRET_KEY", default_value = DEV_SECRET_KEY)]
    pub secret_key: String,

    /// Log filter (tracing EnvFilter syntax).
    #[arg(long, env = "LOG_LEVEL", default_value = "debug")]
    pub log_level: String,

    /// Seconds between accrual sync rounds.
    #[arg(long, env = "SYNC_FREQUENCY", default_value_t = 15)]
    pub sync_frequency: u64,

    /// Concurrent accrual workers per round.
    #[arg(long, env = "RATE_LIMIT", default_value_t = 5)]
    pub rate_limit: usize,

    /// Connection pool size; must cover the sync workers plus the expected
    /// number of concurrently active handlers.
    #[arg(long, env = "DATABASE_MAX_CONNECTIONS", default_value_t = 16)]
    pub database_max_connections: u32,
}

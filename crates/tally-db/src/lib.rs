//! Postgres persistence for the loyalty-points service.
//!
//! The store is stateless: it owns the connection pool and the schema, but
//! every row operation in [`store`] takes a `&mut PgConnection` so the caller
//! decides the transaction boundary.  Begin a transaction with
//! [`sqlx::PgPool::begin`], pass it to as many operations as the unit of work
//! needs, then commit or roll back explicitly.

use sqlx::{postgres::PgPoolOptions, PgPool};

mod error;
mod models;
pub mod store;

pub use error::StoreError;
pub use models::{Order, OrderStatus, User, Withdrawal};

pub const ENV_DATABASE_URI: &str = "DATABASE_URI";

/// Connect to Postgres.
///
/// `max_connections` must cover the sync-job worker pool plus the expected
/// number of concurrently active API handlers, since each holds a connection
/// for the lifetime of its transaction.
pub async fn connect(dsn: &str, max_connections: u32) -> Result<PgPool, StoreError> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(dsn)
        .await?;
    Ok(pool)
}

/// Run embedded migrations.
pub async fn migrate(pool: &PgPool) -> Result<(), StoreError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Connectivity check backing the /ping endpoint.
pub async fn ping(pool: &PgPool) -> Result<(), StoreError> {
    sqlx::query("select 1").execute(pool).await?;
    Ok(())
}

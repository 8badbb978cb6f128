use thiserror::Error;

/// Storage-level failures surfaced to the business and sync layers.
///
/// `NotFound` and `AlreadyExists` are the two outcomes callers branch on;
/// everything else is an internal fault carried with its source.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("row not found")]
    NotFound,
    #[error("row already exists")]
    AlreadyExists,
    #[error("unknown order status `{0}`")]
    UnknownStatus(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

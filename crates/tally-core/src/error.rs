use thiserror::Error;

use tally_db::StoreError;

/// Domain outcomes the HTTP layer maps to response statuses.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("not found")]
    NotFound,
    #[error("login is already taken")]
    LoginTaken,
    #[error("order already uploaded by this user")]
    OrderAlreadyUploaded,
    #[error("order already uploaded by another user")]
    OrderOwnedByAnotherUser,
    #[error("insufficient balance")]
    InsufficientFunds,
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            // Plain reads propagate their miss; creates that can collide are
            // classified at the call site, never through this blanket path.
            StoreError::NotFound => ServiceError::NotFound,
            other => ServiceError::Store(other),
        }
    }
}

impl From<sqlx::Error> for ServiceError {
    fn from(err: sqlx::Error) -> Self {
        ServiceError::Store(StoreError::Database(err))
    }
}

//! Domain operations over the store.
//!
//! Every public operation on [`Service`] opens one transaction, composes the
//! store calls it needs, and commits on success.  Error paths roll back,
//! either explicitly for domain refusals or implicitly when the transaction
//! handle is dropped.

mod error;
mod service;

pub use error::ServiceError;
pub use service::Service;

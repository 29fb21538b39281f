//! Error types and result types for datastore operations.
//!
//! Every fallible operation in docbind returns [`DocumentStoreResult<T>`].
//! Note that "not found" is never an error: single-document fetches resolve to
//! `None` and multi-document fetches resolve to an empty `Vec`.

use bson::error::Error as BsonError;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

/// Represents all possible errors that can occur when interacting with a datastore
/// or the connection registry.
#[derive(Error, Debug)]
pub enum DocumentStoreError {
    /// Serialization/deserialization error when converting between document formats (BSON, JSON).
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// Error during connection establishment, including unreadable TLS material
    /// and malformed initialization configuration.
    #[error("Initialization error: {0}")]
    Initialization(String),
    /// The document violates schema constraints or has invalid structure.
    #[error("Invalid document: {0}")]
    InvalidDocument(String),
    /// A filter document could not be turned into a condition.
    #[error("Invalid query: {0}")]
    InvalidQuery(String),
    /// An operation was attempted on a datastore that has no model bound yet.
    #[error("Datastore {0} is not bound to a connection")]
    Unbound(String),
    /// A model referenced by name (discriminator base, populate target) is not
    /// bound on the connection.
    #[error("Model not found: {0}")]
    ModelNotFound(String),
    /// A middleware hook aborted the operation.
    #[error("Middleware error: {0}")]
    Middleware(String),
    /// The registry was dropped while a lookup for the named datastore was parked.
    #[error("Registry closed while waiting for datastore {0}")]
    RegistryClosed(String),
    /// An error occurred in the underlying store.
    #[error("Backend error: {0}")]
    Backend(String),
}

/// A specialized `Result` type for datastore operations.
pub type DocumentStoreResult<T> = Result<T, DocumentStoreError>;

impl From<BsonError> for DocumentStoreError {
    fn from(err: BsonError) -> Self {
        DocumentStoreError::Serialization(err.to_string())
    }
}

impl From<SerdeJsonError> for DocumentStoreError {
    fn from(err: SerdeJsonError) -> Self {
        DocumentStoreError::Serialization(err.to_string())
    }
}

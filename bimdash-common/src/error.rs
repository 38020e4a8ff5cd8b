//! Common error types for bimdash

use thiserror::Error;

/// Common result type for bimdash operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy shared by the store, the dataset accessors and the service
#[derive(Error, Debug)]
pub enum Error {
    /// Store read or write rejected (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored document could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Value already present (lookup list duplicates)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Uploaded CSV was empty or yielded no rows
    #[error("Malformed upload: {0}")]
    MalformedUpload(String),

    /// Stored data does not have the shape the operation requires
    #[error("Data inconsistency: {0}")]
    DataShape(String),

    /// Composite id now points at a different record than the caller saw
    #[error("Record {id} no longer holds record key {expected}")]
    StaleRecordId { id: String, expected: String },

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

//! Storage error types for the CORS storage backends.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Store operations, used to identify which step failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StoreOperation {
    RetrieveOrigins,
    AddOrigins,
    DeleteOriginAssociations,
    RetrieveOriginApplications,
    ResolveTenant,
    ResolveApplication,
}

impl fmt::Display for StoreOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            StoreOperation::RetrieveOrigins => "retrieve CORS origins",
            StoreOperation::AddOrigins => "add CORS origins",
            StoreOperation::DeleteOriginAssociations => "delete CORS origin associations",
            StoreOperation::RetrieveOriginApplications => "retrieve CORS origin applications",
            StoreOperation::ResolveTenant => "resolve tenant",
            StoreOperation::ResolveApplication => "resolve application",
        };
        f.write_str(text)
    }
}

/// Storage operation errors.
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StorageError {
    /// A statement failed; the enclosing transaction has been rolled back
    #[error("Failed to {operation} for {key}: {message}")]
    OperationFailed {
        operation: StoreOperation,
        key: String,
        message: String,
    },
    /// Entity not found
    #[error("Entity not found: {entity_type} with id {entity_id}")]
    NotFound {
        entity_type: String,
        entity_id: String,
    },
    /// Database connection error
    #[error("Connection error: {0}")]
    ConnectionError(String),
    /// General storage error
    #[error("Storage error: {0}")]
    Other(String),
}

impl StorageError {
    pub(crate) fn operation(
        operation: StoreOperation,
        key: impl fmt::Display,
        source: impl fmt::Display,
    ) -> Self {
        StorageError::OperationFailed {
            operation,
            key: key.to_string(),
            message: source.to_string(),
        }
    }
}

//! Error type shared by every document store backend.

use mongodb::error::{ErrorKind, WriteFailure};
use thiserror::Error;

/// Server code reported when a collection is created twice.
pub const NAMESPACE_EXISTS: i32 = 48;
/// Server code reported when a document is rejected by a collection validator.
pub const DOCUMENT_VALIDATION_FAILURE: i32 = 121;
/// Server code reported on unique index violations.
pub const DUPLICATE_KEY: i32 = 11000;

pub type StoreResult<T> = Result<T, StoreError>;

/// Failures surfaced by a [`crate::DocumentStore`].
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("collection `{0}` already exists")]
    NamespaceExists(String),

    #[error("document failed validation in `{collection}`")]
    ValidationFailed { collection: String },

    #[error("duplicate key: {0}")]
    DuplicateKey(String),

    #[error("invalid document: {0}")]
    InvalidDocument(String),

    #[error("unsupported by this store: {0}")]
    Unsupported(String),

    #[error("store lock poisoned")]
    Poisoned,

    #[error(transparent)]
    Driver(mongodb::error::Error),
}

impl StoreError {
    /// Classify a driver error by its server code, keeping the original error when
    /// the code has no dedicated variant.
    pub fn from_driver(collection: &str, err: mongodb::error::Error) -> Self {
        match server_code(&err) {
            Some(NAMESPACE_EXISTS) => Self::NamespaceExists(collection.to_string()),
            Some(DOCUMENT_VALIDATION_FAILURE) => Self::ValidationFailed {
                collection: collection.to_string(),
            },
            Some(DUPLICATE_KEY) => Self::DuplicateKey(err.to_string()),
            _ => Self::Driver(err),
        }
    }
}

fn server_code(err: &mongodb::error::Error) -> Option<i32> {
    match err.kind.as_ref() {
        ErrorKind::Command(command) => Some(command.code),
        ErrorKind::Write(WriteFailure::WriteError(write)) => Some(write.code),
        ErrorKind::InsertMany(insert) => insert
            .write_errors
            .as_ref()
            .and_then(|errors| errors.first())
            .map(|first| first.code),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespace_exists_message_names_collection() {
        let err = StoreError::NamespaceExists("books".to_string());
        assert_eq!(err.to_string(), "collection `books` already exists");
    }

    #[test]
    fn validation_failure_message_names_collection() {
        let err = StoreError::ValidationFailed {
            collection: "books".to_string(),
        };
        assert!(err.to_string().contains("books"));
    }
}

//! Error types for the marketplace core

use thiserror::Error;

use crate::types::{AccountId, OrderId, ProductId};

/// Result type for marketplace operations
pub type Result<T> = std::result::Result<T, Error>;

/// Marketplace errors
///
/// Client-side failures (Validation, Precondition, *NotFound) are reported
/// before any mutation is staged. Infrastructure failures (Storage,
/// Serialization, Io) abort the whole unit of work, so retrying the
/// operation is always safe.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed input (blank fields, non-positive amounts, etc.)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Well-formed request against the wrong state or role
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// Account not found
    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),

    /// Product not found
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    /// Order not found
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// Invariant violation (balance conservation, transition table, etc.)
    #[error("Consistency violation: {0}")]
    Consistency(String),

    /// Storage error (RocksDB)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Caller mistake; retrying the same request will fail again
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::Validation(_)
                | Error::Precondition(_)
                | Error::AccountNotFound(_)
                | Error::ProductNotFound(_)
                | Error::OrderNotFound(_)
        )
    }

    /// Transient infrastructure failure; the unit never committed, so a
    /// whole-operation retry is safe
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Error::Storage(_) | Error::Serialization(_) | Error::Io(_)
        )
    }
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let precondition = Error::Precondition("insufficient balance".to_string());
        assert!(precondition.is_client_error());
        assert!(!precondition.is_retriable());

        let missing = Error::OrderNotFound(OrderId::generate());
        assert!(missing.is_client_error());

        let storage = Error::Storage("write stalled".to_string());
        assert!(storage.is_retriable());
        assert!(!storage.is_client_error());

        let consistency = Error::Consistency("conservation broken".to_string());
        assert!(!consistency.is_client_error());
        assert!(!consistency.is_retriable());
    }
}

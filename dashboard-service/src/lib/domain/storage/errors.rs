use std::error::Error as StdError;

use thiserror::Error;

/// Error raised by a storage backend.
///
/// Driver errors keep their source; nothing here is retried.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[source] Box<dyn StdError + Send + Sync>),

    #[error("Failed to encode or decode stored value: {0}")]
    Encoding(String),

    #[error("Corrupt {table} record: {reason}")]
    Corrupt { table: &'static str, reason: String },

    #[error("{table} record {id} belongs to another owner")]
    OwnerMismatch { table: &'static str, id: String },
}

impl StorageError {
    pub fn database(err: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        StorageError::Database(err.into())
    }

    pub fn owner_mismatch(table: &'static str, id: impl Into<String>) -> Self {
        StorageError::OwnerMismatch {
            table,
            id: id.into(),
        }
    }

    pub fn corrupt(table: &'static str, reason: impl ToString) -> Self {
        StorageError::Corrupt {
            table,
            reason: reason.to_string(),
        }
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Encoding(err.to_string())
    }
}

use thiserror::Error;

use crate::storage::errors::StorageError;

/// Error for managed-client operations
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Client not found: {0}")]
    NotFound(String),

    #[error("No free client id after {0} attempts")]
    IdUnavailable(usize),

    #[error("Invalid token usage: {0}")]
    InvalidUsage(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

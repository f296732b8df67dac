use thiserror::Error;

use crate::storage::errors::StorageError;

/// Error for account setup, integration and campaign operations
#[derive(Debug, Error)]
pub enum AccountError {
    #[error("Integration not found: {category}/{provider}")]
    IntegrationNotFound { category: String, provider: String },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

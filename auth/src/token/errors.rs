use thiserror::Error;

/// Error type for token operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    /// No signing secret was configured. Fatal at start-up.
    #[error("Token signing secret is missing")]
    MissingSecret,

    #[error("Malformed token")]
    MalformedToken,

    #[error("Unsupported token algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Invalid token signature")]
    InvalidSignature,

    #[error("Token has expired")]
    TokenExpired,

    #[error("Failed to encode token: {0}")]
    EncodingFailed(String),
}

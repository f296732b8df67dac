use auth::PasswordError;
use auth::TokenError;
use thiserror::Error;

use crate::storage::errors::StorageError;
use crate::user::errors::EmailError;

/// Top-level error for sign-up, login and request authentication.
///
/// Every variant maps to a stable machine-checkable kind, see `kind()`.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Email already registered: {0}")]
    EmailAlreadyRegistered(String),

    #[error("Invalid email: {0}")]
    InvalidEmail(#[from] EmailError),

    #[error("Missing bearer token")]
    MissingToken,

    #[error("Malformed token")]
    MalformedToken,

    #[error("Unsupported token algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Invalid token signature")]
    InvalidSignature,

    #[error("Token expired")]
    TokenExpired,

    #[error("User not found: {0}")]
    UserNotFound(String),

    // Infrastructure errors
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Stable snake_case identifier of the rejection.
    pub fn kind(&self) -> &'static str {
        match self {
            AuthError::InvalidCredentials => "invalid_credentials",
            AuthError::EmailAlreadyRegistered(_) => "email_already_registered",
            AuthError::InvalidEmail(_) => "invalid_email",
            AuthError::MissingToken => "missing_token",
            AuthError::MalformedToken => "malformed_token",
            AuthError::UnsupportedAlgorithm(_) => "unsupported_algorithm",
            AuthError::InvalidSignature => "invalid_signature",
            AuthError::TokenExpired => "token_expired",
            AuthError::UserNotFound(_) => "user_not_found",
            AuthError::Storage(_) => "storage",
            AuthError::Internal(_) => "internal",
        }
    }
}

impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::MalformedToken => AuthError::MalformedToken,
            TokenError::UnsupportedAlgorithm(alg) => AuthError::UnsupportedAlgorithm(alg),
            TokenError::InvalidSignature => AuthError::InvalidSignature,
            TokenError::TokenExpired => AuthError::TokenExpired,
            TokenError::MissingSecret | TokenError::EncodingFailed(_) => {
                AuthError::Internal(err.to_string())
            }
        }
    }
}

impl From<PasswordError> for AuthError {
    fn from(err: PasswordError) -> Self {
        AuthError::Internal(err.to_string())
    }
}

use async_trait::async_trait;

use crate::domain::auth::errors::AuthError;
use crate::domain::auth::models::AuthSession;
use crate::domain::user::models::PublicUser;

/// Port for credential and token operations.
#[async_trait]
pub trait AuthServicePort: Send + Sync + 'static {
    /// Register a new user and issue a token.
    ///
    /// # Arguments
    /// * `email` - Raw email; trimmed and lowercased
    /// * `password` - Plaintext password
    /// * `name` - Optional display name
    ///
    /// # Returns
    /// Public user record and a fresh token
    ///
    /// # Errors
    /// * `InvalidEmail` - Email is not well formed
    /// * `EmailAlreadyRegistered` - A user with this email exists
    /// * `Storage` - Storage operation failed
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        name: Option<&str>,
    ) -> Result<AuthSession, AuthError>;

    /// Check an email and password pair and issue a token.
    ///
    /// # Returns
    /// Public user record and a fresh token
    ///
    /// # Errors
    /// * `InvalidCredentials` - Unknown email or wrong password
    /// * `Storage` - Storage operation failed
    async fn validate_credentials(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthSession, AuthError>;

    /// Resolve the user behind an `Authorization` header.
    ///
    /// # Arguments
    /// * `authorization` - Raw header value, if the request carried one
    ///
    /// # Returns
    /// Public record of the token's subject
    ///
    /// # Errors
    /// * `MissingToken` - No header, another scheme, or an empty token
    /// * `MalformedToken` - Token is not three decodable segments
    /// * `UnsupportedAlgorithm` - Token header names another algorithm
    /// * `InvalidSignature` - Signature does not match
    /// * `TokenExpired` - Token validity window has passed
    /// * `UserNotFound` - Subject no longer exists
    /// * `Storage` - Storage operation failed
    async fn authenticate_request(
        &self,
        authorization: Option<&str>,
    ) -> Result<PublicUser, AuthError>;
}

use std::sync::Arc;

use async_trait::async_trait;
use auth::PasswordHasher;
use auth::TokenCodec;

use crate::domain::auth::errors::AuthError;
use crate::domain::auth::models::bearer_token;
use crate::domain::auth::models::AuthSession;
use crate::domain::auth::ports::AuthServicePort;
use crate::domain::storage::ports::StorageAdapter;
use crate::domain::user::models::EmailAddress;
use crate::domain::user::models::NewUser;
use crate::domain::user::models::PublicUser;
use crate::domain::user::models::User;
use crate::domain::user::models::UserId;

/// Domain service implementation for credential operations.
///
/// Concrete implementation of AuthServicePort with dependency injection.
pub struct AuthService {
    storage: Arc<dyn StorageAdapter>,
    password_hasher: Arc<PasswordHasher>,
    token_codec: Arc<TokenCodec>,
    token_ttl_seconds: i64,
}

impl AuthService {
    /// Create a new auth service with injected dependencies.
    ///
    /// # Arguments
    /// * `storage` - Storage backend selected at start-up
    /// * `password_hasher` - Password hashing implementation
    /// * `token_codec` - Token signing implementation
    /// * `token_ttl_seconds` - Lifetime of issued tokens
    ///
    /// # Returns
    /// Configured auth service instance
    pub fn new(
        storage: Arc<dyn StorageAdapter>,
        password_hasher: Arc<PasswordHasher>,
        token_codec: Arc<TokenCodec>,
        token_ttl_seconds: i64,
    ) -> Self {
        Self {
            storage,
            password_hasher,
            token_codec,
            token_ttl_seconds,
        }
    }

    fn issue_session(&self, user: &User) -> Result<AuthSession, AuthError> {
        let token = self.token_codec.issue(
            user.id.as_str(),
            &user.email,
            user.name.as_deref(),
            self.token_ttl_seconds,
        )?;

        Ok(AuthSession {
            user: user.into(),
            token,
        })
    }

    // PBKDF2 is deliberately slow; keep it off the async workers.
    async fn hash_password(&self, password: &str) -> Result<String, AuthError> {
        let hasher = Arc::clone(&self.password_hasher);
        let password = password.to_string();

        let password_hash = tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| AuthError::Internal(format!("Password hashing task failed: {}", e)))??;

        Ok(password_hash)
    }

    async fn verify_password(&self, password: &str, stored: &str) -> Result<bool, AuthError> {
        let hasher = Arc::clone(&self.password_hasher);
        let password = password.to_string();
        let stored = stored.to_string();

        tokio::task::spawn_blocking(move || hasher.verify(&password, &stored))
            .await
            .map_err(|e| AuthError::Internal(format!("Password verification task failed: {}", e)))
    }
}

#[async_trait]
impl AuthServicePort for AuthService {
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        name: Option<&str>,
    ) -> Result<AuthSession, AuthError> {
        let email = EmailAddress::new(email)?;

        if self
            .storage
            .get_user_by_email(email.as_str())
            .await?
            .is_some()
        {
            return Err(AuthError::EmailAlreadyRegistered(email.to_string()));
        }

        let password_hash = self.hash_password(password).await?;
        let user = self
            .storage
            .create_or_update_user_by_email(NewUser::new(
                email,
                password_hash,
                name.map(str::to_string),
            ))
            .await?;

        tracing::info!(user_id = %user.id, "User signed up");

        self.issue_session(&user)
    }

    async fn validate_credentials(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthSession, AuthError> {
        let normalized = EmailAddress::normalize(email);

        let Some(user) = self.storage.get_user_by_email(&normalized).await? else {
            tracing::warn!("Login rejected: unknown email");
            return Err(AuthError::InvalidCredentials);
        };

        if !self.verify_password(password, &user.password_hash).await? {
            tracing::warn!(user_id = %user.id, "Login rejected: wrong password");
            return Err(AuthError::InvalidCredentials);
        }

        tracing::debug!(user_id = %user.id, "User logged in");

        self.issue_session(&user)
    }

    async fn authenticate_request(
        &self,
        authorization: Option<&str>,
    ) -> Result<PublicUser, AuthError> {
        let token = authorization
            .and_then(bearer_token)
            .ok_or(AuthError::MissingToken)?;

        let claims = self.token_codec.verify(token).map_err(|e| {
            let err = AuthError::from(e);
            tracing::warn!(kind = err.kind(), "Token rejected");
            err
        })?;

        let user_id = UserId::from_string(claims.sub);
        let user = self
            .storage
            .get_user_by_id(&user_id)
            .await?
            .ok_or_else(|| AuthError::UserNotFound(user_id.to_string()))?;

        Ok(user.into())
    }
}

#[cfg(test)]
mod tests {
    use auth::ManualClock;
    use chrono::Duration;
    use chrono::TimeZone;
    use chrono::Utc;

    use super::*;
    use crate::domain::storage::errors::StorageError;
    use crate::domain::storage::ports::mocks::MockStorage;

    const SECRET: &[u8] = b"test_secret_key_at_least_32_bytes_long";

    fn service(storage: MockStorage, clock: Arc<ManualClock>) -> AuthService {
        AuthService::new(
            Arc::new(storage),
            Arc::new(PasswordHasher::new()),
            Arc::new(TokenCodec::new(SECRET, clock).unwrap()),
            3600,
        )
    }

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        ))
    }

    fn stored_user(password: &str) -> User {
        User {
            id: UserId::from_string("user-1"),
            email: "bob@example.com".to_string(),
            password_hash: PasswordHasher::new().hash(password).unwrap(),
            name: Some("Bob".to_string()),
            created_at: Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_sign_up_success() {
        let mut storage = MockStorage::new();

        storage
            .expect_get_user_by_email()
            .withf(|email| email == "bob@example.com")
            .times(1)
            .returning(|_| Ok(None));
        storage
            .expect_create_or_update_user_by_email()
            .withf(|user| {
                user.email.as_str() == "bob@example.com"
                    && user.password_hash.contains('.')
                    && user.name.as_deref() == Some("Bob")
            })
            .times(1)
            .returning(|user| Ok(user.into_user()));

        let service = service(storage, clock());

        let session = service
            .sign_up(" Bob@Example.com ", "secret123", Some("Bob"))
            .await
            .expect("Failed to sign up");

        assert_eq!(session.user.email, "bob@example.com");
        assert_eq!(session.user.name.as_deref(), Some("Bob"));
        assert_eq!(session.token.split('.').count(), 3);
    }

    #[tokio::test]
    async fn test_sign_up_existing_email() {
        let mut storage = MockStorage::new();

        storage
            .expect_get_user_by_email()
            .times(1)
            .returning(|_| Ok(Some(stored_user("other"))));
        storage.expect_create_or_update_user_by_email().times(0);

        let service = service(storage, clock());

        let result = service.sign_up("bob@example.com", "secret123", None).await;
        assert!(matches!(
            result,
            Err(AuthError::EmailAlreadyRegistered(ref email)) if email == "bob@example.com"
        ));
    }

    #[tokio::test]
    async fn test_sign_up_invalid_email() {
        let mut storage = MockStorage::new();
        storage.expect_get_user_by_email().times(0);

        let service = service(storage, clock());

        let err = service
            .sign_up("not-an-email", "secret123", None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_email");
    }

    #[tokio::test]
    async fn test_validate_credentials() {
        let mut storage = MockStorage::new();
        let user = stored_user("secret123");

        storage
            .expect_get_user_by_email()
            .withf(|email| email == "bob@example.com")
            .times(2)
            .returning(move |_| Ok(Some(user.clone())));

        let service = service(storage, clock());

        let session = service
            .validate_credentials("BOB@example.com", "secret123")
            .await
            .expect("Failed to log in");
        assert_eq!(session.user.id.as_str(), "user-1");

        let err = service
            .validate_credentials("bob@example.com", "wrong")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_credentials");
    }

    #[tokio::test]
    async fn test_validate_credentials_unknown_email() {
        let mut storage = MockStorage::new();
        storage
            .expect_get_user_by_email()
            .times(1)
            .returning(|_| Ok(None));

        let service = service(storage, clock());

        let err = service
            .validate_credentials("nobody@example.com", "secret123")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
    }

    #[tokio::test]
    async fn test_authenticate_request() {
        let mut storage = MockStorage::new();
        let user = stored_user("secret123");
        let returned = user.clone();

        storage
            .expect_get_user_by_email()
            .returning(move |_| Ok(Some(returned.clone())));
        storage
            .expect_get_user_by_id()
            .withf(|id| id.as_str() == "user-1")
            .returning(move |_| Ok(Some(user.clone())));

        let service = service(storage, clock());
        let session = service
            .validate_credentials("bob@example.com", "secret123")
            .await
            .unwrap();

        let header = format!("Bearer {}", session.token);
        let resolved = service.authenticate_request(Some(&header)).await.unwrap();
        assert_eq!(resolved, session.user);

        let lowercase = format!("bearer {}", session.token);
        assert!(service.authenticate_request(Some(&lowercase)).await.is_ok());

        let tampered = format!("Bearer {}x", session.token);
        let err = service
            .authenticate_request(Some(&tampered))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_signature");
    }

    #[tokio::test]
    async fn test_authenticate_request_missing_token() {
        let service = service(MockStorage::new(), clock());

        for header in [None, Some("Basic abc"), Some("Bearer "), Some("")] {
            let err = service.authenticate_request(header).await.unwrap_err();
            assert!(matches!(err, AuthError::MissingToken), "{:?}", header);
        }

        let err = service
            .authenticate_request(Some("Bearer a.b"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "malformed_token");
    }

    #[tokio::test]
    async fn test_authenticate_request_expired() {
        let clock = clock();
        let mut storage = MockStorage::new();
        storage.expect_get_user_by_id().times(0);

        let service = service(storage, Arc::clone(&clock));
        let codec = TokenCodec::new(SECRET, clock.clone()).unwrap();
        let token = codec.issue("user-1", "bob@example.com", None, 3600).unwrap();

        clock.advance(Duration::seconds(3601));

        let err = service
            .authenticate_request(Some(&format!("Bearer {}", token)))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::TokenExpired));
    }

    #[tokio::test]
    async fn test_authenticate_request_deleted_user() {
        let clock = clock();
        let mut storage = MockStorage::new();
        storage
            .expect_get_user_by_id()
            .times(1)
            .returning(|_| Ok(None));

        let service = service(storage, Arc::clone(&clock));
        let codec = TokenCodec::new(SECRET, clock).unwrap();
        let token = codec.issue("gone", "gone@example.com", None, 3600).unwrap();

        let err = service
            .authenticate_request(Some(&format!("Bearer {}", token)))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::UserNotFound(ref id) if id == "gone"));
    }

    #[tokio::test]
    async fn test_storage_errors_propagate() {
        let mut storage = MockStorage::new();
        storage
            .expect_get_user_by_email()
            .times(1)
            .returning(|_| Err(StorageError::database("connection reset")));

        let service = service(storage, clock());

        let err = service
            .validate_credentials("bob@example.com", "secret123")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "storage");
    }
}

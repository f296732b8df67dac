mod common;

use std::sync::Arc;

use auth::ManualClock;
use auth::SystemClock;
use chrono::Duration;
use chrono::Utc;
use common::auth_service;
use common::storage_backends;
use common::unique_email;
use common::TEST_TOKEN_TTL_SECONDS;
use dashboard_service::domain::auth::errors::AuthError;
use dashboard_service::domain::auth::ports::AuthServicePort;
use dashboard_service::domain::storage::ports::StorageAdapter;
use dashboard_service::outbound::storage::InMemoryStorage;

#[tokio::test]
async fn test_bob_signs_up_and_authenticates() {
    let storage: Arc<dyn StorageAdapter> = Arc::new(InMemoryStorage::new());
    let service = auth_service(storage, Arc::new(SystemClock));

    let session = service
        .sign_up("bob@example.com", "secret123", Some("Bob"))
        .await
        .unwrap();
    let token = session.token;

    let user = service
        .authenticate_request(Some(&format!("Bearer {}", token)))
        .await
        .unwrap();
    assert_eq!(user, session.user);
    assert_eq!(user.email, "bob@example.com");
    assert_eq!(user.name.as_deref(), Some("Bob"));

    let result = service
        .authenticate_request(Some(&format!("Bearer {}x", token)))
        .await;
    assert!(matches!(result, Err(AuthError::InvalidSignature)));
}

#[tokio::test]
async fn test_email_identity_is_case_insensitive() {
    for (backend, storage) in storage_backends().await {
        let service = auth_service(Arc::clone(&storage), Arc::new(SystemClock));
        let email = unique_email("Mixed.Case");
        let shouted = email.to_uppercase();

        let session = service.sign_up(&shouted, "secret123", None).await.unwrap();
        assert_eq!(session.user.email, email.to_lowercase(), "{}", backend);

        let stored = storage
            .get_user_by_email(&email.to_lowercase())
            .await
            .unwrap()
            .expect("user stored");
        assert_eq!(stored.id, session.user.id, "{}", backend);

        let login = service
            .validate_credentials(&email, "secret123")
            .await
            .unwrap();
        assert_eq!(login.user.id, session.user.id, "{}", backend);

        let duplicate = service.sign_up(&email, "another", None).await;
        assert!(
            matches!(duplicate, Err(AuthError::EmailAlreadyRegistered(_))),
            "{}",
            backend
        );
    }
}

#[tokio::test]
async fn test_login_rejects_wrong_password_and_unknown_email() {
    let storage: Arc<dyn StorageAdapter> = Arc::new(InMemoryStorage::new());
    let service = auth_service(storage, Arc::new(SystemClock));

    service
        .sign_up("carol@example.com", "correct horse", None)
        .await
        .unwrap();

    let wrong = service
        .validate_credentials("carol@example.com", "battery staple")
        .await;
    assert!(matches!(wrong, Err(AuthError::InvalidCredentials)));

    let unknown = service
        .validate_credentials("nobody@example.com", "correct horse")
        .await;
    assert!(matches!(unknown, Err(AuthError::InvalidCredentials)));
}

#[tokio::test]
async fn test_token_expires_after_ttl() {
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let storage: Arc<dyn StorageAdapter> = Arc::new(InMemoryStorage::new());
    let service = auth_service(storage, clock.clone());

    let session = service
        .sign_up("dave@example.com", "secret123", None)
        .await
        .unwrap();
    let header = format!("Bearer {}", session.token);

    clock.advance(Duration::seconds(TEST_TOKEN_TTL_SECONDS - 1));
    assert!(service.authenticate_request(Some(&header)).await.is_ok());

    clock.advance(Duration::seconds(2));
    let result = service.authenticate_request(Some(&header)).await;
    assert!(matches!(result, Err(AuthError::TokenExpired)));
}

#[tokio::test]
async fn test_missing_or_foreign_scheme_is_missing_token() {
    let storage: Arc<dyn StorageAdapter> = Arc::new(InMemoryStorage::new());
    let service = auth_service(storage, Arc::new(SystemClock));

    for header in [None, Some("Basic abc"), Some("Bearer   ")] {
        let result = service.authenticate_request(header).await;
        assert!(matches!(result, Err(AuthError::MissingToken)), "{:?}", header);
    }

    let result = service
        .authenticate_request(Some("Bearer not-a-token"))
        .await;
    assert!(matches!(result, Err(AuthError::MalformedToken)));
}

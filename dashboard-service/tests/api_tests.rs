mod common;

use common::TestApp;
use dashboard_service::domain::oauth::OAuthProviderSettings;
use dashboard_service::domain::oauth::OAuthSettings;
use reqwest::StatusCode;
use serde_json::json;

#[tokio::test]
async fn test_health() {
    let app = TestApp::spawn().await;

    let response = app
        .get("/health")
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status(), StatusCode::OK);

    let body: serde_json::Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["data"]["status"], "ok");
}

#[tokio::test]
async fn test_signup_success() {
    let app = TestApp::spawn().await;

    let response = app
        .post("/api/auth/signup")
        .json(&json!({
            "email": "Nicola@Example.com",
            "password": "pass_word!",
            "name": "Nicola"
        }))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status(), StatusCode::CREATED);

    let body: serde_json::Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["status_code"], 201);
    assert_eq!(body["data"]["user"]["email"], "nicola@example.com");
    assert_eq!(body["data"]["user"]["name"], "Nicola");
    assert!(body["data"]["user"]["id"].is_string());
    assert!(body["data"]["user"]["createdAt"].is_string());
    assert!(body["data"]["user"].get("passwordHash").is_none());
    assert_eq!(body["data"]["token"].as_str().unwrap().split('.').count(), 3);
}

#[tokio::test]
async fn test_signup_duplicate_email() {
    let app = TestApp::spawn().await;
    app.sign_up("nicola@example.com", "pass_word!").await;

    let response = app
        .post("/api/auth/signup")
        .json(&json!({
            "email": "NICOLA@example.com",
            "password": "other_pass"
        }))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status(), StatusCode::CONFLICT);

    let body: serde_json::Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["data"]["kind"], "email_already_registered");
}

#[tokio::test]
async fn test_signup_invalid_email() {
    let app = TestApp::spawn().await;

    let response = app
        .post("/api/auth/signup")
        .json(&json!({
            "email": "not-an-email",
            "password": "pass_word!"
        }))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let body: serde_json::Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["data"]["kind"], "invalid_email");
}

#[tokio::test]
async fn test_login() {
    let app = TestApp::spawn().await;
    app.sign_up("nicola@example.com", "pass_word!").await;

    let response = app
        .post("/api/auth/login")
        .json(&json!({
            "email": "nicola@example.com",
            "password": "pass_word!"
        }))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status(), StatusCode::OK);

    let body: serde_json::Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["data"]["user"]["email"], "nicola@example.com");
    assert!(body["data"]["token"].is_string());
}

#[tokio::test]
async fn test_login_wrong_password() {
    let app = TestApp::spawn().await;
    app.sign_up("nicola@example.com", "pass_word!").await;

    let response = app
        .post("/api/auth/login")
        .json(&json!({
            "email": "nicola@example.com",
            "password": "wrong"
        }))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let body: serde_json::Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["data"]["kind"], "invalid_credentials");
}

#[tokio::test]
async fn test_me_with_token() {
    let app = TestApp::spawn().await;
    let token = app.sign_up("nicola@example.com", "pass_word!").await;

    let response = app
        .get_authenticated("/api/auth/me", &token)
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status(), StatusCode::OK);

    let body: serde_json::Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["data"]["email"], "nicola@example.com");
}

#[tokio::test]
async fn test_me_without_token() {
    let app = TestApp::spawn().await;

    let response = app
        .get("/api/auth/me")
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let body: serde_json::Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["data"]["kind"], "missing_token");
}

#[tokio::test]
async fn test_me_with_tampered_token() {
    let app = TestApp::spawn().await;
    let token = app.sign_up("nicola@example.com", "pass_word!").await;

    let response = app
        .get_authenticated("/api/auth/me", &format!("{}x", token))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let body: serde_json::Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["data"]["kind"], "invalid_signature");
}

#[tokio::test]
async fn test_setup_flow() {
    let app = TestApp::spawn().await;
    let token = app.sign_up("nicola@example.com", "pass_word!").await;

    let response = app
        .get_authenticated("/api/account/setup", &token)
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["data"]["isSetupComplete"], false);

    let response = app
        .post_authenticated("/api/account/setup", &token)
        .json(&json!({ "industry": "retail", "teamSize": 4 }))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["data"]["name"], "Default Workspace");
    assert!(body["data"]["id"].as_str().unwrap().starts_with("ws_"));

    let response = app
        .get_authenticated("/api/account/setup", &token)
        .send()
        .await
        .expect("Failed to execute request");
    let body: serde_json::Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["data"]["isSetupComplete"], true);
    assert_eq!(body["data"]["setupData"]["industry"], "retail");
}

#[tokio::test]
async fn test_oauth_url() {
    let app = TestApp::spawn_with_oauth(OAuthSettings {
        google: Some(OAuthProviderSettings {
            client_id: "client-123".to_string(),
            redirect_uri: "http://localhost:3000/oauth/callback".to_string(),
        }),
    })
    .await;

    let response = app
        .get("/api/auth/oauth/google?state=abc")
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status(), StatusCode::OK);

    let body: serde_json::Value = response.json().await.expect("Failed to parse response");
    let url = body["data"]["url"].as_str().unwrap();
    assert!(url.starts_with("https://accounts.google.com/o/oauth2/v2/auth?"));
    assert!(url.contains("client_id=client-123"));
    assert!(url.contains("state=abc"));

    let response = app
        .get("/api/auth/oauth/myspace")
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body: serde_json::Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["data"]["kind"], "unsupported_provider");
}

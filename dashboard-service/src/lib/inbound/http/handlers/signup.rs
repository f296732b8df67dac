use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use super::ApiError;
use super::ApiSuccess;
use crate::domain::auth::models::AuthSession;
use crate::inbound::http::router::AppState;

/// Register a user, record their pending setup and return a token.
pub async fn signup(
    State(state): State<AppState>,
    Json(body): Json<SignupRequest>,
) -> Result<ApiSuccess<AuthSession>, ApiError> {
    let session = state
        .auth_service
        .sign_up(&body.email, &body.password, body.name.as_deref())
        .await?;

    state
        .account_service
        .initialize_setup(&session.user.id)
        .await?;

    Ok(ApiSuccess::new(StatusCode::CREATED, session))
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SignupRequest {
    email: String,
    password: String,
    #[serde(default)]
    name: Option<String>,
}

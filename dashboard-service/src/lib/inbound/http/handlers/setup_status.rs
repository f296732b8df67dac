use axum::extract::State;
use axum::http::StatusCode;
use axum::Extension;

use super::ApiError;
use super::ApiSuccess;
use crate::domain::account::models::SetupStatus;
use crate::inbound::http::middleware::AuthenticatedUser;
use crate::inbound::http::router::AppState;

pub async fn setup_status(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
) -> Result<ApiSuccess<SetupStatus>, ApiError> {
    state
        .account_service
        .setup_status(&user.id)
        .await
        .map_err(ApiError::from)
        .map(|status| ApiSuccess::new(StatusCode::OK, status))
}

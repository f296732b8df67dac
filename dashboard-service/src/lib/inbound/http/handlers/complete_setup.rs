use axum::extract::State;
use axum::http::StatusCode;
use axum::Extension;
use axum::Json;

use super::ApiError;
use super::ApiSuccess;
use crate::domain::account::models::Workspace;
use crate::domain::Blob;
use crate::inbound::http::middleware::AuthenticatedUser;
use crate::inbound::http::router::AppState;

/// Store the onboarding answers as-is and create the default workspace.
pub async fn complete_setup(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
    Json(setup_data): Json<Blob>,
) -> Result<ApiSuccess<Workspace>, ApiError> {
    state
        .account_service
        .complete_setup(&user.id, setup_data)
        .await
        .map_err(ApiError::from)
        .map(|workspace| ApiSuccess::new(StatusCode::OK, workspace))
}

use axum::http::StatusCode;
use axum::Extension;

use super::ApiError;
use super::ApiSuccess;
use crate::domain::user::models::PublicUser;
use crate::inbound::http::middleware::AuthenticatedUser;

pub async fn current_user(
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
) -> Result<ApiSuccess<PublicUser>, ApiError> {
    Ok(ApiSuccess::new(StatusCode::OK, user))
}

use axum::extract::Request;
use axum::extract::State;
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::IntoResponse;
use axum::response::Response;

use super::handlers::ApiError;
use crate::domain::user::models::PublicUser;
use crate::inbound::http::router::AppState;

/// Extension carrying the caller resolved from the bearer token
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub PublicUser);

/// Middleware that resolves the bearer token and adds the caller to request
/// extensions
pub async fn authenticate(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, Response> {
    // A header that is not valid ASCII is treated as absent
    let authorization = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    let user = state
        .auth_service
        .authenticate_request(authorization)
        .await
        .map_err(|e| {
            tracing::warn!(kind = e.kind(), "Request authentication failed");
            ApiError::from(e).into_response()
        })?;

    req.extensions_mut().insert(AuthenticatedUser(user));

    Ok(next.run(req).await)
}

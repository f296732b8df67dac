use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::Json;
use serde::Serialize;

use crate::domain::account::errors::AccountError;
use crate::domain::auth::errors::AuthError;
use crate::domain::oauth::OAuthError;

pub mod complete_setup;
pub mod current_user;
pub mod health;
pub mod login;
pub mod oauth_url;
pub mod setup_status;
pub mod signup;

#[derive(Debug, Clone)]
pub struct ApiSuccess<T: Serialize + PartialEq>(StatusCode, Json<ApiResponseBody<T>>);

impl<T> PartialEq for ApiSuccess<T>
where
    T: Serialize + PartialEq,
{
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0 && self.1 .0 == other.1 .0
    }
}

impl<T: Serialize + PartialEq> ApiSuccess<T> {
    pub fn new(status: StatusCode, data: T) -> Self {
        ApiSuccess(status, Json(ApiResponseBody::new(status, data)))
    }
}

impl<T: Serialize + PartialEq> IntoResponse for ApiSuccess<T> {
    fn into_response(self) -> Response {
        (self.0, self.1).into_response()
    }
}

/// HTTP-facing error. Each variant carries the machine-checkable kind and
/// a human-readable message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    InternalServerError(String),
    UnprocessableEntity(&'static str, String),
    BadRequest(&'static str, String),
    NotFound(&'static str, String),
    Conflict(&'static str, String),
    Unauthorized(&'static str, String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, message) = match self {
            ApiError::InternalServerError(msg) => {
                tracing::error!(error = %msg, "Request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal",
                    "Internal server error".to_string(),
                )
            }
            ApiError::UnprocessableEntity(kind, msg) => {
                (StatusCode::UNPROCESSABLE_ENTITY, kind, msg)
            }
            ApiError::BadRequest(kind, msg) => (StatusCode::BAD_REQUEST, kind, msg),
            ApiError::NotFound(kind, msg) => (StatusCode::NOT_FOUND, kind, msg),
            ApiError::Conflict(kind, msg) => (StatusCode::CONFLICT, kind, msg),
            ApiError::Unauthorized(kind, msg) => (StatusCode::UNAUTHORIZED, kind, msg),
        };

        (
            status,
            Json(ApiResponseBody::new_error(status, kind, message)),
        )
            .into_response()
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        let kind = err.kind();
        match err {
            AuthError::InvalidCredentials
            | AuthError::MissingToken
            | AuthError::MalformedToken
            | AuthError::UnsupportedAlgorithm(_)
            | AuthError::InvalidSignature
            | AuthError::TokenExpired
            | AuthError::UserNotFound(_) => ApiError::Unauthorized(kind, err.to_string()),
            AuthError::EmailAlreadyRegistered(_) => ApiError::Conflict(kind, err.to_string()),
            AuthError::InvalidEmail(_) => ApiError::UnprocessableEntity(kind, err.to_string()),
            AuthError::Storage(_) | AuthError::Internal(_) => {
                ApiError::InternalServerError(err.to_string())
            }
        }
    }
}

impl From<AccountError> for ApiError {
    fn from(err: AccountError) -> Self {
        match err {
            AccountError::IntegrationNotFound { .. } => {
                ApiError::NotFound("integration_not_found", err.to_string())
            }
            AccountError::Storage(_) => ApiError::InternalServerError(err.to_string()),
        }
    }
}

impl From<OAuthError> for ApiError {
    fn from(err: OAuthError) -> Self {
        match err {
            OAuthError::UnsupportedProvider(_) => {
                ApiError::BadRequest("unsupported_provider", err.to_string())
            }
            OAuthError::NotConfigured(_) => {
                ApiError::BadRequest("provider_not_configured", err.to_string())
            }
            OAuthError::InvalidEndpoint(_) => ApiError::InternalServerError(err.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiResponseBody<T: Serialize + PartialEq> {
    status_code: u16,
    data: T,
}

impl<T: Serialize + PartialEq> ApiResponseBody<T> {
    pub fn new(status_code: StatusCode, data: T) -> Self {
        Self {
            status_code: status_code.as_u16(),
            data,
        }
    }
}

impl ApiResponseBody<ApiErrorData> {
    pub fn new_error(status_code: StatusCode, kind: &str, message: String) -> Self {
        Self {
            status_code: status_code.as_u16(),
            data: ApiErrorData {
                kind: kind.to_string(),
                message,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiErrorData {
    pub kind: String,
    pub message: String,
}

use axum::extract::Path;
use axum::extract::Query;
use axum::extract::State;
use axum::http::StatusCode;
use serde::Deserialize;
use serde::Serialize;

use super::ApiError;
use super::ApiSuccess;
use crate::inbound::http::router::AppState;

pub async fn oauth_url(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Query(query): Query<OAuthUrlQuery>,
) -> Result<ApiSuccess<OAuthUrlResponseData>, ApiError> {
    let url = state
        .oauth
        .authorization_url(&provider, query.state.as_deref())?;

    Ok(ApiSuccess::new(
        StatusCode::OK,
        OAuthUrlResponseData {
            url: url.to_string(),
        },
    ))
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OAuthUrlQuery {
    #[serde(default)]
    state: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OAuthUrlResponseData {
    pub url: String,
}

use serde::Deserialize;
use thiserror::Error;
use url::Url;

const GOOGLE_AUTHORIZATION_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_SCOPE: &str = "openid email profile";

/// Error for OAuth authorization URL construction
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OAuthError {
    #[error("Unsupported OAuth provider: {0}")]
    UnsupportedProvider(String),

    #[error("OAuth provider not configured: {0}")]
    NotConfigured(String),

    #[error("Invalid OAuth endpoint: {0}")]
    InvalidEndpoint(String),
}

/// Client registration with a single OAuth provider.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct OAuthProviderSettings {
    pub client_id: String,
    pub redirect_uri: String,
}

/// Registered OAuth providers.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct OAuthSettings {
    #[serde(default)]
    pub google: Option<OAuthProviderSettings>,
}

impl OAuthSettings {
    /// Build the URL a browser is sent to for consent.
    ///
    /// # Arguments
    /// * `provider` - Provider name, case-insensitive
    /// * `state` - Optional opaque value echoed back on the callback
    ///
    /// # Returns
    /// Authorization URL with the provider's query parameters
    ///
    /// # Errors
    /// * `UnsupportedProvider` - No such provider
    /// * `NotConfigured` - Provider known but no client registration configured
    pub fn authorization_url(&self, provider: &str, state: Option<&str>) -> Result<Url, OAuthError> {
        if !provider.eq_ignore_ascii_case("google") {
            return Err(OAuthError::UnsupportedProvider(provider.to_string()));
        }

        let settings = self
            .google
            .as_ref()
            .filter(|s| !s.client_id.is_empty() && !s.redirect_uri.is_empty())
            .ok_or_else(|| OAuthError::NotConfigured("google".to_string()))?;

        let mut url = Url::parse(GOOGLE_AUTHORIZATION_ENDPOINT)
            .map_err(|e| OAuthError::InvalidEndpoint(e.to_string()))?;

        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("client_id", &settings.client_id)
                .append_pair("redirect_uri", &settings.redirect_uri)
                .append_pair("response_type", "code")
                .append_pair("scope", GOOGLE_SCOPE)
                .append_pair("access_type", "offline")
                .append_pair("prompt", "consent");
            if let Some(state) = state {
                query.append_pair("state", state);
            }
        }

        Ok(url)
    }
}

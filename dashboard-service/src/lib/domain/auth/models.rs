use serde::Serialize;

use crate::domain::user::models::PublicUser;

const BEARER_SCHEME: &str = "bearer";

/// Result of a successful sign-up or login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthSession {
    pub user: PublicUser,
    pub token: String,
}

/// Extract the token from an `Authorization` header value.
///
/// The scheme is matched case-insensitively and may be followed by any
/// amount of whitespace.
///
/// # Returns
/// The token, or None for another scheme or an empty token
pub fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(char::is_whitespace)?;
    if !scheme.eq_ignore_ascii_case(BEARER_SCHEME) {
        return None;
    }

    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

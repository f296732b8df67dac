use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

/// Signing algorithm carried in every token header.
pub const ALGORITHM: &str = "HS256";

/// Token type carried in every token header.
pub const TOKEN_TYPE: &str = "JWT";

/// First token segment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenHeader {
    pub alg: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typ: Option<String>,
}

impl TokenHeader {
    /// The only header this codec issues.
    pub fn hs256() -> Self {
        Self {
            alg: ALGORITHM.to_string(),
            typ: Some(TOKEN_TYPE.to_string()),
        }
    }
}

/// Token payload.
///
/// `iat` and `exp` are Unix timestamps in seconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenClaims {
    /// Subject (user identifier)
    pub sub: String,

    pub email: String,

    #[serde(default)]
    pub name: Option<String>,

    /// Issued at
    pub iat: i64,

    /// Expiration time
    pub exp: i64,
}

impl TokenClaims {
    /// Create claims for a user, valid for `ttl_seconds` from `issued_at`.
    ///
    /// # Arguments
    /// * `user_id` - Unique user identifier
    /// * `email` - User email address
    /// * `name` - Optional display name
    /// * `issued_at` - Issuance instant
    /// * `ttl_seconds` - Seconds until the token expires
    ///
    /// # Returns
    /// Claims with sub, email, name, iat and exp set
    pub fn for_user(
        user_id: impl ToString,
        email: impl ToString,
        name: Option<&str>,
        issued_at: DateTime<Utc>,
        ttl_seconds: i64,
    ) -> Self {
        let iat = issued_at.timestamp();

        Self {
            sub: user_id.to_string(),
            email: email.to_string(),
            name: name.map(str::to_string),
            iat,
            exp: iat.saturating_add(ttl_seconds),
        }
    }

    /// Check if the token is expired. A token is still valid at exactly `exp`.
    pub fn is_expired(&self, current_timestamp: i64) -> bool {
        self.exp < current_timestamp
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_for_user() {
        let issued_at = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
        let claims = TokenClaims::for_user("user123", "alice@example.com", Some("Alice"), issued_at, 3600);

        assert_eq!(claims.sub, "user123");
        assert_eq!(claims.email, "alice@example.com");
        assert_eq!(claims.name.as_deref(), Some("Alice"));
        assert_eq!(claims.iat, issued_at.timestamp());
        assert_eq!(claims.exp - claims.iat, 3600);
    }

    #[test]
    fn test_is_expired() {
        let claims = TokenClaims {
            sub: "user123".to_string(),
            email: "a@example.com".to_string(),
            name: None,
            iat: 0,
            exp: 1000,
        };

        assert!(!claims.is_expired(999));
        assert!(!claims.is_expired(1000));
        assert!(claims.is_expired(1001));
    }

    #[test]
    fn test_name_serializes_as_null() {
        let claims = TokenClaims {
            sub: "u".to_string(),
            email: "e@example.com".to_string(),
            name: None,
            iat: 1,
            exp: 2,
        };

        let json = serde_json::to_value(&claims).unwrap();
        assert!(json["name"].is_null());

        let header = serde_json::to_string(&TokenHeader::hs256()).unwrap();
        assert_eq!(header, r#"{"alg":"HS256","typ":"JWT"}"#);
    }
}

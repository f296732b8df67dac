use std::fmt;
use std::str::FromStr;

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::timestamp_now;
use crate::user::errors::EmailError;

/// User aggregate entity.
///
/// Represents a registered dashboard user. The email is stored normalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub password_hash: String,
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// User unique identifier type
///
/// Opaque string; freshly generated ids are UUID v4 text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Generate a new random user ID.
    ///
    /// # Returns
    /// UserId with random UUID v4 text
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Wrap an identifier read from storage or a token subject.
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Email address type
///
/// Trimmed, lowercased and validated with an RFC 5322 compliant parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailAddress(String);

impl EmailAddress {
    /// Create a new validated email address.
    ///
    /// # Arguments
    /// * `email` - Raw email string
    ///
    /// # Returns
    /// Normalized EmailAddress value object
    ///
    /// # Errors
    /// * `InvalidFormat` - Email does not conform to RFC 5322
    pub fn new(email: &str) -> Result<Self, EmailError> {
        let normalized = Self::normalize(email);
        email_address::EmailAddress::from_str(&normalized)
            .map(|_| EmailAddress(normalized))
            .map_err(|e| EmailError::InvalidFormat(e.to_string()))
    }

    /// Canonical lookup form of an email: trimmed and lowercased.
    pub fn normalize(email: &str) -> String {
        email.trim().to_lowercase()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Candidate row for an upsert keyed by email.
///
/// When a user with the same email already exists, its id and created_at
/// are kept and only password_hash and name are replaced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub id: UserId,
    pub email: EmailAddress,
    pub password_hash: String,
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl NewUser {
    /// Construct a candidate user with a fresh id and creation time.
    ///
    /// # Arguments
    /// * `email` - Validated email address
    /// * `password_hash` - Stored password form
    /// * `name` - Optional display name
    ///
    /// # Returns
    /// NewUser ready to be persisted
    pub fn new(email: EmailAddress, password_hash: String, name: Option<String>) -> Self {
        Self {
            id: UserId::new(),
            email,
            password_hash,
            name,
            created_at: timestamp_now(),
        }
    }

    /// The row that gets stored when no user with this email exists yet.
    pub fn into_user(self) -> User {
        User {
            id: self.id,
            email: self.email.as_str().to_string(),
            password_hash: self.password_hash,
            name: self.name,
            created_at: self.created_at,
        }
    }
}

/// User record safe to hand to callers: no password hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: UserId,
    pub email: String,
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for PublicUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            email: user.email.clone(),
            name: user.name.clone(),
            created_at: user.created_at,
        }
    }
}

impl From<User> for PublicUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            name: user.name,
            created_at: user.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_is_normalized() {
        let email = EmailAddress::new("  Alice@Example.COM ").unwrap();
        assert_eq!(email.as_str(), "alice@example.com");
    }

    #[test]
    fn test_invalid_email_rejected() {
        assert!(matches!(
            EmailAddress::new("not-an-email"),
            Err(EmailError::InvalidFormat(_))
        ));
        assert!(EmailAddress::new("").is_err());
    }

    #[test]
    fn test_public_user_hides_password_hash() {
        let user = NewUser::new(
            EmailAddress::new("bob@example.com").unwrap(),
            "salt.key".to_string(),
            Some("Bob".to_string()),
        )
        .into_user();

        let json = serde_json::to_value(PublicUser::from(&user)).unwrap();
        assert_eq!(json["email"], "bob@example.com");
        assert_eq!(json["name"], "Bob");
        assert!(json["createdAt"].is_string());
        assert!(json.get("passwordHash").is_none());
        assert!(json.get("password_hash").is_none());
    }

    #[test]
    fn test_generated_ids_are_uuids() {
        let id = UserId::new();
        assert!(Uuid::parse_str(id.as_str()).is_ok());
        assert_ne!(id, UserId::new());
    }
}

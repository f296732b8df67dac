//! Credential utilities library
//!
//! Provides the credential primitives used by the dashboard service:
//! - Password hashing (PBKDF2-HMAC-SHA256, `salt.key` storage form)
//! - Compact signed tokens (`header.payload.signature`, HMAC-SHA256)
//! - An injectable clock so token expiry can be driven by tests
//!
//! Nothing in here knows about storage or transport; the service composes
//! these pieces with its own persistence port.
//!
//! # Examples
//!
//! ## Password Hashing
//! ```
//! use auth::PasswordHasher;
//!
//! let hasher = PasswordHasher::new();
//! let stored = hasher.hash("my_password").unwrap();
//! assert!(hasher.verify("my_password", &stored));
//! assert!(!hasher.verify("other_password", &stored));
//! ```
//!
//! ## Tokens
//! ```
//! use std::sync::Arc;
//!
//! use auth::SystemClock;
//! use auth::TokenCodec;
//!
//! let codec = TokenCodec::new(b"secret_key_at_least_32_bytes_long!", Arc::new(SystemClock)).unwrap();
//! let token = codec.issue("user123", "alice@example.com", Some("Alice"), 3600).unwrap();
//! let claims = codec.verify(&token).unwrap();
//! assert_eq!(claims.sub, "user123");
//! ```

pub mod clock;
pub mod encoding;
pub mod password;
pub mod token;

// Re-export commonly used items
pub use clock::Clock;
pub use clock::ManualClock;
pub use clock::SystemClock;
pub use password::PasswordError;
pub use password::PasswordHasher;
pub use token::TokenClaims;
pub use token::TokenCodec;
pub use token::TokenError;
pub use token::TokenHeader;

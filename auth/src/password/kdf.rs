use pbkdf2::pbkdf2_hmac;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;

use super::errors::PasswordError;
use crate::encoding::base64url_decode;
use crate::encoding::base64url_encode;
use crate::encoding::constant_time_eq;

/// PBKDF2 iteration count.
pub const ITERATIONS: u32 = 310_000;

/// Salt length in bytes.
pub const SALT_LENGTH: usize = 16;

/// Derived key length in bytes (256 bits).
pub const KEY_LENGTH: usize = 32;

const SEPARATOR: char = '.';

/// Password hashing implementation.
///
/// Stored form is `base64url(salt) + "." + base64url(derived_key)`, where the
/// key is PBKDF2-HMAC-SHA256 over the password with a fresh random salt.
pub struct PasswordHasher {
    iterations: u32,
}

impl PasswordHasher {
    /// Create a new password hasher instance.
    ///
    /// # Returns
    /// PasswordHasher using `ITERATIONS` rounds
    pub fn new() -> Self {
        Self {
            iterations: ITERATIONS,
        }
    }

    /// Hash a plaintext password.
    ///
    /// # Arguments
    /// * `password` - Plaintext password to hash
    ///
    /// # Returns
    /// Stored form `salt.key`, both halves base64url without padding
    ///
    /// # Errors
    /// * `RandomSource` - The OS random source could not provide a salt
    pub fn hash(&self, password: &str) -> Result<String, PasswordError> {
        let mut salt = [0u8; SALT_LENGTH];
        OsRng
            .try_fill_bytes(&mut salt)
            .map_err(|e| PasswordError::RandomSource(e.to_string()))?;

        let key = self.derive(password, &salt);

        Ok(format!(
            "{}{}{}",
            base64url_encode(salt),
            SEPARATOR,
            base64url_encode(key)
        ))
    }

    /// Verify a password against a stored form.
    ///
    /// Malformed stored forms never verify; this method does not fail.
    ///
    /// # Arguments
    /// * `password` - Plaintext password to verify
    /// * `stored` - Stored form produced by `hash`
    ///
    /// # Returns
    /// True if the password matches
    pub fn verify(&self, password: &str, stored: &str) -> bool {
        let Some((salt_part, key_part)) = stored.split_once(SEPARATOR) else {
            return false;
        };

        let (Ok(salt), Ok(expected)) = (base64url_decode(salt_part), base64url_decode(key_part))
        else {
            return false;
        };

        if salt.len() < SALT_LENGTH || expected.len() != KEY_LENGTH {
            return false;
        }

        let derived = self.derive(password, &salt);
        constant_time_eq(&derived, &expected)
    }

    fn derive(&self, password: &str, salt: &[u8]) -> [u8; KEY_LENGTH] {
        let mut key = [0u8; KEY_LENGTH];
        pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, self.iterations, &mut key);
        key
    }
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self::new()
    }
}

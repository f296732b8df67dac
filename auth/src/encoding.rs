//! Base64url helpers and constant-time comparison shared by the password and
//! token modules.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::DecodeError;
use base64::Engine;

/// Encode bytes as URL-safe base64 without `=` padding.
pub fn base64url_encode(bytes: impl AsRef<[u8]>) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Decode URL-safe, unpadded base64.
pub fn base64url_decode(value: &str) -> Result<Vec<u8>, DecodeError> {
    URL_SAFE_NO_PAD.decode(value)
}

/// Compare two byte slices without exiting on the first differing byte.
///
/// Lengths are not secret here (both sides are fixed-size digests), so a
/// length mismatch returns immediately.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }

    result == 0
}

use std::sync::Arc;

use hmac::Hmac;
use hmac::Mac;
use serde::Serialize;
use sha2::Sha256;

use super::claims::TokenClaims;
use super::claims::TokenHeader;
use super::claims::ALGORITHM;
use super::errors::TokenError;
use crate::clock::Clock;
use crate::encoding::base64url_decode;
use crate::encoding::base64url_encode;

type HmacSha256 = Hmac<Sha256>;

/// Issues and verifies compact signed tokens.
///
/// Wire format is `base64url(header).base64url(payload).base64url(hmac)`,
/// where the HMAC-SHA256 covers the ASCII bytes of `header.payload`.
pub struct TokenCodec {
    secret: Vec<u8>,
    clock: Arc<dyn Clock>,
}

impl TokenCodec {
    /// Create a codec with a shared signing secret.
    ///
    /// # Arguments
    /// * `secret` - Shared HMAC secret, supplied at process start
    /// * `clock` - Time source for `iat` and expiry checks
    ///
    /// # Returns
    /// Configured TokenCodec
    ///
    /// # Errors
    /// * `MissingSecret` - The secret is empty
    pub fn new(secret: impl AsRef<[u8]>, clock: Arc<dyn Clock>) -> Result<Self, TokenError> {
        let secret = secret.as_ref();
        if secret.is_empty() {
            return Err(TokenError::MissingSecret);
        }

        Ok(Self {
            secret: secret.to_vec(),
            clock,
        })
    }

    /// Issue a token for a user, valid for `ttl_seconds` from now.
    ///
    /// # Errors
    /// * `EncodingFailed` - Claims could not be serialized
    pub fn issue(
        &self,
        user_id: &str,
        email: &str,
        name: Option<&str>,
        ttl_seconds: i64,
    ) -> Result<String, TokenError> {
        let claims = TokenClaims::for_user(user_id, email, name, self.clock.now(), ttl_seconds);
        self.encode(&claims)
    }

    /// Sign arbitrary claims with the standard header.
    ///
    /// # Errors
    /// * `EncodingFailed` - Claims could not be serialized
    pub fn encode<T: Serialize>(&self, claims: &T) -> Result<String, TokenError> {
        let header = encode_segment(&TokenHeader::hs256())?;
        let payload = encode_segment(claims)?;
        let signing_input = format!("{}.{}", header, payload);

        let signature = self.sign(signing_input.as_bytes())?;

        Ok(format!("{}.{}", signing_input, base64url_encode(signature)))
    }

    /// Verify a token and return its claims.
    ///
    /// Checks run in order: shape, algorithm, signature, payload, expiry.
    ///
    /// # Errors
    /// * `MalformedToken` - Not three segments, or header/payload not decodable
    /// * `UnsupportedAlgorithm` - Header names an algorithm other than HS256
    /// * `InvalidSignature` - Signature does not match `header.payload`
    /// * `TokenExpired` - `exp` is before the current time
    pub fn verify(&self, token: &str) -> Result<TokenClaims, TokenError> {
        let segments: Vec<&str> = token.split('.').collect();
        let [header_part, payload_part, signature_part] = segments[..] else {
            return Err(TokenError::MalformedToken);
        };

        if header_part.is_empty() || payload_part.is_empty() || signature_part.is_empty() {
            return Err(TokenError::MalformedToken);
        }

        let header: TokenHeader = decode_segment(header_part)?;
        if header.alg != ALGORITHM {
            return Err(TokenError::UnsupportedAlgorithm(header.alg));
        }

        let signature =
            base64url_decode(signature_part).map_err(|_| TokenError::InvalidSignature)?;
        let signing_input = &token[..header_part.len() + 1 + payload_part.len()];

        let mut mac = self.mac()?;
        mac.update(signing_input.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| TokenError::InvalidSignature)?;

        let claims: TokenClaims = decode_segment(payload_part)?;
        if claims.is_expired(self.clock.timestamp()) {
            return Err(TokenError::TokenExpired);
        }

        Ok(claims)
    }

    fn sign(&self, input: &[u8]) -> Result<Vec<u8>, TokenError> {
        let mut mac = self.mac()?;
        mac.update(input);
        Ok(mac.finalize().into_bytes().to_vec())
    }

    fn mac(&self) -> Result<HmacSha256, TokenError> {
        HmacSha256::new_from_slice(&self.secret).map_err(|_| TokenError::MissingSecret)
    }
}

fn encode_segment<T: Serialize>(value: &T) -> Result<String, TokenError> {
    serde_json::to_vec(value)
        .map(base64url_encode)
        .map_err(|e| TokenError::EncodingFailed(e.to_string()))
}

fn decode_segment<T: for<'de> serde::Deserialize<'de>>(segment: &str) -> Result<T, TokenError> {
    let bytes = base64url_decode(segment).map_err(|_| TokenError::MalformedToken)?;
    serde_json::from_slice(&bytes).map_err(|_| TokenError::MalformedToken)
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use chrono::TimeZone;
    use chrono::Utc;
    use serde_json::json;

    use super::*;
    use crate::clock::ManualClock;
    use crate::clock::SystemClock;

    const SECRET: &[u8] = b"my_secret_key_at_least_32_bytes_long!";

    fn codec_with_clock() -> (TokenCodec, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        ));
        let codec = TokenCodec::new(SECRET, clock.clone()).expect("Failed to build codec");
        (codec, clock)
    }

    fn replace_char(segment: &str, index: usize) -> String {
        let mut chars: Vec<char> = segment.chars().collect();
        chars[index] = if chars[index] == 'A' { 'B' } else { 'A' };
        chars.into_iter().collect()
    }

    #[test]
    fn test_issue_and_verify() {
        let codec = TokenCodec::new(SECRET, Arc::new(SystemClock)).unwrap();

        let token = codec
            .issue("user123", "alice@example.com", Some("Alice"), 3600)
            .expect("Failed to issue token");
        assert_eq!(token.split('.').count(), 3);
        assert!(!token.contains('='));

        let claims = codec.verify(&token).expect("Failed to verify token");
        assert_eq!(claims.sub, "user123");
        assert_eq!(claims.email, "alice@example.com");
        assert_eq!(claims.name.as_deref(), Some("Alice"));
        assert_eq!(claims.exp - claims.iat, 3600);
    }

    #[test]
    fn test_empty_secret_rejected() {
        let result = TokenCodec::new(b"", Arc::new(SystemClock));
        assert!(matches!(result, Err(TokenError::MissingSecret)));
    }

    #[test]
    fn test_expired_after_ttl() {
        let (codec, clock) = codec_with_clock();
        let token = codec.issue("user123", "a@example.com", None, 60).unwrap();

        clock.advance(Duration::seconds(60));
        assert!(codec.verify(&token).is_ok());

        clock.advance(Duration::seconds(1));
        assert_eq!(codec.verify(&token), Err(TokenError::TokenExpired));
    }

    #[test]
    fn test_wrong_segment_count() {
        let (codec, _) = codec_with_clock();
        let token = codec.issue("user123", "a@example.com", None, 60).unwrap();
        let parts: Vec<&str> = token.split('.').collect();

        assert_eq!(
            codec.verify(&format!("{}.{}", parts[0], parts[1])),
            Err(TokenError::MalformedToken)
        );
        assert_eq!(
            codec.verify(&format!("{}.x", token)),
            Err(TokenError::MalformedToken)
        );
        assert_eq!(codec.verify(""), Err(TokenError::MalformedToken));
        assert_eq!(codec.verify("invalid.token.here"), Err(TokenError::MalformedToken));
    }

    #[test]
    fn test_tampered_signature() {
        let (codec, _) = codec_with_clock();
        let token = codec.issue("user123", "a@example.com", None, 60).unwrap();
        let (signing_input, signature) = token.rsplit_once('.').unwrap();

        for index in 0..signature.len() {
            let tampered = format!("{}.{}", signing_input, replace_char(signature, index));
            assert_eq!(
                codec.verify(&tampered),
                Err(TokenError::InvalidSignature),
                "tampered index {}",
                index
            );
        }

        assert_eq!(
            codec.verify(&format!("{}x", token)),
            Err(TokenError::InvalidSignature)
        );
    }

    #[test]
    fn test_tampered_payload() {
        let (codec, _) = codec_with_clock();
        let token = codec.issue("user123", "a@example.com", None, 60).unwrap();
        let parts: Vec<&str> = token.split('.').collect();

        let forged_payload = base64url_encode(
            serde_json::to_vec(&json!({
                "sub": "admin",
                "email": "a@example.com",
                "name": null,
                "iat": 0,
                "exp": i64::MAX
            }))
            .unwrap(),
        );
        let forged = format!("{}.{}.{}", parts[0], forged_payload, parts[2]);
        assert_eq!(codec.verify(&forged), Err(TokenError::InvalidSignature));

        let flipped = format!("{}.{}.{}", parts[0], replace_char(parts[1], 5), parts[2]);
        assert_eq!(codec.verify(&flipped), Err(TokenError::InvalidSignature));
    }

    #[test]
    fn test_unsupported_algorithm() {
        let (codec, _) = codec_with_clock();
        let token = codec.issue("user123", "a@example.com", None, 60).unwrap();
        let parts: Vec<&str> = token.split('.').collect();

        let none_header = base64url_encode(br#"{"alg":"none","typ":"JWT"}"#);
        let forged = format!("{}.{}.{}", none_header, parts[1], parts[2]);

        assert_eq!(
            codec.verify(&forged),
            Err(TokenError::UnsupportedAlgorithm("none".to_string()))
        );
    }

    #[test]
    fn test_wrong_secret() {
        let (codec, clock) = codec_with_clock();
        let other = TokenCodec::new(b"another_secret_key_at_least_32_bytes", clock).unwrap();

        let token = codec.issue("user123", "a@example.com", None, 60).unwrap();
        assert_eq!(other.verify(&token), Err(TokenError::InvalidSignature));
    }

    #[test]
    fn test_signed_garbage_payload_is_malformed() {
        let (codec, _) = codec_with_clock();
        let token = codec.encode(&json!({ "unexpected": true })).unwrap();

        assert_eq!(codec.verify(&token), Err(TokenError::MalformedToken));
    }
}

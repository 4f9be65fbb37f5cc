//! Handshake authentication
//!
//! The core consumes verified identity tokens from an external provider;
//! this module checks the HS256 signature and expiry of the bearer token
//! presented at the WebSocket handshake and extracts its subject, which
//! becomes the user identity bound to the channel for its lifetime.

use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::Deserialize;

use gridlink_shared::UserId;

use crate::error::AuthError;

#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
    #[allow(dead_code)]
    exp: usize,
}

/// Verifies handshake bearer tokens.
pub struct TokenVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    /// Verify a token and return its subject.
    pub fn verify(&self, token: &str) -> Result<UserId, AuthError> {
        let data = jsonwebtoken::decode::<Claims>(token, &self.key, &self.validation)?;
        Ok(UserId(data.claims.sub))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde::Serialize;
    use std::time::{SystemTime, UNIX_EPOCH};

    #[derive(Serialize)]
    struct TestClaims {
        sub: String,
        exp: usize,
    }

    fn token(secret: &str, sub: &str, exp_offset: i64) -> String {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs() as i64;
        encode(
            &Header::default(),
            &TestClaims {
                sub: sub.to_string(),
                exp: (now + exp_offset) as usize,
            },
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn test_valid_token_yields_subject() {
        let verifier = TokenVerifier::new("secret");
        let user = verifier.verify(&token("secret", "user-42", 3600)).unwrap();
        assert_eq!(user, UserId::from("user-42"));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let verifier = TokenVerifier::new("secret");
        assert!(verifier.verify(&token("other", "user-42", 3600)).is_err());
    }

    #[test]
    fn test_expired_token_rejected() {
        let verifier = TokenVerifier::new("secret");
        assert!(verifier.verify(&token("secret", "user-42", -3600)).is_err());
    }

    #[test]
    fn test_garbage_rejected() {
        let verifier = TokenVerifier::new("secret");
        assert!(verifier.verify("not-a-jwt").is_err());
    }
}

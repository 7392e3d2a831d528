//! Signed session tokens (HS256) for password-authenticated sessions.
//!
//! Tokens carry the user id as their subject and are verified by
//! signature and expiry only; revocation happens through account
//! deactivation, checked by the strategies at validation time.

use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionTokenError {
    #[error("Failed to sign session token: {0}")]
    Signing(String),

    #[error("Invalid session token")]
    Invalid,
}

/// Claims carried by a session token.
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionClaims {
    /// User id.
    pub sub: String,
    /// Issued at (UTC timestamp).
    pub iat: i64,
    /// Expiration (UTC timestamp).
    pub exp: i64,
}

pub struct SessionTokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl SessionTokenService {
    #[must_use]
    pub fn new(secret: &str, ttl_hours: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
            ttl: Duration::hours(ttl_hours),
        }
    }

    /// Issue a token bound to the given user id.
    pub fn issue(&self, user_id: &str) -> Result<String, SessionTokenError> {
        let now = Utc::now();
        let claims = SessionClaims {
            sub: user_id.to_string(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| SessionTokenError::Signing(e.to_string()))
    }

    /// Verify signature and expiry, returning the claims.
    pub fn verify(&self, token: &str) -> Result<SessionClaims, SessionTokenError> {
        decode::<SessionClaims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|_| SessionTokenError::Invalid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    #[test]
    fn issued_token_round_trips_subject() {
        let service = SessionTokenService::new(SECRET, 12);
        let token = service.issue("user-42").unwrap();

        let claims = service.verify(&token).unwrap();
        assert_eq!(claims.sub, "user-42");
        assert_eq!(claims.exp - claims.iat, 12 * 3600);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let issuer = SessionTokenService::new(SECRET, 12);
        let verifier = SessionTokenService::new("another-secret-another-secret-xx", 12);

        let token = issuer.issue("user-42").unwrap();
        assert!(matches!(
            verifier.verify(&token),
            Err(SessionTokenError::Invalid)
        ));
    }

    #[test]
    fn expired_token_is_rejected() {
        let service = SessionTokenService::new(SECRET, -1);
        let token = service.issue("user-42").unwrap();

        assert!(matches!(
            service.verify(&token),
            Err(SessionTokenError::Invalid)
        ));
    }

    #[test]
    fn garbage_is_rejected() {
        let service = SessionTokenService::new(SECRET, 12);
        assert!(service.verify("not-a-jwt").is_err());
    }
}

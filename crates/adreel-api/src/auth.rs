//! Bearer-token session verification.
//!
//! Sessions are HS256 JWTs minted by the account service; this crate only
//! verifies them. The verifier sits behind a trait so tests can swap it.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::state::AppState;

/// Claims carried by a session token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    /// User id
    pub sub: String,
    /// Expiry (Unix seconds)
    pub exp: u64,
}

/// Verifies bearer tokens into session claims.
pub trait SessionVerifier: Send + Sync {
    fn verify(&self, token: &str) -> Result<SessionClaims, ApiError>;
}

/// HS256 verifier over a shared secret.
pub struct HsVerifier {
    decoding: DecodingKey,
}

impl HsVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

impl SessionVerifier for HsVerifier {
    fn verify(&self, token: &str) -> Result<SessionClaims, ApiError> {
        let data = decode::<SessionClaims>(
            token,
            &self.decoding,
            &Validation::new(Algorithm::HS256),
        )
        .map_err(|e| ApiError::unauthorized(format!("Invalid session token: {}", e)))?;
        Ok(data.claims)
    }
}

/// Mint a session token. Used by tests and local tooling; production
/// tokens come from the account service.
pub fn mint_token(secret: &str, user_id: &str, ttl: Duration) -> Result<String, ApiError> {
    let exp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
        + ttl.as_secs();
    let claims = SessionClaims {
        sub: user_id.to_string(),
        exp,
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| ApiError::internal(format!("Failed to mint token: {}", e)))
}

/// Authenticated user, extracted from the `Authorization` header.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub uid: String,
}

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::unauthorized("Missing Authorization header"))?;
        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| ApiError::unauthorized("Expected Bearer token"))?;

        let claims = state.verifier.verify(token)?;
        Ok(AuthUser { uid: claims.sub })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mint_and_verify_roundtrip() {
        let verifier = HsVerifier::new("test-secret");
        let token = mint_token("test-secret", "user-42", Duration::from_secs(60)).unwrap();
        let claims = verifier.verify(&token).unwrap();
        assert_eq!(claims.sub, "user-42");
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let verifier = HsVerifier::new("right-secret");
        let token = mint_token("wrong-secret", "user-42", Duration::from_secs(60)).unwrap();
        assert!(verifier.verify(&token).is_err());
    }

    #[test]
    fn test_expired_token_rejected() {
        let verifier = HsVerifier::new("test-secret");
        let claims = SessionClaims {
            sub: "user-42".to_string(),
            exp: 1, // 1970
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"test-secret"),
        )
        .unwrap();
        assert!(verifier.verify(&token).is_err());
    }
}

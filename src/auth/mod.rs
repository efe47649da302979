//! Bearer-token authentication.
//!
//! Token issuance belongs to the external identity provider; this module only
//! verifies the JWTs it mints (HS256, shared secret, issuer/audience checked)
//! and exposes the verified identity as an axum extractor.

use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::errors::ServiceError;

/// Claim structure for identity-provider tokens.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub email: Option<String>,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
    pub aud: String,
}

/// Authenticated user data extracted from a verified token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub email: String,
}

/// Verifies bearer tokens against the identity provider's signing secret.
#[derive(Clone)]
pub struct AuthVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl AuthVerifier {
    pub fn new(secret: &str, issuer: &str, audience: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[issuer]);
        validation.set_audience(&[audience]);
        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    pub fn from_config(cfg: &AppConfig) -> Self {
        Self::new(&cfg.jwt_secret, &cfg.jwt_issuer, &cfg.jwt_audience)
    }

    /// Verifies a token and extracts the caller's identity.
    pub fn verify(&self, token: &str) -> Result<AuthUser, ServiceError> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| ServiceError::AuthenticationError(format!("Invalid token: {e}")))?;

        let user_id = Uuid::parse_str(&data.claims.sub).map_err(|_| {
            ServiceError::AuthenticationError("Token subject is not a valid user id".to_string())
        })?;

        Ok(AuthUser {
            user_id,
            email: data.claims.email.unwrap_or_default(),
        })
    }
}

impl std::fmt::Debug for AuthVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthVerifier").finish_non_exhaustive()
    }
}

/// Signs a token accepted by [`AuthVerifier`]. Used by local development
/// tooling and the test harness; production tokens come from the identity
/// provider.
pub fn sign_token(
    user_id: Uuid,
    email: &str,
    secret: &str,
    issuer: &str,
    audience: &str,
    ttl_secs: i64,
) -> Result<String, ServiceError> {
    let now = Utc::now().timestamp();
    let claims = Claims {
        sub: user_id.to_string(),
        email: Some(email.to_string()),
        iat: now,
        exp: now + ttl_secs,
        iss: issuer.to_string(),
        aud: audience.to_string(),
    };

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| ServiceError::InternalError(format!("Failed to sign token: {e}")))
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let verifier = parts
            .extensions
            .get::<Arc<AuthVerifier>>()
            .cloned()
            .ok_or_else(|| {
                ServiceError::InternalError("Auth verifier not installed".to_string())
            })?;

        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                ServiceError::AuthenticationError(
                    "Missing or invalid authorization header".to_string(),
                )
            })?;

        let token = header.strip_prefix("Bearer ").ok_or_else(|| {
            ServiceError::AuthenticationError("Missing or invalid authorization header".to_string())
        })?;

        verifier.verify(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    const SECRET: &str = "test_secret_key_that_is_long_enough_for_validation";

    fn verifier() -> AuthVerifier {
        AuthVerifier::new(SECRET, "tavolo-auth", "tavolo-api")
    }

    #[test]
    fn valid_token_round_trips_identity() {
        let user_id = Uuid::new_v4();
        let token =
            sign_token(user_id, "a@b.test", SECRET, "tavolo-auth", "tavolo-api", 3600).unwrap();

        let user = verifier().verify(&token).unwrap();
        assert_eq!(user.user_id, user_id);
        assert_eq!(user.email, "a@b.test");
    }

    #[test]
    fn expired_token_is_rejected() {
        let token = sign_token(
            Uuid::new_v4(),
            "a@b.test",
            SECRET,
            "tavolo-auth",
            "tavolo-api",
            -600,
        )
        .unwrap();

        assert_matches!(
            verifier().verify(&token),
            Err(ServiceError::AuthenticationError(_))
        );
    }

    #[test]
    fn wrong_audience_is_rejected() {
        let token = sign_token(
            Uuid::new_v4(),
            "a@b.test",
            SECRET,
            "tavolo-auth",
            "some-other-api",
            3600,
        )
        .unwrap();

        assert_matches!(
            verifier().verify(&token),
            Err(ServiceError::AuthenticationError(_))
        );
    }

    #[test]
    fn garbage_token_is_rejected() {
        assert_matches!(
            verifier().verify("not-a-jwt"),
            Err(ServiceError::AuthenticationError(_))
        );
    }
}

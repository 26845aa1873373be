use axum::extract::{FromRef, FromRequestParts};
use axum::http::request::Parts;
use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::domain::error::AppError;
use crate::domain::models::UserId;

/// Bearer token payload: `(subject, issued_at, expires_at)` per §4.10,
/// same field shape as the teacher's `auth/jwt.rs::Claims` with the
/// integer-role/user_id fields dropped — the orchestrator only needs the
/// subject identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: UserId,
    pub iat: i64,
    pub exp: i64,
}

/// C11's token half. Grounded on `auth/jwt.rs::JwtManager`: same
/// encode/decode shape, generalized from an integer user id to the opaque
/// `UserId` the rest of the core uses.
pub struct AuthService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    expire_seconds: i64,
}

impl AuthService {
    pub fn new(secret: &str, expire_minutes: u64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            expire_seconds: (expire_minutes * 60) as i64,
        }
    }

    pub fn issue_token(&self, subject: &str) -> Result<(String, i64), AppError> {
        let iat = Utc::now().timestamp();
        let exp = iat + self.expire_seconds;
        let claims = Claims { sub: subject.to_string(), iat, exp };

        let token = encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(format!("token signing failed: {e}")))?;

        Ok((token, exp))
    }

    pub fn verify_token(&self, token: &str) -> Result<Claims, AppError> {
        let mut validation = Validation::default();
        validation.validate_exp = true;
        validation.leeway = 0;

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AppError::Expired,
                _ => AppError::Unauthenticated,
            })
    }
}

/// The request-scoped identity an authenticated handler receives. Any
/// `AppState`-like state type that can hand back an `Arc<AuthService>` via
/// `FromRef` gets this extractor for free, following axum's
/// state-parameterized extractor idiom used across the corpus's router
/// layering.
pub struct AuthenticatedUser {
    pub claims: Claims,
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    Arc<AuthService>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let auth_service = Arc::<AuthService>::from_ref(state);

        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(AppError::Unauthenticated)?;

        let token = header.strip_prefix("Bearer ").ok_or(AppError::Unauthenticated)?;
        let claims = auth_service.verify_token(token)?;

        Ok(AuthenticatedUser { claims })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issues_and_verifies_a_token() {
        let service = AuthService::new("test-secret", 60);
        let (token, _exp) = service.issue_token("user-1").unwrap();
        let claims = service.verify_token(&token).unwrap();
        assert_eq!(claims.sub, "user-1");
    }

    #[test]
    fn rejects_token_signed_with_a_different_secret() {
        let issuer = AuthService::new("secret-a", 60);
        let verifier = AuthService::new("secret-b", 60);
        let (token, _exp) = issuer.issue_token("user-1").unwrap();
        assert!(matches!(verifier.verify_token(&token), Err(AppError::Unauthenticated)));
    }

    #[test]
    fn rejects_expired_token() {
        let service = AuthService::new("test-secret", 0);
        let (token, _exp) = service.issue_token("user-1").unwrap();
        std::thread::sleep(std::time::Duration::from_secs(1));
        assert!(matches!(service.verify_token(&token), Err(AppError::Expired)));
    }
}

use async_trait::async_trait;
use axum::http::HeaderMap;
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::shared::AppError;

/// Role of an authenticated platform user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Tutor,
    Student,
    Admin,
}

/// Identity handed to the core by the authentication layer
#[derive(Debug, Clone, PartialEq)]
pub struct AuthUser {
    pub id: String,
    pub role: Role,
}

/// Resolves an opaque token into a user identity and role.
///
/// Token issuance, account storage and permission policy all live outside
/// the core; this is the only surface the live layer consumes.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn authenticate(&self, token: &str) -> Result<AuthUser, AppError>;
}

/// JWT claims carried by the platform's auth middleware
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: Role,
    pub exp: usize,
}

/// Identity provider validating HS256 tokens issued by the platform
pub struct JwtIdentityProvider {
    decoding_key: DecodingKey,
}

impl JwtIdentityProvider {
    pub fn new(secret: &str) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

#[async_trait]
impl IdentityProvider for JwtIdentityProvider {
    async fn authenticate(&self, token: &str) -> Result<AuthUser, AppError> {
        let token_data = decode::<Claims>(token, &self.decoding_key, &Validation::default())
            .map_err(|e| {
                debug!(error = %e, "Token validation failed");
                AppError::Unauthorized("Invalid token".to_string())
            })?;

        Ok(AuthUser {
            id: token_data.claims.sub,
            role: token_data.claims.role,
        })
    }
}

/// Extracts the bearer token from an Authorization header and resolves it.
///
/// Used by the HTTP handlers; the live channel carries its token in
/// Sec-WebSocket-Protocol instead.
pub async fn bearer_user(
    headers: &HeaderMap,
    identity: &Arc<dyn IdentityProvider>,
) -> Result<AuthUser, AppError> {
    let token = headers
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or_else(|| AppError::Unauthorized("Missing bearer token".to_string()))?;

    identity.authenticate(token).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn make_token(secret: &str, sub: &str, role: Role, exp_offset_secs: i64) -> String {
        let claims = Claims {
            sub: sub.to_string(),
            role,
            exp: (chrono::Utc::now().timestamp() + exp_offset_secs) as usize,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_valid_token_resolves_identity() {
        let provider = JwtIdentityProvider::new("test-secret");
        let token = make_token("test-secret", "user-1", Role::Tutor, 3600);

        let user = provider.authenticate(&token).await.unwrap();
        assert_eq!(user.id, "user-1");
        assert_eq!(user.role, Role::Tutor);
    }

    #[tokio::test]
    async fn test_expired_token_rejected() {
        let provider = JwtIdentityProvider::new("test-secret");
        let token = make_token("test-secret", "user-1", Role::Student, -3600);

        let result = provider.authenticate(&token).await;
        assert!(matches!(result, Err(AppError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn test_wrong_secret_rejected() {
        let provider = JwtIdentityProvider::new("test-secret");
        let token = make_token("other-secret", "user-1", Role::Student, 3600);

        let result = provider.authenticate(&token).await;
        assert!(matches!(result, Err(AppError::Unauthorized(_))));
    }
}

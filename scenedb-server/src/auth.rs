//! JWT authentication module
//!
//! Provides the [`Actor`] extractor for Axum handlers. Tokens are HS256 JWTs
//! signed with the shared `JWT_SECRET`; the `sub` claim is the acting user's
//! UUID and `roles` grants capabilities. The core never checks roles, so every
//! handler that mutates or reads catalog data calls [`Actor::require`].

use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

/// Capability granted by a token. Each role implies the ones below it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// Query scenes and look up fingerprints
    Read,
    /// Submit and unmatch fingerprints, edit a scene's fingerprint set
    Modify,
    /// Act on behalf of other users
    Admin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Read => "READ",
            Self::Modify => "MODIFY",
            Self::Admin => "ADMIN",
        }
    }
}

/// Claims carried by SceneDB tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: Uuid,
    #[serde(default)]
    pub roles: Vec<Role>,
    /// Expiration time (validated by jsonwebtoken)
    pub exp: u64,
}

/// HS256 signing and verification keys derived from the shared secret
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl JwtKeys {
    pub fn from_secret(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    /// Issue a token for `user_id` valid for `ttl_secs`.
    pub fn issue(&self, user_id: Uuid, roles: &[Role], ttl_secs: u64) -> Result<String, ApiError> {
        let claims = Claims {
            sub: user_id,
            roles: roles.to_vec(),
            exp: now_epoch() + ttl_secs,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding).map_err(|e| {
            tracing::error!(error = %e, "Failed to sign JWT");
            ApiError::internal("Failed to issue token")
        })
    }

    /// Validate a token and extract its claims.
    pub fn validate(&self, token: &str) -> Result<Claims, ApiError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.validate_aud = false;

        let token_data =
            decode::<Claims>(token, &self.decoding, &validation).map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    ApiError::auth_error("AUTH_TOKEN_EXPIRED", "JWT token has expired")
                }
                jsonwebtoken::errors::ErrorKind::InvalidSignature => {
                    ApiError::auth_error("AUTH_INVALID_TOKEN", "Invalid JWT signature")
                }
                _ => ApiError::auth_error(
                    "AUTH_INVALID_TOKEN",
                    format!("JWT validation failed: {}", e),
                ),
            })?;

        Ok(token_data.claims)
    }
}

impl std::fmt::Debug for JwtKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("JwtKeys(..)")
    }
}

fn now_epoch() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Extract the Bearer token from the Authorization header
fn extract_bearer_token(parts: &Parts) -> Result<&str, ApiError> {
    let auth_header = parts
        .headers
        .get(axum::http::header::AUTHORIZATION)
        .ok_or_else(|| {
            ApiError::auth_error("AUTH_MISSING_TOKEN", "Missing Authorization header")
        })?;

    let auth_value = auth_header.to_str().map_err(|_| {
        ApiError::auth_error(
            "AUTH_INVALID_TOKEN",
            "Invalid Authorization header encoding",
        )
    })?;

    auth_value.strip_prefix("Bearer ").ok_or_else(|| {
        ApiError::auth_error(
            "AUTH_INVALID_TOKEN",
            "Authorization header must use Bearer scheme",
        )
    })
}

/// The authenticated caller of a request.
#[derive(Debug, Clone)]
pub struct Actor {
    pub user_id: Uuid,
    pub roles: Vec<Role>,
}

impl Actor {
    /// Whether the actor holds `role` directly or through a higher role.
    pub fn has(&self, role: Role) -> bool {
        self.roles.iter().any(|granted| *granted >= role)
    }

    /// Fail with 403 unless the actor holds `role`.
    pub fn require(&self, role: Role) -> Result<(), ApiError> {
        if self.has(role) {
            Ok(())
        } else {
            Err(ApiError::forbidden(format!(
                "{} role required",
                role.as_str()
            )))
        }
    }
}

impl FromRequestParts<AppState> for Actor {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_bearer_token(parts)?;

        let keys = state.jwt_keys.as_ref().ok_or_else(|| {
            ApiError::internal("JWT authentication not configured (missing JWT_SECRET)")
        })?;

        let claims = keys.validate(token)?;

        Ok(Actor {
            user_id: claims.sub,
            roles: claims.roles,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";

    #[test]
    fn test_issued_token_validates() {
        let keys = JwtKeys::from_secret(SECRET);
        let user = Uuid::new_v4();
        let token = keys.issue(user, &[Role::Modify], 3600).unwrap();

        let claims = keys.validate(&token).unwrap();
        assert_eq!(claims.sub, user);
        assert_eq!(claims.roles, vec![Role::Modify]);
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = JwtKeys::from_secret(SECRET)
            .issue(Uuid::new_v4(), &[Role::Read], 3600)
            .unwrap();

        let err = JwtKeys::from_secret("other-secret")
            .validate(&token)
            .unwrap_err();
        match err {
            ApiError::AuthError { code, .. } => assert_eq!(code, "AUTH_INVALID_TOKEN"),
            other => panic!(
                "Expected AuthError with AUTH_INVALID_TOKEN, got: {:?}",
                other
            ),
        }
    }

    #[test]
    fn test_expired_token_rejected() {
        let keys = JwtKeys::from_secret(SECRET);
        let claims = Claims {
            sub: Uuid::new_v4(),
            roles: vec![Role::Read],
            exp: now_epoch() - 3600,
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &keys.encoding).unwrap();

        let err = keys.validate(&token).unwrap_err();
        match err {
            ApiError::AuthError { code, .. } => assert_eq!(code, "AUTH_TOKEN_EXPIRED"),
            other => panic!(
                "Expected AuthError with AUTH_TOKEN_EXPIRED, got: {:?}",
                other
            ),
        }
    }

    #[test]
    fn test_role_hierarchy() {
        let admin = Actor {
            user_id: Uuid::new_v4(),
            roles: vec![Role::Admin],
        };
        assert!(admin.has(Role::Read));
        assert!(admin.has(Role::Modify));

        let reader = Actor {
            user_id: Uuid::new_v4(),
            roles: vec![Role::Read],
        };
        assert!(reader.require(Role::Read).is_ok());
        let err = reader.require(Role::Modify).unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));

        let nobody = Actor {
            user_id: Uuid::new_v4(),
            roles: vec![],
        };
        assert!(!nobody.has(Role::Read));
    }

    #[test]
    fn test_extract_bearer_token_missing_header() {
        let (parts, _) = axum::http::Request::builder()
            .body(())
            .unwrap()
            .into_parts();

        let err = extract_bearer_token(&parts).unwrap_err();
        match err {
            ApiError::AuthError { code, .. } => assert_eq!(code, "AUTH_MISSING_TOKEN"),
            other => panic!(
                "Expected AuthError with AUTH_MISSING_TOKEN, got: {:?}",
                other
            ),
        }
    }

    #[test]
    fn test_extract_bearer_token_wrong_scheme() {
        let (parts, _) = axum::http::Request::builder()
            .header("Authorization", "Basic dXNlcjpwYXNz")
            .body(())
            .unwrap()
            .into_parts();

        let err = extract_bearer_token(&parts).unwrap_err();
        match err {
            ApiError::AuthError { code, .. } => assert_eq!(code, "AUTH_INVALID_TOKEN"),
            other => panic!(
                "Expected AuthError with AUTH_INVALID_TOKEN, got: {:?}",
                other
            ),
        }
    }

    #[test]
    fn test_extract_bearer_token_success() {
        let (parts, _) = axum::http::Request::builder()
            .header("Authorization", "Bearer my-jwt-token")
            .body(())
            .unwrap()
            .into_parts();

        let token = extract_bearer_token(&parts).unwrap();
        assert_eq!(token, "my-jwt-token");
    }
}

/*!
 * # Authentication
 *
 * Bearer-token verification for identities issued by the hosted auth
 * provider. Tokens are HS256 JWTs signed with the shared `jwt_secret`;
 * handlers receive the verified identity through the [`AuthUser`] extractor.
 *
 * The payment webhook route does not use this module; its authenticity gate
 * is the provider signature check in `payments::webhook`.
 */

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{errors::ServiceError, AppState};

pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_CUSTOMER: &str = "customer";

/// JWT claims as issued by the auth provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the user's unique identifier.
    pub sub: String,
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    pub exp: usize,
    pub iat: usize,
}

/// Verified caller identity, extracted from the Authorization header.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub role: String,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == ROLE_ADMIN
    }

    /// Rejects non-admin callers without revealing whether the target
    /// resource exists.
    pub fn require_admin(&self) -> Result<(), ServiceError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(ServiceError::Forbidden(
                "administrator access required".to_string(),
            ))
        }
    }

    /// Display name falling back to the email local part, used when an order
    /// carries no explicit customer-name override.
    pub fn display_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| {
            self.email
                .split('@')
                .next()
                .unwrap_or(self.email.as_str())
                .to_string()
        })
    }
}

/// Decodes and verifies a bearer token against the shared secret.
pub fn verify_token(token: &str, secret: &str) -> Result<AuthUser, ServiceError> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map_err(|e| ServiceError::Unauthorized(format!("invalid token: {e}")))?;

    let id = Uuid::parse_str(&data.claims.sub)
        .map_err(|_| ServiceError::Unauthorized("malformed token subject".to_string()))?;

    Ok(AuthUser {
        id,
        email: data.claims.email,
        name: data.claims.name,
        role: data
            .claims
            .role
            .unwrap_or_else(|| ROLE_CUSTOMER.to_string()),
    })
}

/// Issues a signed token for the given identity. Exposed for the test
/// harness and local tooling; production tokens come from the auth provider.
pub fn issue_token(
    secret: &str,
    user_id: Uuid,
    email: &str,
    name: Option<&str>,
    role: &str,
    ttl: Duration,
) -> Result<String, ServiceError> {
    let now = Utc::now();
    let claims = Claims {
        sub: user_id.to_string(),
        email: email.to_string(),
        name: name.map(str::to_string),
        role: Some(role.to_string()),
        exp: (now + ttl).timestamp() as usize,
        iat: now.timestamp() as usize,
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| ServiceError::InternalError(format!("failed to sign token: {e}")))
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ServiceError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header_value = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                ServiceError::Unauthorized("missing Authorization header".to_string())
            })?;

        let token = header_value
            .strip_prefix("Bearer ")
            .or_else(|| header_value.strip_prefix("bearer "))
            .ok_or_else(|| {
                ServiceError::Unauthorized("expected a bearer token".to_string())
            })?;

        verify_token(token, &state.config.jwt_secret)
    }
}

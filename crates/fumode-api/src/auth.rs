//! Authentication and authorization

use crate::{ApiError, AppState};
use axum::{
    body::Body,
    extract::State,
    http::{header::AUTHORIZATION, HeaderMap, Request},
    middleware::Next,
    response::Response,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const ADMIN_ROLE: &str = "admin";
pub const CUSTOMER_ROLE: &str = "customer";

/// Lifetime of issued tokens
pub fn token_ttl() -> Duration {
    Duration::hours(24)
}

/// JWT claims structure
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: u64,
    pub role: String,
    /// Expiration time
    pub exp: i64,
    /// Issued at
    pub iat: i64,
    /// Issuer
    pub iss: String,
}

impl Claims {
    pub fn has_role(&self, role: &str) -> bool {
        self.role.eq_ignore_ascii_case(role)
    }
}

/// Issue an HS256 token for `user_id` with `role`
pub fn generate_token(secret: &str, issuer: &str, user_id: u64, role: &str) -> Result<String, ApiError> {
    let now = Utc::now();
    let claims = Claims {
        user_id,
        role: role.to_string(),
        exp: (now + token_ttl()).timestamp(),
        iat: now.timestamp(),
        iss: issuer.to_string(),
    };

    encode(&Header::new(Algorithm::HS256), &claims, &EncodingKey::from_secret(secret.as_bytes()))
        .map_err(|e| ApiError::internal(format!("failed to sign token: {e}")))
}

/// Validate a JWT token and extract claims
pub fn validate_token(token: &str, secret: &str, issuer: &str) -> Result<Claims, ApiError> {
    let key = DecodingKey::from_secret(secret.as_bytes());
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[issuer]);

    decode::<Claims>(token, &key, &validation)
        .map(|data| data.claims)
        .map_err(|e| {
            tracing::debug!(error = %e, "token validation failed");
            ApiError::Unauthorized("invalid or expired token, please authenticate again".into())
        })
}

/// Extract bearer token from Authorization header
pub fn extract_bearer_token(auth_header: &str) -> Option<&str> {
    auth_header
        .strip_prefix("Bearer ")
        .or_else(|| auth_header.strip_prefix("bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Check the request's bearer token and require `role`.
///
/// A missing or invalid token is unauthorized; a valid token with another
/// role is forbidden.
pub fn authorize(state: &AppState, headers: &HeaderMap, role: &str) -> Result<Claims, ApiError> {
    let secret = state
        .config
        .jwt_secret
        .as_deref()
        .ok_or_else(|| ApiError::internal("JWT secret not configured"))?;

    let token = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(extract_bearer_token)
        .ok_or_else(|| ApiError::Unauthorized("missing or malformed authentication token".into()))?;

    let claims = validate_token(token, secret, &state.config.jwt_issuer)?;

    if !claims.has_role(role) {
        return Err(ApiError::Forbidden(format!(
            "you do not have permission to access this resource, {role} role required"
        )));
    }

    Ok(claims)
}

/// Route layer admitting only admin tokens
pub async fn require_admin(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let claims = authorize(&state, request.headers(), ADMIN_ROLE)?;
    request.extensions_mut().insert(claims);
    Ok(next.run(request).await)
}

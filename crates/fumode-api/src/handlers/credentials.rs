//! Shared pieces of the registration and login handlers

use crate::accounts::{Account, Directory, PasswordHash};
use crate::auth::generate_token;
use crate::validation::{validate_email, validate_password, ValidationErrors};
use crate::{ApiError, AppState};
use axum::{
    extract::rejection::JsonRejection,
    http::{header::AUTHORIZATION, HeaderName, HeaderValue},
    Json,
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

pub(crate) fn read_json<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))
}

impl RegisterRequest {
    pub(crate) fn validate(&self) -> Result<(), ApiError> {
        let mut v = ValidationErrors::new();
        v.check(!self.name.is_empty(), "name", "must be provided");
        v.check(self.name.len() <= 500, "name", "must not be more than 500 bytes long");
        validate_email(&mut v, &self.email);
        validate_password(&mut v, &self.password);
        Ok(v.into_result()?)
    }
}

/// Hash on the blocking pool
pub(crate) async fn hash_password(plaintext: String) -> Result<PasswordHash, ApiError> {
    tokio::task::spawn_blocking(move || PasswordHash::new(&plaintext))
        .await
        .map_err(|e| ApiError::internal(format!("password hashing task failed: {e}")))?
        .map_err(|e| ApiError::internal(e.to_string()))
}

/// Look up the account and check its password.
///
/// Unknown emails and wrong passwords are indistinguishable to the caller.
pub(crate) async fn authenticate<A>(directory: &Directory<A>, input: LoginRequest) -> Result<A, ApiError>
where
    A: Account + Send + 'static,
{
    let mut v = ValidationErrors::new();
    validate_email(&mut v, &input.email);
    validate_password(&mut v, &input.password);
    v.into_result()?;

    let account = directory
        .get_by_email(&input.email)
        .ok_or(ApiError::InvalidCredentials)?;

    let (account, matched) = tokio::task::spawn_blocking(move || {
        let matched = account.password().matches(&input.password);
        (account, matched)
    })
    .await
    .map_err(|e| ApiError::internal(format!("password check task failed: {e}")))?;

    if matched {
        Ok(account)
    } else {
        Err(ApiError::InvalidCredentials)
    }
}

/// `Authorization: Bearer <token>` for a freshly authenticated account
pub(crate) fn bearer_header(
    state: &AppState,
    account: &impl Account,
) -> Result<(HeaderName, HeaderValue), ApiError> {
    let secret = state
        .config
        .jwt_secret
        .as_deref()
        .ok_or_else(|| ApiError::internal("JWT secret not configured"))?;
    let token = generate_token(secret, &state.config.jwt_issuer, account.id(), account.role())?;
    let value = HeaderValue::from_str(&format!("Bearer {token}"))
        .map_err(|e| ApiError::internal(format!("invalid token header: {e}")))?;
    Ok((AUTHORIZATION, value))
}

//! Admin registration and login
//!
//! The first admin comes from configuration; further admins are created by
//! an existing one.

use super::credentials::{authenticate, bearer_header, hash_password, read_json, LoginRequest, RegisterRequest};
use super::customers::duplicate_email;
use crate::accounts::Admin;
use crate::{ApiError, AppState};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Serialize)]
pub struct AdminEnvelope {
    pub admin: Admin,
}

/// POST /v1/admins (admin only)
pub async fn register_admin(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let input = read_json(payload)?;
    input.validate()?;

    let password = hash_password(input.password).await?;
    let admin = state
        .admins
        .insert(&input.name, &input.email, password)
        .map_err(duplicate_email)?;

    info!(admin_id = admin.admin_id, "admin registered");
    Ok((StatusCode::CREATED, Json(AdminEnvelope { admin })).into_response())
}

/// POST /v1/admins/login
pub async fn login_admin(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let input = read_json(payload)?;
    let admin = authenticate(&state.admins, input).await?;
    let authorization = bearer_header(&state, &admin)?;

    Ok((StatusCode::OK, [authorization], Json(AdminEnvelope { admin })).into_response())
}

//! Customer registration and login

use super::credentials::{authenticate, bearer_header, hash_password, read_json, LoginRequest, RegisterRequest};
use crate::accounts::{Customer, DirectoryError};
use crate::validation::ValidationErrors;
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
pub struct CustomerEnvelope {
    pub customer: Customer,
}

/// Map a taken email to the same field error validation produces
pub(crate) fn duplicate_email(err: DirectoryError) -> ApiError {
    let mut v = ValidationErrors::new();
    v.add("email", &err.to_string());
    ApiError::Validation(v)
}

/// POST /v1/customers
pub async fn register_customer(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let input = read_json(payload)?;
    input.validate()?;

    let password = hash_password(input.password).await?;
    let customer = state
        .customers
        .insert(&input.name, &input.email, password)
        .map_err(duplicate_email)?;

    info!(customer_id = customer.customer_id, "customer registered");

    let notifier = Arc::clone(&state.notifier);
    let recipient = customer.clone();
    state.runner.submit("welcome-notification", async move {
        notifier.send_welcome(&recipient).await
    });

    Ok((StatusCode::CREATED, Json(CustomerEnvelope { customer })).into_response())
}

/// POST /v1/customers/login
///
/// Responds with the customer and a bearer token in `Authorization`.
pub async fn login_customer(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let input = read_json(payload)?;
    let customer = authenticate(&state.customers, input).await?;
    let authorization = bearer_header(&state, &customer)?;

    Ok((StatusCode::OK, [authorization], Json(CustomerEnvelope { customer })).into_response())
}

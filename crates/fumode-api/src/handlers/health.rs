//! Health check and the unknown-route fallback

use crate::{ApiError, AppState};
use axum::{extract::State, Json};
use fumode_core::{RegistryStats, ShutdownState};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub state: ShutdownState,
    pub system_info: SystemInfo,
    pub clients: RegistryStats,
    pub background_tasks: usize,
}

#[derive(Debug, Serialize)]
pub struct SystemInfo {
    pub environment: String,
    pub version: &'static str,
    pub uptime_secs: i64,
    pub persistent_storage: bool,
}

/// GET /v1/healthcheck
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let lifecycle = state.lifecycle_state();
    Json(HealthResponse {
        status: if lifecycle == ShutdownState::Running {
            "available"
        } else {
            "shutting_down"
        },
        state: lifecycle,
        system_info: SystemInfo {
            environment: state.config.env.clone(),
            version: env!("CARGO_PKG_VERSION"),
            uptime_secs: (chrono::Utc::now() - state.started_at).num_seconds(),
            persistent_storage: state.store.is_persistent(),
        },
        clients: state.admission.registry().stats(),
        background_tasks: state.runner.outstanding(),
    })
}

/// Fallback for unknown routes
pub async fn not_found() -> ApiError {
    ApiError::NotFound
}

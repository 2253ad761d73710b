// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::enclave::EnclaveStatus;
use crate::state::AppState;

/// Health check response with individual component status.
#[derive(Debug, Serialize, ToSchema)]
pub struct ReadyResponse {
    /// Overall health status ("ok", "degraded" or "recovering").
    pub status: String,
    /// Individual health checks and their results.
    pub checks: HealthChecks,
    /// Latest snapshot published by the enclave core.
    pub enclave: EnclaveStatus,
}

/// Individual health check results.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthChecks {
    /// Whether the service process is running.
    pub service: String,
    /// Sealed data directory availability.
    pub data_dir: String,
    /// Whether a DA node is attached to receive backups.
    pub da_node: String,
}

/// Simple health check response for liveness probes.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
}

fn report(state: &AppState) -> (bool, ReadyResponse) {
    let enclave = state.status();
    let data_ok = match state.storage.health_check() {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "Sealed storage health check failed");
            false
        }
    };

    let status = if !data_ok {
        "degraded"
    } else if enclave.recovery_mode {
        "recovering"
    } else {
        "ok"
    };

    let response = ReadyResponse {
        status: status.to_string(),
        checks: HealthChecks {
            service: "ok".to_string(),
            data_dir: if data_ok { "ok" } else { "unavailable" }.to_string(),
            da_node: if enclave.da_attached { "attached" } else { "detached" }.to_string(),
        },
        enclave,
    };
    (data_ok, response)
}

/// Health check endpoint handler.
///
/// Returns 200 while sealed storage is usable, 503 otherwise. Recovery
/// mode is reported but is not a failure.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service is healthy", body = ReadyResponse),
        (status = 503, description = "Service is unhealthy", body = ReadyResponse)
    )
)]
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<ReadyResponse>) {
    let (ok, response) = report(&state);
    let status = if ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(response))
}

/// Liveness probe handler.
///
/// Always returns 200 if the process is running.
#[utoipa::path(
    get,
    path = "/health/live",
    tag = "Health",
    responses(
        (status = 200, description = "Service is alive", body = HealthResponse)
    )
)]
pub async fn liveness() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// Readiness probe handler.
///
/// Players can only be served once recovery has finished, so a recovering
/// enclave is not ready.
#[utoipa::path(
    get,
    path = "/health/ready",
    tag = "Health",
    responses(
        (status = 200, description = "Service is ready", body = ReadyResponse),
        (status = 503, description = "Service is not ready", body = ReadyResponse)
    )
)]
pub async fn readiness(State(state): State<AppState>) -> (StatusCode, Json<ReadyResponse>) {
    let (ok, response) = report(&state);
    let status = if ok && !response.enclave.recovery_mode {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(response))
}

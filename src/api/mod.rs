// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{routing::get, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{enclave::EnclaveStatus, state::AppState};

pub mod health;
pub mod ws;

pub fn router(state: AppState) -> Router {
    let routes = Router::new()
        .route("/ws", get(ws::ws_handler))
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .with_state(state);

    Router::new()
        .merge(routes)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

#[derive(OpenApi)]
#[openapi(
    paths(
        ws::ws_handler,
        health::health,
        health::liveness,
        health::readiness
    ),
    components(
        schemas(
            health::ReadyResponse,
            health::HealthChecks,
            health::HealthResponse,
            EnclaveStatus
        )
    ),
    tags(
        (name = "Game", description = "WebSocket game protocol"),
        (name = "Health", description = "Liveness, readiness and enclave status")
    )
)]
struct ApiDoc;

//! Health and diagnostics endpoints.

use std::sync::Arc;

use axum::{Json, body::Body, extract::State, http::StatusCode, response::Response};
use closet_telemetry::{MetricsSnapshot, build_sha};
use serde::Serialize;
use tracing::{error, warn};

use crate::http::constants::{COMPONENT_SCRATCH, MSG_SCRATCH_UNAVAILABLE};
use crate::http::errors::ApiError;
use crate::state::ApiState;

#[derive(Serialize)]
pub(crate) struct HealthResponse {
    pub(crate) status: &'static str,
    pub(crate) scratch_dir: String,
    pub(crate) build: String,
    pub(crate) metrics: MetricsSnapshot,
    pub(crate) degraded: Vec<String>,
}

pub(crate) async fn health(
    State(state): State<Arc<ApiState>>,
) -> Result<Json<HealthResponse>, ApiError> {
    let root = state.scratch.root();
    if !state.scratch.is_available() {
        state.add_degraded_component(COMPONENT_SCRATCH);
        warn!(path = %root.display(), "health check found scratch directory missing");
        return Err(ApiError::service_unavailable(MSG_SCRATCH_UNAVAILABLE));
    }
    state.remove_degraded_component(COMPONENT_SCRATCH);

    let degraded = state.current_degraded();
    let status = if degraded.is_empty() { "ok" } else { "degraded" };
    Ok(Json(HealthResponse {
        status,
        scratch_dir: root.display().to_string(),
        build: build_sha().to_string(),
        metrics: state.telemetry.snapshot(),
        degraded,
    }))
}

pub(crate) async fn metrics(State(state): State<Arc<ApiState>>) -> Result<Response, ApiError> {
    match state.telemetry.render() {
        Ok(body) => Response::builder()
            .status(StatusCode::OK)
            .header(
                axum::http::header::CONTENT_TYPE,
                "text/plain; version=0.0.4",
            )
            .body(Body::from(body))
            .map_err(|err| {
                error!(error = %err, "failed to build metrics response");
                ApiError::internal("failed to build metrics response")
            }),
        Err(err) => {
            error!(error = %err, "failed to render metrics");
            Err(ApiError::internal("failed to render metrics"))
        }
    }
}

//! Read-only JSON endpoints for workflows and processes.

use axum::{
    extract::{Path, State},
    Json,
};

use super::{process_for, workflow_for};
use crate::web::dto::{ProcessResponse, WorkflowResponse};
use crate::web::error::{ApiError, ErrorResponse, WebError};
use crate::web::session::MaybeViewer;
use crate::web::state::AppState;

/// List the loaded workflow definitions
#[utoipa::path(
    get,
    path = "/api/v1/workflows",
    tag = "Workflows",
    responses(
        (status = 200, description = "Loaded workflows", body = Vec<WorkflowResponse>)
    )
)]
pub async fn list_workflows(State(state): State<AppState>) -> Json<Vec<WorkflowResponse>> {
    Json(
        state
            .registry
            .iter()
            .map(|def| WorkflowResponse::from(def.as_ref()))
            .collect(),
    )
}

/// Get a process with per-substep availability
#[utoipa::path(
    get,
    path = "/api/v1/w/{key}/processes/{id}",
    tag = "Processes",
    params(
        ("key" = String, Path, description = "Workflow key"),
        ("id" = String, Path, description = "Process ID")
    ),
    responses(
        (status = 200, description = "Process details", body = ProcessResponse),
        (status = 401, description = "Not signed in", body = ErrorResponse),
        (status = 403, description = "Workflow not accessible", body = ErrorResponse),
        (status = 404, description = "Process not found", body = ErrorResponse)
    )
)]
pub async fn get_process(
    State(state): State<AppState>,
    Path((key, id)): Path<(String, String)>,
    MaybeViewer(viewer): MaybeViewer,
) -> Result<Json<ProcessResponse>, ApiError> {
    let viewer = viewer.ok_or_else(|| WebError::Unauthorized("Please sign in.".to_string()))?;
    let def = workflow_for(&state, &viewer, &key).await?;
    let process = process_for(&state, &viewer, &def, &id).await?;
    Ok(Json(ProcessResponse::build(&def, &process)))
}

//! Data Transfer Objects for the JSON API.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::process::{availability, Process};
use crate::workflow::WorkflowDef;

// =============================================================================
// Health DTOs
// =============================================================================

/// Response for the health check endpoint
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Response for the status endpoint
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct StatusResponse {
    pub status: String,
    pub version: String,
    pub workflow_count: usize,
    pub default_workflow: String,
    pub legacy_cookie: bool,
}

// =============================================================================
// Workflow DTOs
// =============================================================================

/// One substep of a workflow in sequence order
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SubstepResponse {
    pub id: String,
    pub step_id: String,
    pub title: String,
    pub role: String,
    pub input_key: String,
    pub input_type: String,
}

/// Summary of a loaded workflow definition
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct WorkflowResponse {
    pub key: String,
    pub title: String,
    pub description: String,
    pub substeps: Vec<SubstepResponse>,
}

impl From<&WorkflowDef> for WorkflowResponse {
    fn from(def: &WorkflowDef) -> Self {
        Self {
            key: def.key.clone(),
            title: def.title.clone(),
            description: def.description.clone(),
            substeps: def
                .sequence()
                .into_iter()
                .map(|s| SubstepResponse {
                    id: s.substep.id.clone(),
                    step_id: s.step.id.clone(),
                    title: s.substep.title.clone(),
                    role: s.substep.role.clone(),
                    input_key: s.substep.input_key.clone(),
                    input_type: s.substep.input_type.as_str().to_string(),
                })
                .collect(),
        }
    }
}

// =============================================================================
// Process DTOs
// =============================================================================

/// Progress and gate state of one substep
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SubstepStatusResponse {
    pub substep_id: String,
    pub role: String,
    pub done: bool,
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub done_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub done_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub data: Option<serde_json::Value>,
}

/// A process with per-substep availability
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ProcessResponse {
    pub id: String,
    pub workflow_key: String,
    pub status: String,
    pub created_by: String,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    pub substeps: Vec<SubstepStatusResponse>,
}

impl ProcessResponse {
    pub fn build(def: &WorkflowDef, process: &Process) -> Self {
        let sequence = def.sequence();
        let substeps = availability(def, process)
            .into_iter()
            .zip(sequence)
            .map(|(gate, seq)| {
                let step = process.step(&gate.substep_id).filter(|s| s.is_done());
                SubstepStatusResponse {
                    role: seq.substep.role.clone(),
                    done: gate.done,
                    available: gate.available,
                    done_at: step.and_then(|s| s.done_at).map(|at| at.to_rfc3339()),
                    done_by: step
                        .and_then(|s| s.done_by.as_ref())
                        .map(|a| a.user_id.clone()),
                    data: step.and_then(|s| s.data.clone()),
                    substep_id: gate.substep_id,
                }
            })
            .collect();

        Self {
            id: process.id.clone(),
            workflow_key: process.workflow_key.clone(),
            status: process.status.as_str().to_string(),
            created_by: process.created_by.clone(),
            created_at: process.created_at.to_rfc3339(),
            completed_at: process.completed_at.map(|at| at.to_rfc3339()),
            substeps,
        }
    }
}

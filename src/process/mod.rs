//! Workflow instances and their per-substep progress.

pub mod availability;
pub mod completion;
pub mod payload;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::workflow::WorkflowDef;

pub use availability::{all_done, availability, next_available, sequence_ok, SubstepAvailability};
pub use completion::{CompletionError, CompletionOutcome, CompletionRequest, CompletionService};
pub use payload::{AttachmentRef, PayloadError, Submission, UploadedFile};

/// Identity completing a substep
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    pub user_id: String,
    pub role: String,
    pub workflow_key: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepState {
    Pending,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessStatus {
    Active,
    Done,
}

impl ProcessStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessStatus::Active => "active",
            ProcessStatus::Done => "done",
        }
    }
}

/// Progress of one substep; moves pending → done exactly once
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessStep {
    pub state: StepState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub done_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub done_by: Option<Actor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ProcessStep {
    pub fn pending() -> Self {
        Self {
            state: StepState::Pending,
            done_at: None,
            done_by: None,
            data: None,
        }
    }

    pub fn done(actor: Actor, at: DateTime<Utc>, data: serde_json::Value) -> Self {
        Self {
            state: StepState::Done,
            done_at: Some(at),
            done_by: Some(actor),
            data: Some(data),
        }
    }

    pub fn is_done(&self) -> bool {
        self.state == StepState::Done
    }
}

/// One running instance of a workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Process {
    pub id: String,
    pub workflow_key: String,
    /// Owning organization; `None` for processes started by legacy actors
    #[serde(default)]
    pub org_id: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub status: ProcessStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub progress: BTreeMap<String, ProcessStep>,
}

impl Process {
    /// New active process with every substep of `def` pending
    pub fn start(def: &WorkflowDef, org_id: Option<String>, created_by: &str) -> Self {
        let progress = def
            .sequence()
            .into_iter()
            .map(|s| (s.substep.id.clone(), ProcessStep::pending()))
            .collect();

        Self {
            id: Uuid::new_v4().to_string(),
            workflow_key: def.key.clone(),
            org_id,
            created_by: created_by.to_string(),
            created_at: Utc::now(),
            status: ProcessStatus::Active,
            completed_at: None,
            progress,
        }
    }

    /// Whether a substep is done; unknown substeps count as pending
    pub fn is_step_done(&self, substep_id: &str) -> bool {
        self.progress
            .get(substep_id)
            .is_some_and(ProcessStep::is_done)
    }

    pub fn step(&self, substep_id: &str) -> Option<&ProcessStep> {
        self.progress.get(substep_id)
    }

    pub fn done_count(&self) -> usize {
        self.progress.values().filter(|s| s.is_done()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::loader::load_builtin;

    #[test]
    fn test_start_initializes_every_substep_pending() {
        let def = load_builtin().unwrap();
        let process = Process::start(&def, Some("org-1".to_string()), "user-1");

        assert_eq!(process.progress.len(), def.substep_count());
        assert!(process
            .progress
            .values()
            .all(|s| s.state == StepState::Pending && s.data.is_none()));
        assert_eq!(process.status, ProcessStatus::Active);
        assert_eq!(process.workflow_key, "demo");
    }

    #[test]
    fn test_is_step_done_unknown_is_pending() {
        let def = load_builtin().unwrap();
        let process = Process::start(&def, None, "user-1");
        assert!(!process.is_step_done("1.1"));
        assert!(!process.is_step_done("nope"));
    }

    #[test]
    fn test_process_serializes_camel_case() {
        let def = load_builtin().unwrap();
        let mut process = Process::start(&def, None, "user-1");
        let actor = Actor {
            user_id: "user-1".to_string(),
            role: "dep1".to_string(),
            workflow_key: "demo".to_string(),
        };
        process.progress.insert(
            "1.1".to_string(),
            ProcessStep::done(actor, Utc::now(), serde_json::json!({"policy_owner": "Ada"})),
        );

        let json = serde_json::to_value(&process).unwrap();
        assert_eq!(json["workflowKey"], "demo");
        assert_eq!(json["progress"]["1.1"]["state"], "done");
        assert_eq!(json["progress"]["1.1"]["doneBy"]["userId"], "user-1");
        assert_eq!(process.done_count(), 1);
    }
}

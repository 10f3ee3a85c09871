//! Sequential gating of substeps.
//!
//! A substep is available iff it is not done and every substep before it in
//! the flattened sequence is done, so at most one substep is ever available.

use serde::Serialize;

use super::Process;
use crate::workflow::{Substep, WorkflowDef};

/// Per-substep gate result
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubstepAvailability {
    pub substep_id: String,
    pub done: bool,
    pub available: bool,
}

/// Walk the sequence once and mark the first pending substep available
pub fn availability(def: &WorkflowDef, process: &Process) -> Vec<SubstepAvailability> {
    let mut prefix_done = true;
    def.sequence()
        .into_iter()
        .map(|s| {
            let done = process.is_step_done(&s.substep.id);
            let available = !done && prefix_done;
            prefix_done &= done;
            SubstepAvailability {
                substep_id: s.substep.id.clone(),
                done,
                available,
            }
        })
        .collect()
}

/// True when every substep preceding `substep_id` is done
///
/// Unknown substeps are never in sequence.
pub fn sequence_ok(def: &WorkflowDef, process: &Process, substep_id: &str) -> bool {
    for s in def.sequence() {
        if s.substep.id == substep_id {
            return true;
        }
        if !process.is_step_done(&s.substep.id) {
            return false;
        }
    }
    false
}

/// The one substep currently open for completion
pub fn next_available<'a>(def: &'a WorkflowDef, process: &Process) -> Option<&'a Substep> {
    def.sequence()
        .into_iter()
        .map(|s| s.substep)
        .find(|s| !process.is_step_done(&s.id))
}

pub fn all_done(def: &WorkflowDef, process: &Process) -> bool {
    def.sequence()
        .iter()
        .all(|s| process.is_step_done(&s.substep.id))
}

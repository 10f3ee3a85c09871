//! The substep completion pipeline.
//!
//! Order: load process, resolve substep, reject already-done steps, compute
//! the sequence gate, ask the authorizer, validate the payload, store
//! attachments, mark the step done, notarize, flip process status, then
//! broadcast. A notarization failure leaves the step done; a failed progress
//! write removes the attachments stored for it.

use chrono::Utc;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{error, info, trace, warn};
use uuid::Uuid;

use super::availability::{all_done, next_available, sequence_ok};
use super::payload::{self, AttachmentRef, PayloadError, PreparedPayload, PreparedValue, Submission, UploadedFile};
use super::{Actor, Process, ProcessStatus};
use crate::authz::{Authorizer, AuthzError, CompletionCheck};
use crate::events::{Broadcaster, ChannelKey, LiveEvent};
use crate::notary::{sha256_hex, Notarization};
use crate::store::{Attachment, AttachmentStore, NotarizationStore, ProcessStore, Store, StoreError};
use crate::workflow::{Substep, WorkflowDef, WorkflowRegistry};

#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub actor: Actor,
    pub process_id: String,
    pub substep_id: String,
    pub submission: Submission,
}

#[derive(Debug, Clone)]
pub struct CompletionOutcome {
    /// Process after the update
    pub process: Process,
    pub notarization: Notarization,
    /// True only for the completion that finished the whole process
    pub process_completed: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    #[error("Process not found.")]
    ProcessNotFound(String),
    #[error("Workflow not found.")]
    WorkflowNotFound(String),
    #[error("Step not found.")]
    SubstepNotFound(String),
    #[error("This step has already been completed.")]
    AlreadyDone,
    #[error("This step is locked until the previous steps are completed.")]
    Locked,
    #[error("You are not allowed to complete this step.")]
    Forbidden,
    #[error("Authorization failed: {0}")]
    Authorization(#[from] AuthzError),
    #[error("{0}")]
    InvalidPayload(#[from] PayloadError),
    #[error("Failed to save progress: {0}")]
    Storage(#[from] StoreError),
    #[error("Progress saved but notarization failed: {0}")]
    NotarizationFailed(StoreError),
}

pub struct CompletionService {
    registry: Arc<WorkflowRegistry>,
    processes: Arc<dyn ProcessStore>,
    notarizations: Arc<dyn NotarizationStore>,
    attachments: Arc<dyn AttachmentStore>,
    authorizer: Arc<dyn Authorizer>,
    broadcaster: Broadcaster,
    max_upload_bytes: usize,
}

impl CompletionService {
    pub fn new<S: Store + 'static>(
        registry: Arc<WorkflowRegistry>,
        store: Arc<S>,
        authorizer: Arc<dyn Authorizer>,
        broadcaster: Broadcaster,
        max_upload_bytes: usize,
    ) -> Self {
        Self {
            registry,
            processes: store.clone(),
            notarizations: store.clone(),
            attachments: store,
            authorizer,
            broadcaster,
            max_upload_bytes,
        }
    }

    /// Replace the notarization log backend
    pub fn with_notarization_store(mut self, notarizations: Arc<dyn NotarizationStore>) -> Self {
        self.notarizations = notarizations;
        self
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_bytes
    }

    /// Run the done, sequence and policy checks without a payload
    ///
    /// Lets callers refuse a request before reading its body. `complete`
    /// repeats the same checks against the state current at that time.
    pub async fn admit(
        &self,
        actor: &Actor,
        process_id: &str,
        substep_id: &str,
    ) -> Result<(), CompletionError> {
        self.gate(actor, process_id, substep_id).await.map(|_| ())
    }

    /// Load the process and its definition, then apply the gates in order
    async fn gate(
        &self,
        actor: &Actor,
        process_id: &str,
        substep_id: &str,
    ) -> Result<(Process, Arc<WorkflowDef>), CompletionError> {
        let process = self
            .processes
            .get_process(process_id)
            .await?
            .ok_or_else(|| CompletionError::ProcessNotFound(process_id.to_string()))?;
        let def = self
            .registry
            .get(&process.workflow_key)
            .ok_or_else(|| CompletionError::WorkflowNotFound(process.workflow_key.clone()))?;
        let seq = def
            .find_substep(substep_id)
            .ok_or_else(|| CompletionError::SubstepNotFound(substep_id.to_string()))?;

        if process.is_step_done(substep_id) {
            return Err(CompletionError::AlreadyDone);
        }

        let in_sequence = sequence_ok(&def, &process, substep_id);
        let check = CompletionCheck {
            actor,
            process_id: &process.id,
            workflow_key: &def.key,
            substep: seq.substep,
            step_order: seq.step.order,
            sequence_ok: in_sequence,
        };
        let allowed = self.authorizer.can_complete(&check).await?;
        if !in_sequence {
            return Err(CompletionError::Locked);
        }
        if !allowed {
            info!(process_id = %process.id, substep_id = %substep_id, user_id = %actor.user_id, "Completion denied by policy");
            return Err(CompletionError::Forbidden);
        }
        Ok((process, def))
    }

    pub async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionOutcome, CompletionError> {
        let CompletionRequest {
            actor,
            process_id,
            substep_id,
            mut submission,
        } = request;

        let (process, def) = self.gate(&actor, &process_id, &substep_id).await?;
        let seq = def
            .find_substep(&substep_id)
            .ok_or_else(|| CompletionError::SubstepNotFound(substep_id.clone()))?;

        let prepared = payload::prepare(seq.substep, &mut submission, self.max_upload_bytes)?;
        let value = self
            .store_payload(&process.id, seq.substep, &actor, prepared)
            .await?;
        let data = payload::wrap(&seq.substep.input_key, value);

        let now = Utc::now();
        let mut updated = match self
            .processes
            .mark_step_done(&process.id, &substep_id, &actor, now, data.clone())
            .await
        {
            Ok(updated) => updated,
            Err(e) => {
                self.discard_attachments(&data).await;
                return Err(e.into());
            }
        };

        let notarization = Notarization::new(&process.id, &substep_id, data, actor.clone(), now);
        if let Err(e) = self.notarizations.append_notarization(notarization.clone()).await {
            error!(process_id = %process.id, substep_id = %substep_id, error = %e, "Notarization failed after progress was saved");
            return Err(CompletionError::NotarizationFailed(e));
        }

        let mut process_completed = false;
        if all_done(&def, &updated) {
            process_completed = self.processes.mark_process_done(&process.id, now).await?;
            if process_completed {
                updated.status = ProcessStatus::Done;
                updated.completed_at = Some(now);
                info!(process_id = %process.id, workflow = %def.key, "Process completed");
            }
        }

        info!(
            process_id = %process.id,
            substep_id = %substep_id,
            user_id = %actor.user_id,
            digest = %notarization.digest,
            "Substep completed"
        );

        self.announce(&def.key, &actor.role, next_available(&def, &updated), &updated.id);

        Ok(CompletionOutcome {
            process: updated,
            notarization,
            process_completed,
        })
    }

    /// Persist uploaded files and build the step value tree
    async fn store_payload(
        &self,
        process_id: &str,
        substep: &Substep,
        actor: &Actor,
        prepared: PreparedPayload,
    ) -> Result<Value, CompletionError> {
        match prepared {
            PreparedPayload::Single(value) => {
                self.store_value(process_id, substep, actor, value).await
            }
            PreparedPayload::Group(fields) => {
                let mut map = Map::new();
                for (key, value) in fields {
                    let value = self.store_value(process_id, substep, actor, value).await?;
                    map.insert(key, value);
                }
                Ok(Value::Object(map))
            }
        }
    }

    async fn store_value(
        &self,
        process_id: &str,
        substep: &Substep,
        actor: &Actor,
        value: PreparedValue,
    ) -> Result<Value, CompletionError> {
        match value {
            PreparedValue::Text(text) => Ok(Value::String(text)),
            PreparedValue::Number(number) => Ok(Value::Number(number)),
            PreparedValue::File(file) => {
                let reference = self.store_file(process_id, substep, actor, file).await?;
                serde_json::to_value(reference)
                    .map_err(|e| CompletionError::Storage(StoreError::Backend(e.to_string())))
            }
        }
    }

    async fn store_file(
        &self,
        process_id: &str,
        substep: &Substep,
        actor: &Actor,
        file: UploadedFile,
    ) -> Result<AttachmentRef, CompletionError> {
        let meta = Attachment {
            id: Uuid::new_v4().to_string(),
            process_id: process_id.to_string(),
            substep_id: substep.id.clone(),
            filename: file.filename,
            content_type: file.content_type,
            size: file.bytes.len() as u64,
            sha256: sha256_hex(&file.bytes),
            uploaded_by: actor.user_id.clone(),
            uploaded_at: Utc::now(),
        };
        let reference = AttachmentRef {
            attachment_id: meta.id.clone(),
            filename: meta.filename.clone(),
            content_type: meta.content_type.clone(),
            size: meta.size,
            sha256: meta.sha256.clone(),
        };
        self.attachments.put_attachment(meta, file.bytes).await?;
        Ok(reference)
    }

    /// Remove files stored for a step whose progress was never recorded
    async fn discard_attachments(&self, data: &Value) {
        for reference in payload::attachment_refs(data) {
            if let Err(e) = self.attachments.delete_attachment(&reference.attachment_id).await {
                warn!(attachment_id = %reference.attachment_id, error = %e, "Failed to remove orphaned attachment");
            }
        }
    }

    fn announce(&self, workflow_key: &str, actor_role: &str, next: Option<&Substep>, process_id: &str) {
        let process_event = LiveEvent::ProcessUpdated {
            process_id: process_id.to_string(),
        };
        let role_event = LiveEvent::RoleUpdated {
            process_id: process_id.to_string(),
        };

        self.broadcaster
            .broadcast(&ChannelKey::process(process_id), process_event);

        let mut roles = vec![actor_role.to_string()];
        if let Some(next) = next {
            if next.role != actor_role {
                roles.push(next.role.clone());
            }
        }
        for role in roles {
            let delivered = self
                .broadcaster
                .broadcast(&ChannelKey::role(workflow_key, &role), role_event.clone());
            if delivered == 0 {
                trace!(role = %role, "No live subscribers for role channel");
            }
        }
    }
}

//! In-memory store for development and tests

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::records::{normalize_email, Attachment, OneTimeToken, Organization, Role, Session, User};
use super::*;
use crate::notary::Notarization;
use crate::process::{Actor, Process, ProcessStatus, ProcessStep};

#[derive(Debug, Default)]
pub struct InMemoryStore {
    processes: Arc<RwLock<HashMap<String, Process>>>,
    notarizations: Arc<RwLock<Vec<Notarization>>>,
    attachments: Arc<RwLock<HashMap<String, (Attachment, Vec<u8>)>>>,
    orgs: Arc<RwLock<HashMap<String, Organization>>>,
    roles: Arc<RwLock<HashMap<String, Role>>>,
    users: Arc<RwLock<HashMap<String, User>>>,
    sessions: Arc<RwLock<HashMap<String, Session>>>,
    tokens: Arc<RwLock<HashMap<String, OneTimeToken>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProcessStore for InMemoryStore {
    async fn insert_process(&self, process: Process) -> StoreResult<()> {
        let mut processes = self.processes.write().await;
        if processes.contains_key(&process.id) {
            return Err(StoreError::duplicate("process", process.id));
        }
        processes.insert(process.id.clone(), process);
        Ok(())
    }

    async fn get_process(&self, id: &str) -> StoreResult<Option<Process>> {
        let processes = self.processes.read().await;
        Ok(processes.get(id).cloned())
    }

    async fn list_processes(
        &self,
        workflow_key: &str,
        org_id: Option<&str>,
    ) -> StoreResult<Vec<Process>> {
        let processes = self.processes.read().await;
        let mut out: Vec<Process> = processes
            .values()
            .filter(|p| p.workflow_key == workflow_key)
            .filter(|p| org_id.map_or(true, |org| p.org_id.as_deref() == Some(org)))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(out)
    }

    async fn mark_step_done(
        &self,
        process_id: &str,
        substep_id: &str,
        actor: &Actor,
        at: DateTime<Utc>,
        data: Value,
    ) -> StoreResult<Process> {
        let mut processes = self.processes.write().await;
        let process = processes
            .get_mut(process_id)
            .ok_or_else(|| StoreError::not_found("process", process_id))?;
        let step = process
            .progress
            .get_mut(substep_id)
            .ok_or_else(|| StoreError::not_found("substep", substep_id))?;
        *step = ProcessStep::done(actor.clone(), at, data);
        Ok(process.clone())
    }

    async fn mark_process_done(&self, process_id: &str, at: DateTime<Utc>) -> StoreResult<bool> {
        let mut processes = self.processes.write().await;
        let process = processes
            .get_mut(process_id)
            .ok_or_else(|| StoreError::not_found("process", process_id))?;
        if process.status == ProcessStatus::Done {
            return Ok(false);
        }
        process.status = ProcessStatus::Done;
        process.completed_at = Some(at);
        Ok(true)
    }
}

#[async_trait]
impl NotarizationStore for InMemoryStore {
    async fn append_notarization(&self, record: Notarization) -> StoreResult<()> {
        self.notarizations.write().await.push(record);
        Ok(())
    }

    async fn list_notarizations(&self, process_id: &str) -> StoreResult<Vec<Notarization>> {
        let records = self.notarizations.read().await;
        Ok(records
            .iter()
            .filter(|r| r.process_id == process_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl AttachmentStore for InMemoryStore {
    async fn put_attachment(&self, meta: Attachment, bytes: Vec<u8>) -> StoreResult<()> {
        let mut attachments = self.attachments.write().await;
        attachments.insert(meta.id.clone(), (meta, bytes));
        Ok(())
    }

    async fn get_attachment(&self, id: &str) -> StoreResult<Option<(Attachment, Vec<u8>)>> {
        let attachments = self.attachments.read().await;
        Ok(attachments.get(id).cloned())
    }

    async fn list_attachments(&self, process_id: &str) -> StoreResult<Vec<Attachment>> {
        let attachments = self.attachments.read().await;
        let mut out: Vec<Attachment> = attachments
            .values()
            .filter(|(meta, _)| meta.process_id == process_id)
            .map(|(meta, _)| meta.clone())
            .collect();
        out.sort_by(|a, b| a.uploaded_at.cmp(&b.uploaded_at).then(a.id.cmp(&b.id)));
        Ok(out)
    }

    async fn delete_attachment(&self, id: &str) -> StoreResult<bool> {
        Ok(self.attachments.write().await.remove(id).is_some())
    }
}

#[async_trait]
impl OrgStore for InMemoryStore {
    async fn insert_org(&self, org: Organization) -> StoreResult<()> {
        let mut orgs = self.orgs.write().await;
        if orgs.values().any(|o| o.slug == org.slug) {
            return Err(StoreError::duplicate("organization", org.slug));
        }
        orgs.insert(org.id.clone(), org);
        Ok(())
    }

    async fn get_org(&self, id: &str) -> StoreResult<Option<Organization>> {
        Ok(self.orgs.read().await.get(id).cloned())
    }

    async fn list_orgs(&self) -> StoreResult<Vec<Organization>> {
        let orgs = self.orgs.read().await;
        let mut out: Vec<Organization> = orgs.values().cloned().collect();
        out.sort_by(|a, b| a.slug.cmp(&b.slug));
        Ok(out)
    }
}

#[async_trait]
impl RoleStore for InMemoryStore {
    async fn insert_role(&self, role: Role) -> StoreResult<()> {
        let mut roles = self.roles.write().await;
        if roles
            .values()
            .any(|r| r.org_id == role.org_id && r.slug == role.slug)
        {
            return Err(StoreError::duplicate("role", role.slug));
        }
        roles.insert(role.id.clone(), role);
        Ok(())
    }

    async fn list_roles(&self, org_id: &str) -> StoreResult<Vec<Role>> {
        let roles = self.roles.read().await;
        let mut out: Vec<Role> = roles.values().filter(|r| r.org_id == org_id).cloned().collect();
        out.sort_by(|a, b| a.slug.cmp(&b.slug));
        Ok(out)
    }
}

#[async_trait]
impl UserStore for InMemoryStore {
    async fn insert_user(&self, user: User) -> StoreResult<()> {
        let mut users = self.users.write().await;
        if users.values().any(|u| u.email == user.email) {
            return Err(StoreError::duplicate("user", user.email));
        }
        users.insert(user.id.clone(), user);
        Ok(())
    }

    async fn update_user(&self, user: User) -> StoreResult<()> {
        let mut users = self.users.write().await;
        if users
            .values()
            .any(|u| u.id != user.id && u.email == user.email)
        {
            return Err(StoreError::duplicate("user", user.email));
        }
        match users.get_mut(&user.id) {
            Some(existing) => {
                *existing = user;
                Ok(())
            }
            None => Err(StoreError::not_found("user", user.id)),
        }
    }

    async fn get_user(&self, id: &str) -> StoreResult<Option<User>> {
        Ok(self.users.read().await.get(id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let email = normalize_email(email);
        let users = self.users.read().await;
        Ok(users.values().find(|u| u.email == email).cloned())
    }

    async fn list_users(&self, org_id: Option<&str>) -> StoreResult<Vec<User>> {
        let users = self.users.read().await;
        let mut out: Vec<User> = users
            .values()
            .filter(|u| org_id.map_or(true, |org| u.org_id.as_deref() == Some(org)))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.email.cmp(&b.email));
        Ok(out)
    }
}

#[async_trait]
impl SessionStore for InMemoryStore {
    async fn insert_session(&self, session: Session) -> StoreResult<()> {
        let mut sessions = self.sessions.write().await;
        sessions.insert(session.token_digest.clone(), session);
        Ok(())
    }

    async fn get_session(&self, token_digest: &str) -> StoreResult<Option<Session>> {
        Ok(self.sessions.read().await.get(token_digest).cloned())
    }

    async fn delete_session(&self, token_digest: &str) -> StoreResult<()> {
        self.sessions.write().await.remove(token_digest);
        Ok(())
    }

    async fn delete_user_sessions(&self, user_id: &str) -> StoreResult<usize> {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| s.user_id != user_id);
        Ok(before - sessions.len())
    }
}

#[async_trait]
impl TokenStore for InMemoryStore {
    async fn insert_token(&self, token: OneTimeToken) -> StoreResult<()> {
        let mut tokens = self.tokens.write().await;
        tokens.insert(token.token_digest.clone(), token);
        Ok(())
    }

    async fn get_token(&self, token_digest: &str) -> StoreResult<Option<OneTimeToken>> {
        Ok(self.tokens.read().await.get(token_digest).cloned())
    }

    async fn mark_token_used(&self, token_digest: &str, at: DateTime<Utc>) -> StoreResult<()> {
        let mut tokens = self.tokens.write().await;
        let token = tokens
            .get_mut(token_digest)
            .ok_or_else(|| StoreError::not_found("token", token_digest))?;
        token.used_at = Some(at);
        Ok(())
    }
}

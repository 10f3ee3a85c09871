//! Document store traits, one per collection.

mod memory;
pub mod records;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::notary::Notarization;
use crate::process::{Actor, Process};

pub use memory::InMemoryStore;
pub use records::{
    Attachment, OneTimeToken, Organization, Role, Session, TokenKind, User, UserStatus,
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },
    #[error("{kind} already exists: {value}")]
    Duplicate { kind: &'static str, value: String },
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        StoreError::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn duplicate(kind: &'static str, value: impl Into<String>) -> Self {
        StoreError::Duplicate {
            kind,
            value: value.into(),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait ProcessStore: Send + Sync {
    async fn insert_process(&self, process: Process) -> StoreResult<()>;

    async fn get_process(&self, id: &str) -> StoreResult<Option<Process>>;

    /// Processes of one workflow, newest first; `org_id = None` lists all
    async fn list_processes(
        &self,
        workflow_key: &str,
        org_id: Option<&str>,
    ) -> StoreResult<Vec<Process>>;

    /// Set one substep done; returns the updated document
    async fn mark_step_done(
        &self,
        process_id: &str,
        substep_id: &str,
        actor: &Actor,
        at: DateTime<Utc>,
        data: Value,
    ) -> StoreResult<Process>;

    /// Flip status to done; returns false if it was already done
    async fn mark_process_done(&self, process_id: &str, at: DateTime<Utc>) -> StoreResult<bool>;
}

/// Append-only notarization log
#[async_trait]
pub trait NotarizationStore: Send + Sync {
    async fn append_notarization(&self, record: Notarization) -> StoreResult<()>;

    /// Records of one process in append order
    async fn list_notarizations(&self, process_id: &str) -> StoreResult<Vec<Notarization>>;
}

#[async_trait]
pub trait AttachmentStore: Send + Sync {
    async fn put_attachment(&self, meta: Attachment, bytes: Vec<u8>) -> StoreResult<()>;

    async fn get_attachment(&self, id: &str) -> StoreResult<Option<(Attachment, Vec<u8>)>>;

    async fn list_attachments(&self, process_id: &str) -> StoreResult<Vec<Attachment>>;

    /// Returns false if no such attachment existed
    async fn delete_attachment(&self, id: &str) -> StoreResult<bool>;
}

#[async_trait]
pub trait OrgStore: Send + Sync {
    /// Fails with `Duplicate` when the slug is taken
    async fn insert_org(&self, org: Organization) -> StoreResult<()>;

    async fn get_org(&self, id: &str) -> StoreResult<Option<Organization>>;

    async fn list_orgs(&self) -> StoreResult<Vec<Organization>>;
}

#[async_trait]
pub trait RoleStore: Send + Sync {
    /// Fails with `Duplicate` when the slug is taken within the org
    async fn insert_role(&self, role: Role) -> StoreResult<()>;

    async fn list_roles(&self, org_id: &str) -> StoreResult<Vec<Role>>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Fails with `Duplicate` when the email is taken
    async fn insert_user(&self, user: User) -> StoreResult<()>;

    async fn update_user(&self, user: User) -> StoreResult<()>;

    async fn get_user(&self, id: &str) -> StoreResult<Option<User>>;

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;

    async fn list_users(&self, org_id: Option<&str>) -> StoreResult<Vec<User>>;
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert_session(&self, session: Session) -> StoreResult<()>;

    async fn get_session(&self, token_digest: &str) -> StoreResult<Option<Session>>;

    async fn delete_session(&self, token_digest: &str) -> StoreResult<()>;

    /// Returns how many sessions were removed
    async fn delete_user_sessions(&self, user_id: &str) -> StoreResult<usize>;
}

#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn insert_token(&self, token: OneTimeToken) -> StoreResult<()>;

    async fn get_token(&self, token_digest: &str) -> StoreResult<Option<OneTimeToken>>;

    async fn mark_token_used(&self, token_digest: &str, at: DateTime<Utc>) -> StoreResult<()>;
}

/// Every collection in one backend
pub trait Store:
    ProcessStore
    + NotarizationStore
    + AttachmentStore
    + OrgStore
    + RoleStore
    + UserStore
    + SessionStore
    + TokenStore
    + Send
    + Sync
{
}

impl<T> Store for T where
    T: ProcessStore
        + NotarizationStore
        + AttachmentStore
        + OrgStore
        + RoleStore
        + UserStore
        + SessionStore
        + TokenStore
        + Send
        + Sync
{
}

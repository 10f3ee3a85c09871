//! Account and attachment documents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Organization {
    pub id: String,
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub workflow_keys: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Organization {
    pub fn new(name: &str, slug: &str, workflow_keys: Vec<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            slug: slug.to_string(),
            workflow_keys,
            created_at: Utc::now(),
        }
    }

    pub fn has_workflow(&self, key: &str) -> bool {
        self.workflow_keys.iter().any(|k| k == key)
    }
}

/// Role within an organization; the slug is matched against substep roles
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Role {
    pub id: String,
    pub org_id: String,
    pub slug: String,
    pub name: String,
}

impl Role {
    pub fn new(org_id: &str, slug: &str, name: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            org_id: org_id.to_string(),
            slug: slug.to_string(),
            name: name.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Active,
    Invited,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    /// `None` for platform admins
    #[serde(default)]
    pub org_id: Option<String>,
    pub email: String,
    pub display_name: String,
    /// PHC string; `None` until an invite is accepted
    #[serde(default, skip_serializing)]
    pub password_hash: Option<String>,
    #[serde(default)]
    pub role_slug: Option<String>,
    #[serde(default)]
    pub platform_admin: bool,
    #[serde(default)]
    pub org_admin: bool,
    pub status: UserStatus,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(org_id: Option<String>, email: &str, display_name: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            org_id,
            email: normalize_email(email),
            display_name: display_name.to_string(),
            password_hash: None,
            role_slug: None,
            platform_admin: false,
            org_admin: false,
            status: UserStatus::Invited,
            created_at: Utc::now(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == UserStatus::Active
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// SHA-256 hex of the cookie token
    pub token_digest: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Invite,
    Reset,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Invite => "invite",
            TokenKind::Reset => "reset",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OneTimeToken {
    pub token_digest: String,
    pub kind: TokenKind,
    pub user_id: String,
    pub expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
}

impl OneTimeToken {
    /// Unused and not expired
    pub fn is_redeemable(&self, now: DateTime<Utc>) -> bool {
        self.used_at.is_none() && now < self.expires_at
    }
}

/// Stored upload metadata; bytes are kept alongside
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub id: String,
    pub process_id: String,
    pub substep_id: String,
    pub filename: String,
    pub content_type: String,
    pub size: u64,
    pub sha256: String,
    pub uploaded_by: String,
    pub uploaded_at: DateTime<Utc>,
}

//! Organizations, users, sessions and one-time tokens.

pub mod actor;
pub mod password;

use chrono::{DateTime, Duration, Utc};
use once_cell::sync::Lazy;
use rand::RngCore;
use regex::Regex;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::{Config, SignupPolicy};
use crate::notary::sha256_hex;
use crate::process::Actor;
use crate::store::{
    OneTimeToken, OrgStore, Organization, Role, RoleStore, Session, SessionStore, Store,
    StoreError, TokenKind, TokenStore, User, UserStatus, UserStore,
};

pub use actor::{LegacyClaims, LEGACY_COOKIE, SESSION_COOKIE};
pub use password::PasswordError;

static SLUG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9](?:[a-z0-9-]{0,62}[a-z0-9])?$").expect("valid slug regex"));

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid email regex"));

pub fn is_valid_slug(slug: &str) -> bool {
    SLUG_RE.is_match(slug)
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email.trim())
}

#[derive(Debug, thiserror::Error)]
pub enum AccountError {
    #[error("Invalid email or password.")]
    InvalidCredentials,
    #[error("Enter a valid email address.")]
    InvalidEmail,
    #[error("Slugs may contain lowercase letters, digits and dashes only.")]
    InvalidSlug,
    #[error("{0} is required.")]
    MissingField(&'static str),
    #[error(transparent)]
    Password(#[from] PasswordError),
    #[error("A user with this email already exists.")]
    EmailTaken,
    #[error("This slug is already in use.")]
    SlugTaken,
    #[error("Unknown role '{0}'.")]
    UnknownRole(String),
    #[error("Organization not found.")]
    OrgNotFound,
    #[error("This link is invalid or has expired.")]
    InvalidToken,
    #[error("Signup is disabled.")]
    SignupDisabled,
    #[error("Storage error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for AccountError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate { kind: "user", .. } => AccountError::EmailTaken,
            StoreError::Duplicate { .. } => AccountError::SlugTaken,
            other => AccountError::Store(other),
        }
    }
}

impl AccountError {
    /// Validation problems the user can fix by editing the form
    pub fn is_validation(&self) -> bool {
        match self {
            AccountError::Store(_) | AccountError::SignupDisabled | AccountError::OrgNotFound => {
                false
            }
            AccountError::Password(e) => matches!(e, PasswordError::TooShort),
            _ => true,
        }
    }
}

/// A freshly issued session; `token` goes into the cookie
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub token: String,
    pub user: User,
    pub expires_at: DateTime<Utc>,
}

/// A freshly issued invite or reset link token
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub kind: TokenKind,
    pub user: User,
    pub expires_at: DateTime<Utc>,
}

impl IssuedToken {
    /// Relative link the token is redeemed at
    pub fn path(&self) -> String {
        format!("/{}/{}", self.kind.as_str(), self.token)
    }
}

/// New organization admin from the signup form
#[derive(Debug, Clone, Default)]
pub struct SignupForm {
    pub org_name: String,
    pub org_slug: String,
    pub email: String,
    pub display_name: String,
    pub password: String,
}

/// Random 32-byte token, hex encoded
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Actor for a signed-in user working in one workflow
pub fn actor_for(user: &User, workflow_key: &str) -> Actor {
    Actor {
        user_id: user.id.clone(),
        role: user.role_slug.clone().unwrap_or_default(),
        workflow_key: workflow_key.to_string(),
    }
}

pub struct AccountService {
    orgs: Arc<dyn OrgStore>,
    roles: Arc<dyn RoleStore>,
    users: Arc<dyn UserStore>,
    sessions: Arc<dyn SessionStore>,
    tokens: Arc<dyn TokenStore>,
    session_ttl: Duration,
    invite_ttl: Duration,
    reset_ttl: Duration,
    signup: SignupPolicy,
    default_workflow: String,
}

impl AccountService {
    pub fn new<S: Store + 'static>(store: Arc<S>, config: &Config) -> Self {
        Self {
            orgs: store.clone(),
            roles: store.clone(),
            users: store.clone(),
            sessions: store.clone(),
            tokens: store,
            session_ttl: Duration::hours(config.session.ttl_hours),
            invite_ttl: Duration::hours(config.auth.invite_ttl_hours),
            reset_ttl: Duration::minutes(config.auth.reset_ttl_minutes),
            signup: config.auth.signup,
            default_workflow: config.workflows.default_key.clone(),
        }
    }

    pub fn signup_open(&self) -> bool {
        self.signup == SignupPolicy::Open
    }

    async fn issue_session(&self, user: User) -> Result<IssuedSession, AccountError> {
        let token = generate_token();
        let now = Utc::now();
        let expires_at = now + self.session_ttl;
        self.sessions
            .insert_session(Session {
                token_digest: sha256_hex(token.as_bytes()),
                user_id: user.id.clone(),
                created_at: now,
                expires_at,
            })
            .await?;
        Ok(IssuedSession {
            token,
            user,
            expires_at,
        })
    }

    async fn issue_token(&self, user: User, kind: TokenKind) -> Result<IssuedToken, AccountError> {
        let token = generate_token();
        let ttl = match kind {
            TokenKind::Invite => self.invite_ttl,
            TokenKind::Reset => self.reset_ttl,
        };
        let expires_at = Utc::now() + ttl;
        self.tokens
            .insert_token(OneTimeToken {
                token_digest: sha256_hex(token.as_bytes()),
                kind,
                user_id: user.id.clone(),
                expires_at,
                used_at: None,
            })
            .await?;
        Ok(IssuedToken {
            token,
            kind,
            user,
            expires_at,
        })
    }

    /// Look up a redeemable token of the given kind and its user
    async fn redeemable(&self, token: &str, kind: TokenKind) -> Result<(OneTimeToken, User), AccountError> {
        let record = self
            .tokens
            .get_token(&sha256_hex(token.as_bytes()))
            .await?
            .filter(|t| t.kind == kind && t.is_redeemable(Utc::now()))
            .ok_or(AccountError::InvalidToken)?;
        let user = self
            .users
            .get_user(&record.user_id)
            .await?
            .ok_or(AccountError::InvalidToken)?;
        Ok((record, user))
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<IssuedSession, AccountError> {
        let user = self
            .users
            .find_user_by_email(email)
            .await?
            .filter(User::is_active)
            .ok_or(AccountError::InvalidCredentials)?;
        let verified = user
            .password_hash
            .as_deref()
            .is_some_and(|hash| password::verify_password(password, hash));
        if !verified {
            return Err(AccountError::InvalidCredentials);
        }
        info!(user_id = %user.id, "User signed in");
        self.issue_session(user).await
    }

    /// User behind a session cookie token; expired sessions are removed
    pub async fn session_user(&self, token: &str) -> Result<Option<User>, AccountError> {
        let digest = sha256_hex(token.as_bytes());
        let Some(session) = self.sessions.get_session(&digest).await? else {
            return Ok(None);
        };
        if session.is_expired(Utc::now()) {
            self.sessions.delete_session(&digest).await?;
            return Ok(None);
        }
        Ok(self
            .users
            .get_user(&session.user_id)
            .await?
            .filter(User::is_active))
    }

    pub async fn logout(&self, token: &str) -> Result<(), AccountError> {
        self.sessions
            .delete_session(&sha256_hex(token.as_bytes()))
            .await?;
        Ok(())
    }

    pub async fn create_org(
        &self,
        name: &str,
        slug: &str,
        workflow_keys: Vec<String>,
    ) -> Result<Organization, AccountError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AccountError::MissingField("Name"));
        }
        let slug = slug.trim();
        if !is_valid_slug(slug) {
            return Err(AccountError::InvalidSlug);
        }
        let workflow_keys = if workflow_keys.is_empty() {
            vec![self.default_workflow.clone()]
        } else {
            workflow_keys
        };
        let org = Organization::new(name, slug, workflow_keys);
        self.orgs.insert_org(org.clone()).await?;
        info!(org_id = %org.id, slug = %org.slug, "Organization created");
        Ok(org)
    }

    pub async fn create_role(&self, org_id: &str, slug: &str, name: &str) -> Result<Role, AccountError> {
        let slug = slug.trim();
        if !is_valid_slug(slug) {
            return Err(AccountError::InvalidSlug);
        }
        let name = match name.trim() {
            "" => slug,
            name => name,
        };
        let role = Role::new(org_id, slug, name);
        self.roles.insert_role(role.clone()).await?;
        Ok(role)
    }

    pub async fn list_roles(&self, org_id: &str) -> Result<Vec<Role>, AccountError> {
        Ok(self.roles.list_roles(org_id).await?)
    }

    pub async fn list_users(&self, org_id: &str) -> Result<Vec<User>, AccountError> {
        Ok(self.users.list_users(Some(org_id)).await?)
    }

    pub async fn list_orgs(&self) -> Result<Vec<Organization>, AccountError> {
        Ok(self.orgs.list_orgs().await?)
    }

    pub async fn get_org(&self, org_id: &str) -> Result<Option<Organization>, AccountError> {
        Ok(self.orgs.get_org(org_id).await?)
    }

    /// Create an invited user in an organization and issue their invite link
    pub async fn invite_user(
        &self,
        org_id: &str,
        email: &str,
        display_name: &str,
        role_slug: &str,
        org_admin: bool,
    ) -> Result<IssuedToken, AccountError> {
        if !is_valid_email(email) {
            return Err(AccountError::InvalidEmail);
        }
        let role_slug = role_slug.trim();
        let roles = self.roles.list_roles(org_id).await?;
        if !roles.iter().any(|r| r.slug == role_slug) {
            return Err(AccountError::UnknownRole(role_slug.to_string()));
        }

        let mut user = User::new(Some(org_id.to_string()), email, display_name.trim());
        if user.display_name.is_empty() {
            user.display_name = user.email.clone();
        }
        user.role_slug = Some(role_slug.to_string());
        user.org_admin = org_admin;
        self.users.insert_user(user.clone()).await?;

        let issued = self.issue_token(user, TokenKind::Invite).await?;
        info!(user_id = %issued.user.id, link = %issued.path(), "Invite issued");
        Ok(issued)
    }

    /// Set the password of an invited user, activate them and sign them in
    pub async fn accept_invite(&self, token: &str, password: &str) -> Result<IssuedSession, AccountError> {
        let (record, mut user) = self.redeemable(token, TokenKind::Invite).await?;
        user.password_hash = Some(password::hash_password(password)?);
        user.status = UserStatus::Active;
        self.users.update_user(user.clone()).await?;
        self.tokens
            .mark_token_used(&record.token_digest, Utc::now())
            .await?;
        info!(user_id = %user.id, "Invite accepted");
        self.issue_session(user).await
    }

    /// Reset link for an active user; `None` for unknown emails
    pub async fn request_reset(&self, email: &str) -> Result<Option<IssuedToken>, AccountError> {
        let Some(user) = self
            .users
            .find_user_by_email(email)
            .await?
            .filter(User::is_active)
        else {
            return Ok(None);
        };
        let issued = self.issue_token(user, TokenKind::Reset).await?;
        info!(user_id = %issued.user.id, link = %issued.path(), "Password reset issued");
        Ok(Some(issued))
    }

    /// Whether a token is currently redeemable, for rendering the form
    pub async fn token_is_valid(&self, token: &str, kind: TokenKind) -> Result<bool, AccountError> {
        match self.redeemable(token, kind).await {
            Ok(_) => Ok(true),
            Err(AccountError::InvalidToken) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Set a new password and revoke every session of the user
    pub async fn complete_reset(&self, token: &str, password: &str) -> Result<User, AccountError> {
        let (record, mut user) = self.redeemable(token, TokenKind::Reset).await?;
        user.password_hash = Some(password::hash_password(password)?);
        self.users.update_user(user.clone()).await?;
        self.tokens
            .mark_token_used(&record.token_digest, Utc::now())
            .await?;
        let revoked = self.sessions.delete_user_sessions(&user.id).await?;
        info!(user_id = %user.id, revoked, "Password reset completed");
        Ok(user)
    }

    /// Create an organization with the submitter as its org admin
    pub async fn signup(&self, form: SignupForm) -> Result<IssuedSession, AccountError> {
        if !self.signup_open() {
            return Err(AccountError::SignupDisabled);
        }
        if !is_valid_email(&form.email) {
            return Err(AccountError::InvalidEmail);
        }
        password::check_strength(&form.password)?;
        if self.users.find_user_by_email(&form.email).await?.is_some() {
            return Err(AccountError::EmailTaken);
        }

        let org = self
            .create_org(&form.org_name, &form.org_slug, Vec::new())
            .await?;
        let mut user = User::new(Some(org.id.clone()), &form.email, form.display_name.trim());
        if user.display_name.is_empty() {
            user.display_name = user.email.clone();
        }
        user.password_hash = Some(password::hash_password(&form.password)?);
        user.org_admin = true;
        user.status = UserStatus::Active;
        self.users.insert_user(user.clone()).await?;
        info!(org_id = %org.id, user_id = %user.id, "Signup completed");
        self.issue_session(user).await
    }

    /// Create the configured platform admin if no user has that email
    pub async fn ensure_bootstrap_admin(&self, email: &str, password: &str) -> Result<bool, AccountError> {
        if self.users.find_user_by_email(email).await?.is_some() {
            return Ok(false);
        }
        if !is_valid_email(email) {
            warn!("Bootstrap admin email is not a valid address");
            return Err(AccountError::InvalidEmail);
        }
        let mut user = User::new(None, email, "Platform admin");
        user.password_hash = Some(password::hash_password(password)?);
        user.platform_admin = true;
        user.status = UserStatus::Active;
        self.users.insert_user(user.clone()).await?;
        info!(user_id = %user.id, "Bootstrap platform admin created");
        Ok(true)
    }
}

//! Request identity: session cookie first, then the legacy cookie.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderValue},
};
use std::convert::Infallible;
use tracing::warn;

use super::error::WebError;
use super::state::AppState;
use crate::accounts::actor::{cookie_value, legacy_claims};
use crate::accounts::{actor_for, LegacyClaims, SESSION_COOKIE};
use crate::process::{Actor, Process};
use crate::store::{Organization, User};

/// Whoever is making the request
#[derive(Debug, Clone)]
pub enum Viewer {
    User(User),
    Legacy(LegacyClaims),
}

impl Viewer {
    /// Actor used for completions inside `workflow_key`
    pub fn actor(&self, workflow_key: &str) -> Actor {
        match self {
            Viewer::User(user) => actor_for(user, workflow_key),
            Viewer::Legacy(claims) => claims.clone().into(),
        }
    }

    pub fn user_id(&self) -> &str {
        match self {
            Viewer::User(user) => &user.id,
            Viewer::Legacy(claims) => &claims.user_id,
        }
    }

    pub fn display_name(&self) -> &str {
        match self {
            Viewer::User(user) => &user.display_name,
            Viewer::Legacy(claims) => &claims.user_id,
        }
    }

    /// Role slug; empty for users without a role
    pub fn role(&self) -> &str {
        match self {
            Viewer::User(user) => user.role_slug.as_deref().unwrap_or(""),
            Viewer::Legacy(claims) => &claims.role,
        }
    }

    pub fn org_id(&self) -> Option<&str> {
        match self {
            Viewer::User(user) => user.org_id.as_deref(),
            Viewer::Legacy(_) => None,
        }
    }

    pub fn is_platform_admin(&self) -> bool {
        matches!(self, Viewer::User(user) if user.platform_admin)
    }

    pub fn is_org_admin(&self) -> bool {
        matches!(self, Viewer::User(user) if user.org_admin && user.org_id.is_some())
    }

    /// Whether the viewer may work in a workflow, given their organization
    pub fn can_use_workflow(&self, workflow_key: &str, org: Option<&Organization>) -> bool {
        match self {
            Viewer::Legacy(claims) => claims.workflow_key == workflow_key,
            Viewer::User(user) if user.platform_admin => true,
            Viewer::User(_) => org.is_some_and(|org| org.has_workflow(workflow_key)),
        }
    }

    /// Whether the viewer may see a process
    pub fn can_see_process(&self, process: &Process) -> bool {
        match self {
            Viewer::Legacy(claims) => claims.workflow_key == process.workflow_key,
            Viewer::User(user) if user.platform_admin => true,
            Viewer::User(user) => user.org_id.is_some() && user.org_id == process.org_id,
        }
    }
}

/// Session token carried by the request, if any
pub fn session_token(parts: &Parts) -> Option<String> {
    let cookies = parts.headers.get(header::COOKIE)?.to_str().ok()?;
    cookie_value(cookies, SESSION_COOKIE)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
}

async fn resolve(parts: &Parts, state: &AppState) -> Option<Viewer> {
    if let Some(token) = session_token(parts) {
        match state.accounts.session_user(&token).await {
            Ok(Some(user)) => return Some(Viewer::User(user)),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Session lookup failed"),
        }
    }

    if !state.config.auth.legacy_cookie {
        return None;
    }
    let cookies = parts.headers.get(header::COOKIE)?.to_str().ok()?;
    legacy_claims(cookies).map(Viewer::Legacy)
}

/// Optional identity; never rejects
pub struct MaybeViewer(pub Option<Viewer>);

#[async_trait]
impl FromRequestParts<AppState> for MaybeViewer {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        Ok(MaybeViewer(resolve(parts, state).await))
    }
}

/// Identity required; anonymous page requests are sent to the login page
pub struct RequireViewer(pub Viewer);

#[async_trait]
impl FromRequestParts<AppState> for RequireViewer {
    type Rejection = WebError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        resolve(parts, state)
            .await
            .map(RequireViewer)
            .ok_or(WebError::LoginRequired)
    }
}

/// `Set-Cookie` value for a new session
pub fn session_cookie(token: &str, max_age_secs: i64, secure: bool) -> HeaderValue {
    let mut cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        SESSION_COOKIE, token, max_age_secs
    );
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie).unwrap_or_else(|_| clear_session_cookie())
}

/// `Set-Cookie` value removing the session cookie
pub fn clear_session_cookie() -> HeaderValue {
    HeaderValue::from_static("attesta_session=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::ProcessStatus;
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn legacy(role: &str, wk: &str) -> Viewer {
        Viewer::Legacy(LegacyClaims {
            user_id: "u1".to_string(),
            role: role.to_string(),
            workflow_key: wk.to_string(),
        })
    }

    fn process(org_id: Option<&str>) -> Process {
        Process {
            id: "p1".to_string(),
            workflow_key: "demo".to_string(),
            org_id: org_id.map(str::to_string),
            created_by: "u0".to_string(),
            created_at: Utc::now(),
            status: ProcessStatus::Active,
            completed_at: None,
            progress: BTreeMap::new(),
        }
    }

    #[test]
    fn test_legacy_access_follows_workflow_key() {
        let viewer = legacy("dep1", "demo");
        assert!(viewer.can_use_workflow("demo", None));
        assert!(!viewer.can_use_workflow("other", None));
        assert!(viewer.can_see_process(&process(Some("org-a"))));
        assert_eq!(viewer.actor("ignored").workflow_key, "demo");
    }

    #[test]
    fn test_user_access_is_org_scoped() {
        let org = Organization::new("Acme", "acme", vec!["demo".to_string()]);
        let mut user = User::new(Some(org.id.clone()), "a@acme.io", "A");
        user.role_slug = Some("dep2".to_string());
        let viewer = Viewer::User(user.clone());

        assert!(viewer.can_use_workflow("demo", Some(&org)));
        assert!(!viewer.can_use_workflow("other", Some(&org)));
        assert!(viewer.can_see_process(&process(Some(&org.id))));
        assert!(!viewer.can_see_process(&process(Some("elsewhere"))));
        assert!(!viewer.can_see_process(&process(None)));
        assert_eq!(viewer.actor("demo").role, "dep2");

        user.platform_admin = true;
        let admin = Viewer::User(user);
        assert!(admin.can_see_process(&process(Some("elsewhere"))));
        assert!(admin.can_use_workflow("other", None));
    }

    #[test]
    fn test_session_cookie_flags() {
        let cookie = session_cookie("abc", 3600, true);
        let cookie = cookie.to_str().unwrap();
        assert!(cookie.starts_with("attesta_session=abc;"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Lax"));
        assert!(cookie.ends_with("; Secure"));
        assert!(!session_cookie("abc", 3600, false).to_str().unwrap().contains("Secure"));
    }
}

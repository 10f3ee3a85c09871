//! Platform and organization administration pages.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    Form,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use super::{html, viewer_org};
use crate::accounts::AccountError;
use crate::authz::sync_teams;
use crate::store::{Organization, Role, User};
use crate::web::error::WebError;
use crate::web::session::{RequireViewer, Viewer};
use crate::web::state::AppState;
use crate::web::views::Page;

fn require_platform_admin(viewer: &Viewer) -> Result<(), WebError> {
    if viewer.is_platform_admin() {
        Ok(())
    } else {
        Err(WebError::Forbidden("Platform administrators only.".to_string()))
    }
}

/// Organization administered by the viewer
async fn administered_org(state: &AppState, viewer: &Viewer) -> Result<Organization, WebError> {
    if !viewer.is_org_admin() {
        return Err(WebError::Forbidden("Organization administrators only.".to_string()));
    }
    viewer_org(state, viewer)
        .await?
        .ok_or_else(|| WebError::not_found("Organization"))
}

// =============================================================================
// Platform admin
// =============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OrgsView {
    orgs: Vec<Organization>,
    workflows: Vec<String>,
    identity_enabled: bool,
    error: Option<String>,
}

async fn orgs_page(
    state: &AppState,
    viewer: &Viewer,
    status: StatusCode,
    error: Option<String>,
) -> Result<Response, WebError> {
    let view = OrgsView {
        orgs: state.accounts.list_orgs().await?,
        workflows: state.registry.keys(),
        identity_enabled: state.config.identity.is_enabled(),
        error,
    };
    html(status, "admin_orgs", &Page::new("Organizations", Some(viewer), view))
}

pub async fn list_orgs(
    State(state): State<AppState>,
    RequireViewer(viewer): RequireViewer,
) -> Result<Response, WebError> {
    require_platform_admin(&viewer)?;
    orgs_page(&state, &viewer, StatusCode::OK, None).await
}

/// `name`, `slug` and repeated `workflows` fields
pub async fn create_org(
    State(state): State<AppState>,
    RequireViewer(viewer): RequireViewer,
    Form(fields): Form<Vec<(String, String)>>,
) -> Result<Response, WebError> {
    require_platform_admin(&viewer)?;

    let field = |name: &str| {
        fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.clone())
            .unwrap_or_default()
    };
    let workflows: Vec<String> = fields
        .iter()
        .filter(|(k, v)| k == "workflows" && !v.is_empty())
        .map(|(_, v)| v.clone())
        .collect();
    if let Some(unknown) = workflows.iter().find(|k| !state.registry.contains(k)) {
        let message = format!("Unknown workflow '{}'.", unknown);
        return orgs_page(&state, &viewer, StatusCode::BAD_REQUEST, Some(message)).await;
    }

    match state
        .accounts
        .create_org(&field("name"), &field("slug"), workflows)
        .await
    {
        Ok(_) => Ok(Redirect::to("/admin/orgs").into_response()),
        Err(e) if e.is_validation() => {
            orgs_page(&state, &viewer, StatusCode::BAD_REQUEST, Some(e.to_string())).await
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn sync(
    State(state): State<AppState>,
    RequireViewer(viewer): RequireViewer,
) -> Result<Response, WebError> {
    require_platform_admin(&viewer)?;
    let report = sync_teams(&state.config.identity, &state.registry, state.store.as_ref()).await?;
    info!(user_id = %viewer.user_id(), created = report.total_created(), "Team sync triggered from admin page");
    let message = format!("{} new records created.", report.total_created());

    html(
        StatusCode::OK,
        "notice",
        &Page::new(
            "Team sync",
            Some(&viewer),
            json!({
                "heading": "Identity service synchronized",
                "message": message,
                "report": report,
                "back": "/admin/orgs",
            }),
        ),
    )
}

// =============================================================================
// Organization admin
// =============================================================================

#[derive(Serialize)]
struct RolesView {
    org: Organization,
    roles: Vec<Role>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RoleForm {
    pub slug: String,
    #[serde(default)]
    pub name: String,
}

async fn roles_page(
    state: &AppState,
    viewer: &Viewer,
    org: Organization,
    status: StatusCode,
    error: Option<String>,
) -> Result<Response, WebError> {
    let roles = state.accounts.list_roles(&org.id).await?;
    let title = format!("Roles of {}", org.name);
    html(
        status,
        "org_roles",
        &Page::new(title, Some(viewer), RolesView { org, roles, error }),
    )
}

pub async fn list_roles(
    State(state): State<AppState>,
    RequireViewer(viewer): RequireViewer,
) -> Result<Response, WebError> {
    let org = administered_org(&state, &viewer).await?;
    roles_page(&state, &viewer, org, StatusCode::OK, None).await
}

pub async fn create_role(
    State(state): State<AppState>,
    RequireViewer(viewer): RequireViewer,
    Form(form): Form<RoleForm>,
) -> Result<Response, WebError> {
    let org = administered_org(&state, &viewer).await?;
    match state.accounts.create_role(&org.id, &form.slug, &form.name).await {
        Ok(_) => Ok(Redirect::to("/org-admin/roles").into_response()),
        Err(e) if e.is_validation() => {
            roles_page(&state, &viewer, org, StatusCode::BAD_REQUEST, Some(e.to_string())).await
        }
        Err(e) => Err(e.into()),
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UsersView {
    org: Organization,
    users: Vec<User>,
    roles: Vec<Role>,
    invite_link: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InviteForm {
    pub email: String,
    #[serde(default)]
    pub display_name: String,
    pub role: String,
    #[serde(default)]
    pub org_admin: Option<String>,
}

async fn users_page(
    state: &AppState,
    viewer: &Viewer,
    org: Organization,
    status: StatusCode,
    invite_link: Option<String>,
    error: Option<String>,
) -> Result<Response, WebError> {
    let users = state.accounts.list_users(&org.id).await?;
    let roles = state.accounts.list_roles(&org.id).await?;
    let title = format!("Users of {}", org.name);
    let view = UsersView {
        org,
        users,
        roles,
        invite_link,
        error,
    };
    html(status, "org_users", &Page::new(title, Some(viewer), view))
}

pub async fn list_users(
    State(state): State<AppState>,
    RequireViewer(viewer): RequireViewer,
) -> Result<Response, WebError> {
    let org = administered_org(&state, &viewer).await?;
    users_page(&state, &viewer, org, StatusCode::OK, None, None).await
}

/// Invite a user; the link is shown to the admin instead of being mailed
pub async fn invite_user(
    State(state): State<AppState>,
    RequireViewer(viewer): RequireViewer,
    Form(form): Form<InviteForm>,
) -> Result<Response, WebError> {
    let org = administered_org(&state, &viewer).await?;
    let org_admin = form.org_admin.as_deref().is_some_and(|v| v == "true" || v == "on");
    match state
        .accounts
        .invite_user(&org.id, &form.email, &form.display_name, &form.role, org_admin)
        .await
    {
        Ok(issued) => {
            let link = state.config.public_link(&issued.path());
            users_page(&state, &viewer, org, StatusCode::CREATED, Some(link), None).await
        }
        Err(e @ (AccountError::EmailTaken | AccountError::InvalidEmail | AccountError::UnknownRole(_))) => {
            users_page(&state, &viewer, org, StatusCode::BAD_REQUEST, None, Some(e.to_string())).await
        }
        Err(e) => Err(e.into()),
    }
}

//! Route handlers for pages and the JSON API.

pub mod admin;
pub mod api;
pub mod auth;
pub mod dashboard;
pub mod events;
pub mod files;
pub mod health;
pub mod legacy;
pub mod process;

use axum::{
    http::{HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
};
use serde::Serialize;
use std::sync::Arc;

use super::error::WebError;
use super::render;
use super::session::Viewer;
use super::state::AppState;
use crate::process::Process;
use crate::store::Organization;
use crate::workflow::WorkflowDef;

/// True for requests issued by HTMX
pub fn is_htmx(headers: &HeaderMap) -> bool {
    headers
        .get("HX-Request")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("true"))
}

/// Render a template with a status code
pub fn html<T: Serialize>(status: StatusCode, template: &str, data: &T) -> Result<Response, WebError> {
    let body = render::pages().render(template, data)?;
    Ok((status, Html(body)).into_response())
}

/// Organization of a signed-in user
pub async fn viewer_org(state: &AppState, viewer: &Viewer) -> Result<Option<Organization>, WebError> {
    match viewer.org_id() {
        Some(org_id) => Ok(state.store.get_org(org_id).await?),
        None => Ok(None),
    }
}

/// Resolve a workflow key the viewer is allowed to work in
pub async fn workflow_for(state: &AppState, viewer: &Viewer, key: &str) -> Result<Arc<WorkflowDef>, WebError> {
    let def = state
        .registry
        .get(key)
        .ok_or_else(|| WebError::not_found("Workflow"))?;
    let org = viewer_org(state, viewer).await?;
    if !viewer.can_use_workflow(key, org.as_ref()) {
        return Err(WebError::Forbidden(
            "You do not have access to this workflow.".to_string(),
        ));
    }
    Ok(def)
}

/// Load a process of `def` visible to the viewer
///
/// Processes of other organizations are reported as missing.
pub async fn process_for(state: &AppState, viewer: &Viewer, def: &WorkflowDef, id: &str) -> Result<Process, WebError> {
    state
        .store
        .get_process(id)
        .await?
        .filter(|p| p.workflow_key == def.key && viewer.can_see_process(p))
        .ok_or_else(|| WebError::not_found("Process"))
}

/// Organization filter for process listings; `None` lists every organization
pub fn org_filter(viewer: &Viewer) -> Option<&str> {
    match viewer {
        Viewer::User(user) if !user.platform_admin => Some(user.org_id.as_deref().unwrap_or("")),
        _ => None,
    }
}

//! Workflow dashboard and process creation.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{Redirect, Response},
};
use tracing::info;

use super::{html, org_filter, viewer_org, workflow_for};
use crate::events::{ChannelKey, LiveEvent};
use crate::process::{next_available, Process};
use crate::web::error::WebError;
use crate::web::session::{RequireViewer, Viewer};
use crate::web::state::AppState;
use crate::web::views::{process_href, DashboardView, Page};

/// `GET /` sends everyone to the default workflow
pub async fn root(State(state): State<AppState>) -> Redirect {
    Redirect::to(&format!("/w/{}/", state.default_workflow()))
}

/// Workflows the viewer can switch between
async fn switchable_workflows(state: &AppState, viewer: &Viewer) -> Result<Vec<String>, WebError> {
    Ok(match viewer {
        Viewer::Legacy(claims) => vec![claims.workflow_key.clone()],
        Viewer::User(user) if user.platform_admin => state.registry.keys(),
        Viewer::User(_) => viewer_org(state, viewer)
            .await?
            .map(|org| {
                org.workflow_keys
                    .into_iter()
                    .filter(|k| state.registry.contains(k))
                    .collect()
            })
            .unwrap_or_default(),
    })
}

pub async fn dashboard(
    State(state): State<AppState>,
    Path(key): Path<String>,
    RequireViewer(viewer): RequireViewer,
) -> Result<Response, WebError> {
    let def = workflow_for(&state, &viewer, &key).await?;
    let processes = state
        .store
        .list_processes(&def.key, org_filter(&viewer))
        .await?;
    let workflows = switchable_workflows(&state, &viewer).await?;

    let view = DashboardView::build(&def, processes, viewer.role(), workflows);
    html(
        StatusCode::OK,
        "dashboard",
        &Page::new(def.title.clone(), Some(&viewer), view),
    )
}

pub async fn start_process(
    State(state): State<AppState>,
    Path(key): Path<String>,
    RequireViewer(viewer): RequireViewer,
) -> Result<Redirect, WebError> {
    let def = workflow_for(&state, &viewer, &key).await?;
    let process = Process::start(&def, viewer.org_id().map(str::to_string), viewer.user_id());
    let id = process.id.clone();
    let first_role = next_available(&def, &process).map(|s| s.role.clone());
    state.store.insert_process(process).await?;
    info!(process_id = %id, workflow = %def.key, user_id = %viewer.user_id(), "Process started");

    if let Some(role) = first_role {
        state.broadcaster.broadcast(
            &ChannelKey::role(&def.key, role),
            LiveEvent::RoleUpdated {
                process_id: id.clone(),
            },
        );
    }
    Ok(Redirect::to(&process_href(&def.key, &id)))
}

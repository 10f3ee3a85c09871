//! Unscoped paths from before workflows were keyed; all land in the default workflow.

use axum::{
    extract::{Path, RawQuery, State},
    response::Redirect,
};

use crate::web::state::AppState;

fn scoped(state: &AppState, rest: &str, query: Option<String>) -> String {
    let mut target = format!("/w/{}{}", state.default_workflow(), rest);
    if let Some(query) = query.filter(|q| !q.is_empty()) {
        target.push('?');
        target.push_str(&query);
    }
    target
}

pub async fn process(State(state): State<AppState>, Path(id): Path<String>) -> Redirect {
    Redirect::permanent(&scoped(&state, &format!("/process/{}", id), None))
}

/// 308 keeps the method and body of the original post
pub async fn start_process(State(state): State<AppState>) -> Redirect {
    Redirect::permanent(&scoped(&state, "/process/start", None))
}

pub async fn complete(
    State(state): State<AppState>,
    Path((id, substep_id)): Path<(String, String)>,
) -> Redirect {
    Redirect::permanent(&scoped(
        &state,
        &format!("/process/{}/substep/{}/complete", id, substep_id),
        None,
    ))
}

pub async fn events(State(state): State<AppState>, RawQuery(query): RawQuery) -> Redirect {
    Redirect::permanent(&scoped(&state, "/events", query))
}

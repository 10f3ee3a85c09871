//! Server-sent live update stream

use axum::{
    extract::{Path, Query, State},
    response::sse::{Event, KeepAlive, Sse},
};
use serde::Deserialize;
use std::convert::Infallible;
use std::time::Duration;
use tokio_stream::{Stream, StreamExt};
use tracing::debug;

use super::{process_for, workflow_for};
use crate::events::ChannelKey;
use crate::web::error::WebError;
use crate::web::session::RequireViewer;
use crate::web::state::AppState;

pub const KEEP_ALIVE_SECS: u64 = 15;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventsQuery {
    pub process_id: Option<String>,
    pub role: Option<String>,
}

/// Subscribe to a process or role channel of one workflow
pub async fn stream(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<EventsQuery>,
    RequireViewer(viewer): RequireViewer,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, WebError> {
    let def = workflow_for(&state, &viewer, &key).await?;

    let process_id = query.process_id.filter(|id| !id.is_empty());
    let role = query.role.filter(|role| !role.is_empty());
    let channel = match (process_id, role) {
        (Some(id), _) => {
            let process = process_for(&state, &viewer, &def, &id).await?;
            ChannelKey::process(process.id)
        }
        (None, Some(role)) => {
            let admin = viewer.is_platform_admin() || viewer.is_org_admin();
            if role != viewer.role() && !admin {
                return Err(WebError::Forbidden(
                    "You may only follow your own role.".to_string(),
                ));
            }
            ChannelKey::role(&def.key, role)
        }
        (None, None) => {
            return Err(WebError::BadRequest(
                "processId or role is required.".to_string(),
            ))
        }
    };

    debug!(channel = %channel, user_id = %viewer.user_id(), "Live update stream opened");
    let events = state
        .broadcaster
        .subscribe(channel)
        .map(|event| Ok::<_, Infallible>(Event::default().event(event.name()).data(event.process_id())));

    Ok(Sse::new(events).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(KEEP_ALIVE_SECS))
            .text("keep-alive"),
    ))
}

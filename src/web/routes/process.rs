//! Process page and substep completion.

use axum::{
    extract::{
        multipart::{Field, Multipart, MultipartError},
        FromRequest, Path, Request, State,
    },
    http::{header, HeaderMap, StatusCode},
    response::Response,
    Form,
};
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, warn};

use super::{html, is_htmx, process_for, workflow_for};
use crate::process::{CompletionRequest, Process, Submission, UploadedFile};
use crate::web::error::WebError;
use crate::web::session::{MaybeViewer, RequireViewer, Viewer};
use crate::web::state::AppState;
use crate::web::views::{Flash, Page, ProcessView};
use crate::workflow::WorkflowDef;

#[derive(Serialize)]
struct ProcessPage {
    process: ProcessView,
}

/// Full page, or only the process body for HTMX requests
fn render_process(
    status: StatusCode,
    headers: &HeaderMap,
    viewer: &Viewer,
    def: &WorkflowDef,
    process: &Process,
    message: Option<Flash>,
) -> Result<Response, WebError> {
    let view = ProcessView::build(def, process, viewer.role()).with_message(message);
    let page = ProcessPage { process: view };
    if is_htmx(headers) {
        html(status, "process_partial", &page)
    } else {
        let title = format!("{} · {}", def.title, page.process.short_id);
        html(status, "process", &Page::new(title, Some(viewer), page))
    }
}

pub async fn show(
    State(state): State<AppState>,
    Path((key, id)): Path<(String, String)>,
    headers: HeaderMap,
    RequireViewer(viewer): RequireViewer,
) -> Result<Response, WebError> {
    let def = workflow_for(&state, &viewer, &key).await?;
    let process = process_for(&state, &viewer, &def, &id).await?;
    render_process(StatusCode::OK, &headers, &viewer, &def, &process, None)
}

fn multipart_error(err: MultipartError, max_bytes: usize) -> WebError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        WebError::PayloadTooLarge(format!(
            "File exceeds the maximum size of {} bytes.",
            max_bytes
        ))
    } else {
        WebError::BadRequest(format!("Malformed upload: {}", err.body_text()))
    }
}

/// Buffer a file part, keeping at most one byte past the limit
///
/// An oversized part is kept truncated so payload validation reports it
/// after the sequence and policy checks; the rest of it is skipped.
async fn read_file_part(mut field: Field<'_>, max_bytes: usize) -> Result<Vec<u8>, MultipartError> {
    let cap = max_bytes.saturating_add(1);
    let mut bytes = Vec::new();
    while let Some(chunk) = field.chunk().await? {
        let room = cap - bytes.len();
        bytes.extend_from_slice(&chunk[..chunk.len().min(room)]);
        if bytes.len() == cap {
            break;
        }
    }
    Ok(bytes)
}

/// Read an urlencoded or multipart body into a submission
async fn read_submission(state: &AppState, request: Request) -> Result<Submission, WebError> {
    let max_bytes = state.completion.max_upload_bytes();
    let is_multipart = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("multipart/form-data"));

    if !is_multipart {
        let Form(values) = Form::<HashMap<String, String>>::from_request(request, state)
            .await
            .map_err(|e| WebError::BadRequest(e.body_text()))?;
        return Ok(Submission {
            values,
            ..Submission::default()
        });
    }

    let mut multipart = Multipart::from_request(request, state)
        .await
        .map_err(|e| WebError::BadRequest(e.body_text()))?;
    let mut submission = Submission::default();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, max_bytes))?
    {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        match field.file_name().map(str::to_string) {
            Some(filename) => {
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = read_file_part(field, max_bytes)
                    .await
                    .map_err(|e| multipart_error(e, max_bytes))?;
                // Browsers send an empty part when no file was chosen
                if filename.is_empty() && bytes.is_empty() {
                    continue;
                }
                submission.files.insert(
                    name,
                    UploadedFile {
                        filename,
                        content_type,
                        bytes,
                    },
                );
            }
            None => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| multipart_error(e, max_bytes))?;
                submission.values.insert(name, text);
            }
        }
    }
    Ok(submission)
}

pub async fn complete(
    State(state): State<AppState>,
    Path((key, id, substep_id)): Path<(String, String, String)>,
    MaybeViewer(viewer): MaybeViewer,
    request: Request,
) -> Result<Response, WebError> {
    let viewer = viewer.ok_or_else(|| {
        WebError::Unauthorized("Please sign in to complete steps.".to_string())
    })?;
    let headers = request.headers().clone();
    let def = workflow_for(&state, &viewer, &key).await?;
    let process = process_for(&state, &viewer, &def, &id).await?;

    let actor = viewer.actor(&def.key);
    let result = async {
        // Gates first, so a locked or forbidden step never reads the upload
        state.completion.admit(&actor, &process.id, &substep_id).await?;
        let submission = read_submission(&state, request).await?;
        let outcome = state
            .completion
            .complete(CompletionRequest {
                actor: actor.clone(),
                process_id: process.id.clone(),
                substep_id: substep_id.clone(),
                submission,
            })
            .await?;
        Ok::<_, WebError>(outcome)
    }
    .await;

    match result {
        Ok(outcome) => {
            let message = if outcome.process_completed {
                "Step completed. The process is now complete."
            } else {
                "Step completed."
            };
            render_process(
                StatusCode::OK,
                &headers,
                &viewer,
                &def,
                &outcome.process,
                Some(Flash::info(message)),
            )
        }
        Err(err) => {
            debug!(process_id = %process.id, substep_id = %substep_id, status = %err.status(), "Completion rejected");
            // Show the current state of the process alongside the error
            let current = match process_for(&state, &viewer, &def, &id).await {
                Ok(current) => current,
                Err(reload) => {
                    warn!(process_id = %process.id, error = %reload.message(), "Reload after failed completion failed");
                    return Err(err);
                }
            };
            render_process(
                err.status(),
                &headers,
                &viewer,
                &def,
                &current,
                Some(Flash::error(err.message())),
            )
        }
    }
}

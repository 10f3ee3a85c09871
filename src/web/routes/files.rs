//! Attachment downloads and process exports.

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::io::{Cursor, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::{process_for, workflow_for};
use crate::notary::Notarization;
use crate::process::payload::attachment_refs;
use crate::process::Process;
use crate::store::Attachment;
use crate::web::error::WebError;
use crate::web::session::RequireViewer;
use crate::web::state::AppState;

#[derive(Debug, Deserialize)]
pub struct FileQuery {
    pub attachment: Option<String>,
}

/// Quote-safe `Content-Disposition` value
fn disposition(filename: &str) -> HeaderValue {
    let safe: String = filename
        .chars()
        .map(|c| if c == '"' || c == '\\' || c.is_control() || !c.is_ascii() { '_' } else { c })
        .collect();
    HeaderValue::from_str(&format!("attachment; filename=\"{}\"", safe))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}

fn content_type(value: &str) -> HeaderValue {
    HeaderValue::from_str(value).unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"))
}

/// Stream one attachment of a completed substep
pub async fn download(
    State(state): State<AppState>,
    Path((key, id, substep_id)): Path<(String, String, String)>,
    Query(query): Query<FileQuery>,
    RequireViewer(viewer): RequireViewer,
) -> Result<Response, WebError> {
    let def = workflow_for(&state, &viewer, &key).await?;
    let process = process_for(&state, &viewer, &def, &id).await?;

    let refs = process
        .step(&substep_id)
        .filter(|s| s.is_done())
        .and_then(|s| s.data.as_ref())
        .map(attachment_refs)
        .unwrap_or_default();
    let selected = match &query.attachment {
        Some(wanted) => refs.iter().find(|r| &r.attachment_id == wanted),
        None => refs.first(),
    }
    .ok_or_else(|| WebError::not_found("File"))?;

    let (meta, bytes) = state
        .store
        .get_attachment(&selected.attachment_id)
        .await?
        .filter(|(meta, _)| meta.process_id == process.id)
        .ok_or_else(|| WebError::not_found("File"))?;

    Ok((
        [
            (header::CONTENT_TYPE, content_type(&meta.content_type)),
            (header::CONTENT_DISPOSITION, disposition(&meta.filename)),
        ],
        bytes,
    )
        .into_response())
}

/// Exported notarization log of a process
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotarizedExport {
    pub process_id: String,
    pub workflow_key: String,
    pub status: &'static str,
    /// True when every digest matches its payload
    pub verified: bool,
    pub notarizations: Vec<Notarization>,
    pub attachments: Vec<Attachment>,
}

impl NotarizedExport {
    pub fn new(process: &Process, notarizations: Vec<Notarization>, attachments: Vec<Attachment>) -> Self {
        Self {
            process_id: process.id.clone(),
            workflow_key: process.workflow_key.clone(),
            status: process.status.as_str(),
            verified: notarizations.iter().all(Notarization::verify),
            notarizations,
            attachments,
        }
    }
}

async fn export(state: &AppState, process: &Process) -> Result<NotarizedExport, WebError> {
    let notarizations = state.store.list_notarizations(&process.id).await?;
    let attachments = state.store.list_attachments(&process.id).await?;
    Ok(NotarizedExport::new(process, notarizations, attachments))
}

pub async fn notarized_json(
    State(state): State<AppState>,
    Path((key, id)): Path<(String, String)>,
    RequireViewer(viewer): RequireViewer,
) -> Result<Response, WebError> {
    let def = workflow_for(&state, &viewer, &key).await?;
    let process = process_for(&state, &viewer, &def, &id).await?;
    let body = serde_json::to_vec_pretty(&export(&state, &process).await?)
        .map_err(|e| WebError::Internal(e.to_string()))?;

    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("application/json")),
            (header::CONTENT_DISPOSITION, disposition(&format!("notarized-{}.json", process.id))),
        ],
        body,
    )
        .into_response())
}

/// Zip of `notarized.json` plus every attachment under `<substep>/<attachment>-<filename>`
pub fn build_archive(export: &NotarizedExport, files: &[(Attachment, Vec<u8>)]) -> Result<Vec<u8>, WebError> {
    let zip_error = |e: zip::result::ZipError| WebError::Internal(format!("Failed to build archive: {}", e));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));

    let json = serde_json::to_vec_pretty(export).map_err(|e| WebError::Internal(e.to_string()))?;
    writer.start_file("notarized.json", options).map_err(zip_error)?;
    writer
        .write_all(&json)
        .map_err(|e| WebError::Internal(e.to_string()))?;

    for (meta, bytes) in files {
        let name = format!(
            "{}/{}-{}",
            meta.substep_id.replace('/', "_"),
            meta.id,
            meta.filename.replace(['/', '\\'], "_")
        );
        writer.start_file(name, options).map_err(zip_error)?;
        writer
            .write_all(bytes)
            .map_err(|e| WebError::Internal(e.to_string()))?;
    }

    Ok(writer.finish().map_err(zip_error)?.into_inner())
}

pub async fn files_zip(
    State(state): State<AppState>,
    Path((key, id)): Path<(String, String)>,
    RequireViewer(viewer): RequireViewer,
) -> Result<Response, WebError> {
    let def = workflow_for(&state, &viewer, &key).await?;
    let process = process_for(&state, &viewer, &def, &id).await?;
    let export = export(&state, &process).await?;

    let mut files = Vec::with_capacity(export.attachments.len());
    for meta in &export.attachments {
        if let Some(file) = state.store.get_attachment(&meta.id).await? {
            files.push(file);
        }
    }
    let archive = build_archive(&export, &files)?;

    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("application/zip")),
            (header::CONTENT_DISPOSITION, disposition(&format!("process-{}.zip", process.id))),
        ],
        archive,
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::io::Read;

    #[test]
    fn test_disposition_sanitizes() {
        assert_eq!(
            disposition("a\"b.pdf").to_str().unwrap(),
            "attachment; filename=\"a_b.pdf\""
        );
    }

    #[test]
    fn test_archive_contains_export_and_files() {
        let meta = Attachment {
            id: "att1".to_string(),
            process_id: "p1".to_string(),
            substep_id: "1.2".to_string(),
            filename: "policy.pdf".to_string(),
            content_type: "application/pdf".to_string(),
            size: 3,
            sha256: crate::notary::sha256_hex(b"pdf"),
            uploaded_by: "u1".to_string(),
            uploaded_at: Utc::now(),
        };
        let export = NotarizedExport {
            process_id: "p1".to_string(),
            workflow_key: "demo".to_string(),
            status: "active",
            verified: true,
            notarizations: Vec::new(),
            attachments: vec![meta.clone()],
        };

        let bytes = build_archive(&export, &[(meta, b"pdf".to_vec())]).unwrap();
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(archive.len(), 2);

        let mut content = String::new();
        archive
            .by_name("1.2/att1-policy.pdf")
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "pdf");
        assert!(archive.by_name("notarized.json").is_ok());
    }
}

//! View models rendered by the page templates.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use super::session::Viewer;
use crate::process::payload::attachment_refs;
use crate::process::{availability, next_available, Process, ProcessStatus};
use crate::workflow::{InputType, Step, Substep, WorkflowDef};

/// Everything the layout needs around a page body
#[derive(Debug, Serialize)]
pub struct Page<T: Serialize> {
    pub title: String,
    pub viewer: Option<ViewerView>,
    pub flash: Option<Flash>,
    #[serde(flatten)]
    pub body: T,
}

impl<T: Serialize> Page<T> {
    pub fn new(title: impl Into<String>, viewer: Option<&Viewer>, body: T) -> Self {
        Self {
            title: title.into(),
            viewer: viewer.map(ViewerView::from),
            flash: None,
            body,
        }
    }

    pub fn with_flash(mut self, flash: Option<Flash>) -> Self {
        self.flash = flash;
        self
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewerView {
    pub name: String,
    pub role: String,
    pub platform_admin: bool,
    pub org_admin: bool,
}

impl From<&Viewer> for ViewerView {
    fn from(viewer: &Viewer) -> Self {
        Self {
            name: viewer.display_name().to_string(),
            role: viewer.role().to_string(),
            platform_admin: viewer.is_platform_admin(),
            org_admin: viewer.is_org_admin(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Flash {
    pub kind: &'static str,
    pub message: String,
}

impl Flash {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: "error",
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self {
            kind: "info",
            message: message.into(),
        }
    }
}

fn short_id(id: &str) -> String {
    id.chars().take(8).collect()
}

fn timestamp(at: &DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M UTC").to_string()
}

pub fn process_href(workflow_key: &str, process_id: &str) -> String {
    format!("/w/{}/process/{}", workflow_key, process_id)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowSummary {
    pub key: String,
    pub title: String,
    pub description: String,
}

impl From<&WorkflowDef> for WorkflowSummary {
    fn from(def: &WorkflowDef) -> Self {
        Self {
            key: def.key.clone(),
            title: def.title.clone(),
            description: def.description.clone(),
        }
    }
}

/// One row of the dashboard
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessRow {
    pub id: String,
    pub short_id: String,
    pub href: String,
    pub status: &'static str,
    pub done_count: usize,
    pub total: usize,
    pub next_title: Option<String>,
    pub next_role: Option<String>,
    pub created_at: String,
}

impl ProcessRow {
    pub fn new(def: &WorkflowDef, process: &Process) -> Self {
        let next = next_available(def, process);
        Self {
            id: process.id.clone(),
            short_id: short_id(&process.id),
            href: process_href(&def.key, &process.id),
            status: process.status.as_str(),
            done_count: process.done_count(),
            total: def.substep_count(),
            next_title: next.map(|s| format!("{} {}", s.id, s.title)),
            next_role: next.map(|s| s.role.clone()),
            created_at: timestamp(&process.created_at),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardView {
    pub workflow: WorkflowSummary,
    pub workflows: Vec<String>,
    /// Processes whose open substep belongs to the viewer's role
    pub actionable: Vec<ProcessRow>,
    pub processes: Vec<ProcessRow>,
}

impl DashboardView {
    /// Newest processes first
    pub fn build(def: &WorkflowDef, mut processes: Vec<Process>, role: &str, workflows: Vec<String>) -> Self {
        processes.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let rows: Vec<ProcessRow> = processes.iter().map(|p| ProcessRow::new(def, p)).collect();
        let actionable = processes
            .iter()
            .filter(|p| next_available(def, p).is_some_and(|s| s.role == role))
            .map(|p| ProcessRow::new(def, p))
            .collect();
        Self {
            workflow: def.into(),
            workflows,
            actionable,
            processes: rows,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldView {
    /// Form field name
    pub name: String,
    pub label: String,
    pub is_file: bool,
    pub is_number: bool,
}

#[derive(Debug, Serialize)]
pub struct ValueView {
    pub label: Option<String>,
    pub text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileView {
    pub filename: String,
    pub size: u64,
    pub sha256: String,
    pub href: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubstepView {
    pub id: String,
    pub title: String,
    pub role: String,
    pub done: bool,
    pub available: bool,
    /// Available and assigned to the viewer's role
    pub can_act: bool,
    pub done_by: Option<String>,
    pub done_at: Option<String>,
    pub complete_url: String,
    pub multipart: bool,
    pub fields: Vec<FieldView>,
    pub values: Vec<ValueView>,
    pub files: Vec<FileView>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepView {
    pub id: String,
    pub title: String,
    pub order: u32,
    pub substeps: Vec<SubstepView>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessView {
    pub id: String,
    pub short_id: String,
    pub workflow_key: String,
    pub workflow_title: String,
    pub status: &'static str,
    pub done_count: usize,
    pub total: usize,
    pub completed_at: Option<String>,
    pub message: Option<String>,
    pub message_kind: &'static str,
    pub steps: Vec<StepView>,
}

impl ProcessView {
    pub fn build(def: &WorkflowDef, process: &Process, role: &str) -> Self {
        let gates = availability(def, process);
        let base = process_href(&def.key, &process.id);

        let mut steps: Vec<&Step> = def.steps.iter().collect();
        steps.sort_by_key(|s| s.order);
        let steps = steps
            .into_iter()
            .map(|step| {
                let mut substeps: Vec<&Substep> = step.substeps.iter().collect();
                substeps.sort_by_key(|s| s.order);
                StepView {
                    id: step.id.clone(),
                    title: step.title.clone(),
                    order: step.order,
                    substeps: substeps
                        .into_iter()
                        .map(|substep| {
                            let available = gates
                                .iter()
                                .any(|g| g.substep_id == substep.id && g.available);
                            substep_view(&base, process, substep, available, role)
                        })
                        .collect(),
                }
            })
            .collect();

        Self {
            id: process.id.clone(),
            short_id: short_id(&process.id),
            workflow_key: def.key.clone(),
            workflow_title: def.title.clone(),
            status: process.status.as_str(),
            done_count: process.done_count(),
            total: def.substep_count(),
            completed_at: process
                .completed_at
                .filter(|_| process.status == ProcessStatus::Done)
                .map(|at| timestamp(&at)),
            message: None,
            message_kind: "info",
            steps,
        }
    }

    pub fn with_message(mut self, flash: Option<Flash>) -> Self {
        if let Some(flash) = flash {
            self.message = Some(flash.message);
            self.message_kind = flash.kind;
        }
        self
    }
}

fn substep_view(base: &str, process: &Process, substep: &Substep, available: bool, role: &str) -> SubstepView {
    let progress = process.step(&substep.id).filter(|s| s.is_done());
    let data = progress.and_then(|p| p.data.as_ref());
    let file_base = format!("{}/substep/{}/file", base, substep.id);

    let fields = match substep.input_type {
        InputType::Group => substep
            .fields
            .iter()
            .map(|f| FieldView {
                name: format!("{}.{}", substep.input_key, f.key),
                label: f.label.clone(),
                is_file: f.input_type == InputType::File,
                is_number: f.input_type == InputType::Number,
            })
            .collect(),
        input_type => vec![FieldView {
            name: substep.input_key.clone(),
            label: substep.title.clone(),
            is_file: input_type == InputType::File,
            is_number: input_type == InputType::Number,
        }],
    };

    SubstepView {
        id: substep.id.clone(),
        title: substep.title.clone(),
        role: substep.role.clone(),
        done: progress.is_some(),
        available,
        can_act: available && substep.role == role,
        done_by: progress
            .and_then(|p| p.done_by.as_ref())
            .map(|a| a.user_id.clone()),
        done_at: progress.and_then(|p| p.done_at).map(|at| timestamp(&at)),
        complete_url: format!("{}/substep/{}/complete", base, substep.id),
        multipart: fields.iter().any(|f| f.is_file),
        fields,
        values: data
            .map(|d| value_views(substep, d))
            .unwrap_or_default(),
        files: data
            .map(|d| {
                attachment_refs(d)
                    .into_iter()
                    .map(|r| FileView {
                        href: format!("{}?attachment={}", file_base, r.attachment_id),
                        filename: r.filename,
                        size: r.size,
                        sha256: r.sha256,
                    })
                    .collect()
            })
            .unwrap_or_default(),
    }
}

/// Scalar values of a finished substep; files are listed separately
fn value_views(substep: &Substep, data: &Value) -> Vec<ValueView> {
    let Some(value) = data.get(&substep.input_key) else {
        return Vec::new();
    };
    match substep.input_type {
        InputType::Group => substep
            .fields
            .iter()
            .filter(|f| f.input_type != InputType::File)
            .filter_map(|f| {
                value.get(&f.key).map(|v| ValueView {
                    label: Some(f.label.clone()),
                    text: display_value(v),
                })
            })
            .collect(),
        InputType::File => Vec::new(),
        _ => vec![ValueView {
            label: None,
            text: display_value(value),
        }],
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

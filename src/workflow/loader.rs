//! Filesystem loading for workflow definitions

use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::schema::{ValidationError, WorkflowDef};

/// Built-in definition used when no workflow directory is configured
pub const DEMO_WORKFLOW: &str = include_str!("demo.yaml");

#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    #[error("invalid workflow '{key}': {}", join_errors(.errors))]
    Invalid {
        key: String,
        errors: Vec<ValidationError>,
    },
    #[error("workflow '{0}' is defined more than once")]
    DuplicateKey(String),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Parse and validate one definition
pub fn parse_workflow(yaml: &str, origin: &Path) -> Result<WorkflowDef, WorkflowError> {
    let def = WorkflowDef::from_yaml(yaml).map_err(|source| WorkflowError::Parse {
        path: origin.to_path_buf(),
        source,
    })?;
    def.validate().map_err(|errors| WorkflowError::Invalid {
        key: def.key.clone(),
        errors,
    })?;
    Ok(def)
}

/// Load the built-in demo workflow
pub fn load_builtin() -> Result<WorkflowDef, WorkflowError> {
    parse_workflow(DEMO_WORKFLOW, Path::new("<builtin demo.yaml>"))
}

/// Load every `*.yaml` / `*.yml` file in a directory
///
/// Any unreadable or invalid definition fails the whole load.
pub fn load_dir(path: &Path) -> Result<Vec<WorkflowDef>, WorkflowError> {
    let entries = fs::read_dir(path).map_err(|source| WorkflowError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let mut files: Vec<PathBuf> = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| WorkflowError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let file_path = entry.path();
        let is_yaml = file_path
            .extension()
            .is_some_and(|e| e == "yaml" || e == "yml");
        if file_path.is_file() && is_yaml {
            files.push(file_path);
        }
    }
    files.sort();

    let mut defs = Vec::with_capacity(files.len());
    for file_path in files {
        let yaml = fs::read_to_string(&file_path).map_err(|source| WorkflowError::Io {
            path: file_path.clone(),
            source,
        })?;
        let def = parse_workflow(&yaml, &file_path)?;
        debug!(key = %def.key, path = %file_path.display(), "Loaded workflow definition");
        defs.push(def);
    }
    Ok(defs)
}

//! Workflow definition schema

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Kind of value a substep collects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputType {
    String,
    Number,
    File,
    /// Structured form; the payload is an object keyed by field
    Group,
}

impl InputType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InputType::String => "string",
            InputType::Number => "number",
            InputType::File => "file",
            InputType::Group => "group",
        }
    }

    pub fn is_scalar(&self) -> bool {
        !matches!(self, InputType::Group)
    }
}

/// One field of a `group` substep
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    pub key: String,
    pub label: String,
    pub input_type: InputType,
}

/// Smallest completable unit of a workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Substep {
    pub id: String,
    pub title: String,
    pub order: u32,
    /// Role slug allowed to complete this substep
    pub role: String,
    pub input_key: String,
    pub input_type: InputType,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldDef>,
    /// External teams the completing user must belong to
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub team_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub id: String,
    pub title: String,
    pub order: u32,
    pub substeps: Vec<Substep>,
}

/// An ordered tree of steps and substeps, immutable once loaded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDef {
    pub key: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub steps: Vec<Step>,
}

/// A substep together with its parent step, in sequence order
#[derive(Debug, Clone, Copy)]
pub struct SequencedSubstep<'a> {
    pub step: &'a Step,
    pub substep: &'a Substep,
}

/// Validation errors for workflow definitions
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Key is empty or not a lowercase slug
    InvalidKey(String),
    /// No substeps defined
    NoSubsteps,
    /// Substep ID used twice
    DuplicateSubstep(String),
    /// Substep without a role
    MissingRole(String),
    /// Substep without an input key
    MissingInputKey(String),
    /// Group substep without fields, or scalar substep with fields
    InvalidFields(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::InvalidKey(key) => {
                write!(f, "Workflow key '{}' must be a lowercase slug", key)
            }
            ValidationError::NoSubsteps => write!(f, "Workflow must have at least one substep"),
            ValidationError::DuplicateSubstep(id) => write!(f, "Substep '{}' is defined twice", id),
            ValidationError::MissingRole(id) => write!(f, "Substep '{}' has no role", id),
            ValidationError::MissingInputKey(id) => write!(f, "Substep '{}' has no input key", id),
            ValidationError::InvalidFields(id) => write!(
                f,
                "Substep '{}' fields must be unique scalar fields, and only on group inputs",
                id
            ),
        }
    }
}

impl std::error::Error for ValidationError {}

impl Substep {
    /// Number of file parts a completion of this substep carries
    pub fn file_inputs(&self) -> usize {
        match self.input_type {
            InputType::File => 1,
            InputType::Group => self
                .fields
                .iter()
                .filter(|f| f.input_type == InputType::File)
                .count(),
            _ => 0,
        }
    }
}

impl WorkflowDef {
    /// Parse a definition from YAML
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Substeps flattened by (step order, substep order); ties keep file order
    pub fn sequence(&self) -> Vec<SequencedSubstep<'_>> {
        let mut steps: Vec<&Step> = self.steps.iter().collect();
        steps.sort_by_key(|s| s.order);

        let mut out = Vec::new();
        for step in steps {
            let mut substeps: Vec<&Substep> = step.substeps.iter().collect();
            substeps.sort_by_key(|s| s.order);
            out.extend(
                substeps
                    .into_iter()
                    .map(|substep| SequencedSubstep { step, substep }),
            );
        }
        out
    }

    /// Find a substep and its parent step by ID
    pub fn find_substep(&self, substep_id: &str) -> Option<SequencedSubstep<'_>> {
        self.steps.iter().find_map(|step| {
            step.substeps
                .iter()
                .find(|s| s.id == substep_id)
                .map(|substep| SequencedSubstep { step, substep })
        })
    }

    pub fn substep_count(&self) -> usize {
        self.steps.iter().map(|s| s.substeps.len()).sum()
    }

    /// Most file parts any one substep accepts
    pub fn max_file_inputs(&self) -> usize {
        self.steps
            .iter()
            .flat_map(|s| &s.substeps)
            .map(Substep::file_inputs)
            .max()
            .unwrap_or(0)
    }

    /// Distinct role slugs in sequence order
    pub fn roles(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.sequence()
            .into_iter()
            .filter(|s| seen.insert(s.substep.role.clone()))
            .map(|s| s.substep.role.clone())
            .collect()
    }

    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        let key_ok = !self.key.is_empty()
            && self
                .key
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_');
        if !key_ok {
            errors.push(ValidationError::InvalidKey(self.key.clone()));
        }

        if self.substep_count() == 0 {
            errors.push(ValidationError::NoSubsteps);
        }

        let mut ids = HashSet::new();
        for step in &self.steps {
            for substep in &step.substeps {
                if !ids.insert(substep.id.as_str()) {
                    errors.push(ValidationError::DuplicateSubstep(substep.id.clone()));
                }
                if substep.role.trim().is_empty() {
                    errors.push(ValidationError::MissingRole(substep.id.clone()));
                }
                if substep.input_key.trim().is_empty() {
                    errors.push(ValidationError::MissingInputKey(substep.id.clone()));
                }
                if !fields_valid(substep) {
                    errors.push(ValidationError::InvalidFields(substep.id.clone()));
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

fn fields_valid(substep: &Substep) -> bool {
    if substep.input_type != InputType::Group {
        return substep.fields.is_empty();
    }
    let mut keys = HashSet::new();
    !substep.fields.is_empty()
        && substep
            .fields
            .iter()
            .all(|f| f.input_type.is_scalar() && !f.key.is_empty() && keys.insert(f.key.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn substep(id: &str, order: u32, role: &str) -> Substep {
        Substep {
            id: id.to_string(),
            title: format!("Substep {}", id),
            order,
            role: role.to_string(),
            input_key: format!("value_{}", id.replace('.', "_")),
            input_type: InputType::String,
            fields: Vec::new(),
            team_ids: Vec::new(),
        }
    }

    fn def() -> WorkflowDef {
        WorkflowDef {
            key: "audit".to_string(),
            title: "Audit".to_string(),
            description: String::new(),
            steps: vec![
                Step {
                    id: "2".to_string(),
                    title: "Review".to_string(),
                    order: 2,
                    substeps: vec![substep("2.1", 1, "dep2")],
                },
                Step {
                    id: "1".to_string(),
                    title: "Prepare".to_string(),
                    order: 1,
                    substeps: vec![substep("1.2", 2, "dep1"), substep("1.1", 1, "dep1")],
                },
            ],
        }
    }

    #[test]
    fn test_sequence_sorts_steps_and_substeps() {
        let def = def();
        let ids: Vec<&str> = def.sequence().iter().map(|s| s.substep.id.as_str()).collect();
        assert_eq!(ids, vec!["1.1", "1.2", "2.1"]);
    }

    #[test]
    fn test_find_substep_returns_parent_step() {
        let def = def();
        let found = def.find_substep("2.1").unwrap();
        assert_eq!(found.step.order, 2);
        assert!(def.find_substep("9.9").is_none());
    }

    #[test]
    fn test_roles_in_sequence_order() {
        assert_eq!(def().roles(), vec!["dep1".to_string(), "dep2".to_string()]);
    }

    #[test]
    fn test_validate_ok() {
        assert!(def().validate().is_ok());
    }

    #[test]
    fn test_validate_duplicate_and_missing() {
        let mut def = def();
        def.key = "Bad Key".to_string();
        def.steps[0].substeps.push(substep("1.1", 3, ""));
        let errors = def.validate().unwrap_err();
        assert!(errors.contains(&ValidationError::InvalidKey("Bad Key".to_string())));
        assert!(errors.contains(&ValidationError::DuplicateSubstep("1.1".to_string())));
        assert!(errors.contains(&ValidationError::MissingRole("1.1".to_string())));
    }

    #[test]
    fn test_group_requires_scalar_fields() {
        let mut def = def();
        def.steps[0].substeps[0].input_type = InputType::Group;
        let errors = def.validate().unwrap_err();
        assert_eq!(errors, vec![ValidationError::InvalidFields("2.1".to_string())]);

        def.steps[0].substeps[0].fields = vec![FieldDef {
            key: "evidence".to_string(),
            label: "Evidence".to_string(),
            input_type: InputType::File,
        }];
        assert!(def.validate().is_ok());
        assert_eq!(def.steps[0].substeps[0].file_inputs(), 1);
        assert_eq!(def.max_file_inputs(), 1);
    }

    #[test]
    fn test_scalar_workflow_has_no_file_inputs() {
        assert_eq!(def().max_file_inputs(), 0);
    }

    #[test]
    fn test_from_yaml() {
        let yaml = r#"
key: mini
title: Mini
steps:
  - id: "1"
    title: Only
    order: 1
    substeps:
      - id: "1.1"
        title: Upload
        order: 1
        role: dep1
        input_key: doc
        input_type: file
        team_ids: [security]
"#;
        let def = WorkflowDef::from_yaml(yaml).unwrap();
        assert_eq!(def.steps[0].substeps[0].input_type, InputType::File);
        assert_eq!(def.steps[0].substeps[0].team_ids, vec!["security"]);
    }
}

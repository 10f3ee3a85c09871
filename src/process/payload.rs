//! Submitted values for a substep and their validation.
//!
//! Form field names: scalar substeps use `input_key`; group substeps use
//! `input_key.field_key` for each field. Validated files are later replaced
//! by [`AttachmentRef`] objects inside the payload tree.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::collections::HashMap;

use crate::workflow::{InputType, Substep};

/// A file part of a submission, fully buffered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Raw form input for one completion request
#[derive(Debug, Clone, Default)]
pub struct Submission {
    pub values: HashMap<String, String>,
    pub files: HashMap<String, UploadedFile>,
}

impl Submission {
    pub fn with_value(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    pub fn with_file(mut self, name: impl Into<String>, file: UploadedFile) -> Self {
        self.files.insert(name.into(), file);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PayloadError {
    #[error("Value is required.")]
    MissingValue { field: String },
    #[error("Value must be a number.")]
    NotANumber { field: String },
    #[error("File is required.")]
    FileRequired { field: String },
    #[error("File exceeds the maximum size of {max_bytes} bytes.")]
    TooLarge { field: String, max_bytes: usize },
}

impl PayloadError {
    /// Form field the error refers to
    pub fn field(&self) -> &str {
        match self {
            PayloadError::MissingValue { field }
            | PayloadError::NotANumber { field }
            | PayloadError::FileRequired { field }
            | PayloadError::TooLarge { field, .. } => field,
        }
    }

    pub fn is_too_large(&self) -> bool {
        matches!(self, PayloadError::TooLarge { .. })
    }
}

/// A validated scalar value, files not yet stored
#[derive(Debug, Clone, PartialEq)]
pub enum PreparedValue {
    Text(String),
    Number(Number),
    File(UploadedFile),
}

/// Validated payload shape for one substep
#[derive(Debug, Clone, PartialEq)]
pub enum PreparedPayload {
    Single(PreparedValue),
    Group(Vec<(String, PreparedValue)>),
}

/// Reference to a stored attachment, embedded in step payloads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentRef {
    pub attachment_id: String,
    pub filename: String,
    pub content_type: String,
    pub size: u64,
    pub sha256: String,
}

/// Validate a submission against the substep's input type
pub fn prepare(
    substep: &Substep,
    submission: &mut Submission,
    max_bytes: usize,
) -> Result<PreparedPayload, PayloadError> {
    match substep.input_type {
        InputType::Group => {
            let mut fields = Vec::with_capacity(substep.fields.len());
            for field in &substep.fields {
                let name = format!("{}.{}", substep.input_key, field.key);
                let value = prepare_scalar(field.input_type, &name, submission, max_bytes)?;
                fields.push((field.key.clone(), value));
            }
            Ok(PreparedPayload::Group(fields))
        }
        scalar => prepare_scalar(scalar, &substep.input_key, submission, max_bytes)
            .map(PreparedPayload::Single),
    }
}

fn prepare_scalar(
    input_type: InputType,
    name: &str,
    submission: &mut Submission,
    max_bytes: usize,
) -> Result<PreparedValue, PayloadError> {
    match input_type {
        InputType::String => {
            let value = submission
                .values
                .get(name)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| PayloadError::MissingValue {
                    field: name.to_string(),
                })?;
            Ok(PreparedValue::Text(value.to_string()))
        }
        InputType::Number => {
            let raw = submission
                .values
                .get(name)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| PayloadError::NotANumber {
                    field: name.to_string(),
                })?;
            parse_number(raw)
                .map(PreparedValue::Number)
                .ok_or_else(|| PayloadError::NotANumber {
                    field: name.to_string(),
                })
        }
        InputType::File => {
            let file = submission
                .files
                .remove(name)
                .filter(|f| !f.filename.is_empty() || !f.bytes.is_empty())
                .ok_or_else(|| PayloadError::FileRequired {
                    field: name.to_string(),
                })?;
            if file.bytes.len() > max_bytes {
                return Err(PayloadError::TooLarge {
                    field: name.to_string(),
                    max_bytes,
                });
            }
            Ok(PreparedValue::File(file))
        }
        // Nested groups are rejected when definitions load
        InputType::Group => Err(PayloadError::MissingValue {
            field: name.to_string(),
        }),
    }
}

/// Integers stay integers; other values must be finite floats
fn parse_number(raw: &str) -> Option<Number> {
    if let Ok(i) = raw.parse::<i64>() {
        return Some(Number::from(i));
    }
    raw.parse::<f64>().ok().and_then(Number::from_f64)
}

/// Wrap a finished value tree under the substep's input key
pub fn wrap(input_key: &str, value: Value) -> Value {
    let mut map = Map::new();
    map.insert(input_key.to_string(), value);
    Value::Object(map)
}

/// Every attachment reference anywhere in a payload tree, depth first
pub fn attachment_refs(payload: &Value) -> Vec<AttachmentRef> {
    let mut out = Vec::new();
    collect_refs(payload, &mut out);
    out
}

fn collect_refs(value: &Value, out: &mut Vec<AttachmentRef>) {
    match value {
        Value::Object(map) => {
            if map.contains_key("attachmentId") {
                if let Ok(reference) = serde_json::from_value::<AttachmentRef>(value.clone()) {
                    out.push(reference);
                    return;
                }
            }
            for child in map.values() {
                collect_refs(child, out);
            }
        }
        Value::Array(items) => {
            for child in items {
                collect_refs(child, out);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::loader::load_builtin;
    use serde_json::json;

    fn substep(id: &str) -> Substep {
        load_builtin()
            .unwrap()
            .find_substep(id)
            .unwrap()
            .substep
            .clone()
    }

    fn file(name: &str, bytes: &[u8]) -> UploadedFile {
        UploadedFile {
            filename: name.to_string(),
            content_type: "application/pdf".to_string(),
            bytes: bytes.to_vec(),
        }
    }

    #[test]
    fn test_string_required() {
        let mut submission = Submission::default().with_value("policy_owner", "   ");
        let err = prepare(&substep("1.1"), &mut submission, 1024).unwrap_err();
        assert_eq!(err.to_string(), "Value is required.");

        let mut submission = Submission::default().with_value("policy_owner", " Ada ");
        let prepared = prepare(&substep("1.1"), &mut submission, 1024).unwrap();
        assert_eq!(
            prepared,
            PreparedPayload::Single(PreparedValue::Text("Ada".to_string()))
        );
    }

    #[test]
    fn test_file_required_and_size_limit() {
        let mut submission = Submission::default();
        let err = prepare(&substep("1.2"), &mut submission, 4).unwrap_err();
        assert_eq!(err.to_string(), "File is required.");

        let mut submission = Submission::default().with_file("policy_document", file("", b""));
        let err = prepare(&substep("1.2"), &mut submission, 4).unwrap_err();
        assert!(matches!(err, PayloadError::FileRequired { .. }));

        let mut submission =
            Submission::default().with_file("policy_document", file("p.pdf", b"12345"));
        let err = prepare(&substep("1.2"), &mut submission, 4).unwrap_err();
        assert!(err.is_too_large());
    }

    #[test]
    fn test_group_validates_each_field() {
        let mut submission = Submission::default()
            .with_value("review.reviewer", "Grace")
            .with_value("review.risk_score", "high")
            .with_file("review.evidence", file("e.pdf", b"x"));
        let err = prepare(&substep("2.1"), &mut submission, 1024).unwrap_err();
        assert_eq!(err.to_string(), "Value must be a number.");
        assert_eq!(err.field(), "review.risk_score");

        let mut submission = Submission::default()
            .with_value("review.reviewer", "Grace")
            .with_value("review.risk_score", "3.5")
            .with_file("review.evidence", file("e.pdf", b"x"));
        match prepare(&substep("2.1"), &mut submission, 1024).unwrap() {
            PreparedPayload::Group(fields) => {
                assert_eq!(fields.len(), 3);
                assert_eq!(fields[1].0, "risk_score");
                assert!(matches!(fields[2].1, PreparedValue::File(_)));
            }
            other => panic!("expected group, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_number_keeps_integers() {
        assert_eq!(parse_number("7").unwrap().as_i64(), Some(7));
        assert_eq!(parse_number("2.5").unwrap().as_f64(), Some(2.5));
        assert!(parse_number("NaN").is_none());
        assert!(parse_number("abc").is_none());
    }

    #[test]
    fn test_attachment_refs_walks_nested_payloads() {
        let payload = json!({
            "review": {
                "reviewer": "Grace",
                "evidence": {
                    "attachmentId": "a1",
                    "filename": "e.pdf",
                    "contentType": "application/pdf",
                    "size": 1,
                    "sha256": "abc"
                },
                "more": [{"inner": {
                    "attachmentId": "a2",
                    "filename": "f.txt",
                    "contentType": "text/plain",
                    "size": 2,
                    "sha256": "def"
                }}]
            }
        });

        let refs = attachment_refs(&payload);
        let ids: Vec<&str> = refs.iter().map(|r| r.attachment_id.as_str()).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&"a1"));
        assert!(ids.contains(&"a2"));
    }
}

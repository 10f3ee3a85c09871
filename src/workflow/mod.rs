//! Workflow definitions: ordered steps of role-gated substeps.
//!
//! Definitions are loaded once at startup (built-in demo or a directory of
//! YAML files) and shared read-only by every process of the same key.

pub mod loader;
pub mod schema;

pub use loader::WorkflowError;
pub use schema::{FieldDef, InputType, SequencedSubstep, Step, Substep, WorkflowDef};

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Immutable set of workflow definitions by key
#[derive(Debug, Clone, Default)]
pub struct WorkflowRegistry {
    defs: HashMap<String, Arc<WorkflowDef>>,
}

impl WorkflowRegistry {
    /// Build a registry from already validated definitions
    pub fn from_defs(defs: Vec<WorkflowDef>) -> Result<Self, WorkflowError> {
        let mut map = HashMap::new();
        for def in defs {
            if map.contains_key(&def.key) {
                return Err(WorkflowError::DuplicateKey(def.key));
            }
            map.insert(def.key.clone(), Arc::new(def));
        }
        Ok(Self { defs: map })
    }

    /// Registry holding only the built-in demo workflow
    pub fn builtin() -> Result<Self, WorkflowError> {
        Self::from_defs(vec![loader::load_builtin()?])
    }

    /// Load from a directory, or the built-in demo when none is given
    pub fn load(dir: Option<&Path>) -> Result<Self, WorkflowError> {
        let registry = match dir {
            Some(dir) => Self::from_defs(loader::load_dir(dir)?)?,
            None => Self::builtin()?,
        };
        info!("Loaded {} workflow definitions", registry.defs.len());
        Ok(registry)
    }

    pub fn get(&self, key: &str) -> Option<Arc<WorkflowDef>> {
        self.defs.get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.defs.contains_key(key)
    }

    /// Sorted workflow keys
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.defs.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<WorkflowDef>> {
        self.defs.values()
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_registry() {
        let registry = WorkflowRegistry::builtin().unwrap();
        assert_eq!(registry.keys(), vec!["demo".to_string()]);
        assert!(registry.get("demo").is_some());
        assert!(!registry.contains("other"));
    }

    #[test]
    fn test_duplicate_keys_rejected() {
        let def = loader::load_builtin().unwrap();
        let err = WorkflowRegistry::from_defs(vec![def.clone(), def]).unwrap_err();
        assert!(matches!(err, WorkflowError::DuplicateKey(k) if k == "demo"));
    }
}

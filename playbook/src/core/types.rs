//! Playbook document types.
//!
//! A playbook is read once per invocation and never mutated afterwards; every
//! step context is rebuilt from these values.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Free-form key/value mapping used for global config, step config and context.
pub type Bag = Map<String, Value>;

/// One named unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub action: String,
    #[serde(default)]
    pub name: Option<String>,
    /// Every other key of the step mapping, `docker` included.
    #[serde(flatten)]
    pub config: Bag,
}

impl Step {
    /// The step as it appears in the document: config plus `action` and `name`.
    pub fn to_bag(&self) -> Bag {
        let mut bag = self.config.clone();
        bag.insert("action".to_string(), Value::String(self.action.clone()));
        if let Some(name) = &self.name {
            bag.insert("name".to_string(), Value::String(name.clone()));
        }
        bag
    }

    /// Human label used in logs: the name when present, the action otherwise.
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.action)
    }
}

/// Ordered steps plus the global keys that seed every step context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Playbook {
    pub steps: Vec<Step>,
    /// Top-level keys other than `steps`.
    #[serde(flatten)]
    pub global: Bag,
}

//! Loading and validating playbook documents.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use jsonschema::Draft;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::core::types::Playbook;
use crate::error::PlaybookError;

const PLAYBOOK_SCHEMA: &str = include_str!("../../schemas/playbook.schema.json");

/// Read, schema-check and decode the playbook at `path`.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn load_playbook(path: &Path) -> Result<Playbook> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read playbook {}", path.display()))?;
    let playbook =
        parse_playbook(&contents).with_context(|| format!("load playbook {}", path.display()))?;
    debug!(steps = playbook.steps.len(), "playbook loaded");
    Ok(playbook)
}

/// Decode a YAML playbook document. Every failure is a [`PlaybookError::Syntax`].
pub fn parse_playbook(contents: &str) -> Result<Playbook, PlaybookError> {
    let value: Value = serde_yaml::from_str(contents)
        .map_err(|err| PlaybookError::Syntax(format!("invalid YAML: {err}")))?;
    validate_schema(&value)?;
    serde_json::from_value(value).map_err(|err| PlaybookError::Syntax(err.to_string()))
}

fn validate_schema(instance: &Value) -> Result<(), PlaybookError> {
    let schema: Value = serde_json::from_str(PLAYBOOK_SCHEMA)
        .map_err(|err| PlaybookError::Syntax(format!("bundled schema is invalid JSON: {err}")))?;
    let compiled = jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(&schema)
        .map_err(|err| PlaybookError::Syntax(format!("compile playbook schema: {err}")))?;
    let messages: Vec<String> = compiled
        .iter_errors(instance)
        .map(|err| err.to_string())
        .collect();
    if !messages.is_empty() {
        return Err(PlaybookError::Syntax(format!(
            "schema validation failed:\n- {}",
            messages.join("\n- ")
        )));
    }
    Ok(())
}

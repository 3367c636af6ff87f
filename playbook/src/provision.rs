//! Submitting manifests to the cluster.
//!
//! The provisioner does not retry and does not interpret failures; what the API
//! server says is what the caller gets.

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, instrument};

use crate::error::PlaybookError;
use crate::io::cluster::{ApiError, ClusterApi, ResourceHandle, ResourceKind};

const JOB_TEMPLATE: &str = include_str!("../templates/job.yaml");
const DEFAULT_GENERATE_NAME: &str = "playbook-";

pub struct Provisioner<'a> {
    api: &'a dyn ClusterApi,
}

impl<'a> Provisioner<'a> {
    pub fn new(api: &'a dyn ClusterApi) -> Self {
        Self { api }
    }

    /// Create `manifest` as a resource of `kind`.
    ///
    /// Namespaced kinds go to `metadata.namespace` when set, otherwise to the
    /// client's default namespace.
    #[instrument(skip_all, fields(kind = %kind))]
    pub fn submit(&self, kind: ResourceKind, manifest: &Value) -> Result<ResourceHandle, ApiError> {
        let namespace = manifest
            .pointer("/metadata/namespace")
            .and_then(Value::as_str)
            .unwrap_or_else(|| self.api.namespace())
            .to_string();
        let created = self.api.create(kind, &namespace, manifest)?;
        let handle = handle_from(kind, &created, kind.is_namespaced().then_some(namespace))?;
        info!(
            name = %handle.name,
            namespace = handle.namespace.as_deref().unwrap_or("-"),
            uid = handle.uid.as_deref().unwrap_or("-"),
            "resource created"
        );
        Ok(handle)
    }
}

fn handle_from(
    kind: ResourceKind,
    created: &Value,
    fallback_namespace: Option<String>,
) -> Result<ResourceHandle, ApiError> {
    let name = created
        .pointer("/metadata/name")
        .and_then(Value::as_str)
        .ok_or_else(|| ApiError::Malformed(format!("created {kind} has no metadata.name")))?;
    let namespace = created
        .pointer("/metadata/namespace")
        .and_then(Value::as_str)
        .map(str::to_string)
        .or(fallback_namespace);
    let uid = created
        .pointer("/metadata/uid")
        .and_then(Value::as_str)
        .map(str::to_string);
    Ok(ResourceHandle {
        kind,
        name: name.to_string(),
        namespace,
        uid,
    })
}

/// Volume claim mounted into the job container.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClaimMount {
    pub name: String,
    pub mount_path: String,
}

/// Typed input for the built-in Job template.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct JobRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub generate_name: Option<String>,
    pub image: String,
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default)]
    pub runtime_class: Option<String>,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub claim: Option<ClaimMount>,
}

impl JobRequest {
    /// Render the Job manifest as JSON, ready for [`Provisioner::submit`].
    pub fn render(&self, default_namespace: &str) -> Result<Value> {
        if self.name.is_some() && self.generate_name.is_some() {
            return Err(PlaybookError::Config(
                "job takes either `name` or `generate_name`, not both".to_string(),
            )
            .into());
        }
        let mut env = Environment::new();
        env.add_template("job", JOB_TEMPLATE)
            .context("load job template")?;
        let template = env.get_template("job")?;
        let namespace = self.namespace.as_deref().unwrap_or(default_namespace);
        let rendered = template
            .render(context! {
                name => self.name.as_deref().map(quoted),
                generate_name => quoted(self.generate_name.as_deref().unwrap_or(DEFAULT_GENERATE_NAME)),
                namespace => quoted(namespace),
                image => quoted(&self.image),
                command => (!self.command.is_empty()).then(|| quoted_list(&self.command)),
                runtime_class => self.runtime_class.as_deref().map(quoted),
                claim => self.claim.as_ref().map(|c| quoted(&c.name)),
                mount_path => self.claim.as_ref().map(|c| quoted(&c.mount_path)),
            })
            .context("render job template")?;
        let manifest: Value =
            serde_yaml::from_str(&rendered).context("parse rendered job manifest")?;
        Ok(manifest)
    }
}

/// JSON string literal, which YAML reads back verbatim.
fn quoted(value: &str) -> String {
    Value::String(value.to_string()).to_string()
}

fn quoted_list(values: &[String]) -> String {
    Value::from(values.to_vec()).to_string()
}

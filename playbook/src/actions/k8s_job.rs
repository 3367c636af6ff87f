//! `k8s_job`: run a step as a Kubernetes Job and wait for it.
//!
//! ```yaml
//! action: k8s_job
//! k8s:
//!   persistent_volume: { ... }        # optional inline manifest
//!   persistent_volume_claim: { ... }  # optional inline manifest
//!   job:
//!     generate_name: train-
//!     image: trainer:1
//!     command: [python, train.py]
//!     claim: { name: data-pvc, mount_path: /data }
//! ```

use std::collections::BTreeMap;

use anyhow::Result;
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, instrument};

use crate::actions::{Action, ActionEnv, StepOutcome};
use crate::core::context::ExecutionContext;
use crate::core::phase::TerminalPhases;
use crate::core::poll::{PollPolicy, Sleeper};
use crate::error::PlaybookError;
use crate::io::cluster::{ClusterApi, ResourceKind};
use crate::provision::{JobRequest, Provisioner};
use crate::watch::JobWatcher;

pub const NAME: &str = "k8s_job";
const SUCCEEDED: &str = "Succeeded";

#[derive(Debug, Clone, Deserialize)]
struct K8sStep {
    #[serde(default)]
    persistent_volume: Option<Value>,
    #[serde(default)]
    persistent_volume_claim: Option<Value>,
    job: JobRequest,
}

pub struct K8sJob<A, S> {
    api: A,
    sleeper: S,
    policy: PollPolicy,
    terminal: TerminalPhases,
}

impl<A: ClusterApi, S: Sleeper> K8sJob<A, S> {
    pub fn new(api: A, sleeper: S, policy: PollPolicy, terminal: TerminalPhases) -> Self {
        Self {
            api,
            sleeper,
            policy,
            terminal,
        }
    }

    fn submit_volume(&self, kind: ResourceKind, manifest: &Value) -> Result<()> {
        Provisioner::new(&self.api)
            .submit(kind, manifest)
            .map(|_| ())
            .map_err(|err| {
                anyhow::Error::new(err).context(PlaybookError::Task(format!("submit {kind}")))
            })
    }
}

impl<A: ClusterApi, S: Sleeper> Action for K8sJob<A, S> {
    #[instrument(skip_all, fields(step = env.step))]
    fn invoke(&self, ctx: &ExecutionContext, env: &ActionEnv<'_>) -> Result<StepOutcome> {
        let raw = ctx.get("k8s").ok_or_else(|| {
            PlaybookError::Config("k8s_job step needs a `k8s` mapping".to_string())
        })?;
        let step: K8sStep = serde_json::from_value(raw.clone())
            .map_err(|err| PlaybookError::Config(format!("invalid `k8s` mapping: {err}")))?;

        if let Some(pv) = &step.persistent_volume {
            self.submit_volume(ResourceKind::PersistentVolume, pv)?;
        }
        if let Some(pvc) = &step.persistent_volume_claim {
            self.submit_volume(ResourceKind::PersistentVolumeClaim, pvc)?;
        }
        let manifest = step.job.render(self.api.namespace())?;
        let handle = Provisioner::new(&self.api)
            .submit(ResourceKind::Job, &manifest)
            .map_err(|err| {
                anyhow::Error::new(err).context(PlaybookError::Task("submit Job".to_string()))
            })?;

        let phases = JobWatcher::new(
            &self.api,
            &self.sleeper,
            self.policy.clone(),
            self.terminal.clone(),
        )
        .join(&handle)
        .map_err(|err| err.context(PlaybookError::Task(format!("wait for job {}", handle.name))))?;

        let failed = unsuccessful(&phases);
        if !failed.is_empty() {
            return Err(PlaybookError::Task(format!(
                "job {} finished with unsuccessful pods: {}",
                handle.name,
                failed.join(", ")
            ))
            .into());
        }
        info!(job = %handle.name, pods = phases.len(), "job succeeded");
        Ok(StepOutcome::Continue)
    }
}

fn unsuccessful(phases: &BTreeMap<String, String>) -> Vec<String> {
    phases
        .iter()
        .filter(|(_, phase)| phase.as_str() != SUCCEEDED)
        .map(|(pod, phase)| format!("{pod}={phase}"))
        .collect()
}

//! Test-only doubles and fixtures.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, VecDeque};
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;

use anyhow::Result;
use serde_json::{Value, json};

use crate::actions::{Action, ActionEnv, StepOutcome};
use crate::bridge::ContainerBridge;
use crate::core::container::{HostLayout, Invocation};
use crate::core::context::{CliInputs, ExecutionContext};
use crate::core::phase::{JOB_NAME_LABEL, PodSummary};
use crate::core::poll::Sleeper;
use crate::core::resume::ResumeArgs;
use crate::core::types::Bag;
use crate::io::cluster::{ApiError, ClusterApi, ResourceKind};
use crate::io::process::{LaunchMode, Outcome, Supervisor};

pub const ENTRYPOINT: &str = "/opt/docker-playbook/playbook";

/// Supervisor that records invocations and replays scripted outcomes.
///
/// Once the script runs out every invocation succeeds.
#[derive(Debug, Default)]
pub struct ScriptedSupervisor {
    outcomes: RefCell<VecDeque<Outcome>>,
    calls: RefCell<Vec<(Invocation, LaunchMode)>>,
}

impl ScriptedSupervisor {
    pub fn new(outcomes: Vec<Outcome>) -> Self {
        Self {
            outcomes: RefCell::new(outcomes.into()),
            calls: RefCell::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<(Invocation, LaunchMode)> {
        self.calls.borrow().clone()
    }
}

impl Supervisor for ScriptedSupervisor {
    fn run(&self, invocation: &Invocation, mode: LaunchMode) -> Result<Outcome> {
        self.calls.borrow_mut().push((invocation.clone(), mode));
        Ok(self
            .outcomes
            .borrow_mut()
            .pop_front()
            .unwrap_or(Outcome::Completed { code: 0 }))
    }
}

/// Pluggable action that remembers every context it was given.
#[derive(Debug, Clone, Default)]
pub struct RecordingAction {
    seen: Rc<RefCell<Vec<ExecutionContext>>>,
}

impl RecordingAction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seen(&self) -> Vec<ExecutionContext> {
        self.seen.borrow().clone()
    }
}

impl Action for RecordingAction {
    fn invoke(&self, ctx: &ExecutionContext, _env: &ActionEnv<'_>) -> Result<StepOutcome> {
        self.seen.borrow_mut().push(ctx.clone());
        Ok(StepOutcome::Continue)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSleeper;

impl Sleeper for NoopSleeper {
    fn sleep(&self, _duration: Duration) {}
}

/// In-memory API server.
///
/// `create` echoes the manifest back with a name, namespace and uid filled in.
/// `list_pods` replays samples in order and then repeats the last one.
#[derive(Debug, Default)]
pub struct ScriptedClusterApi {
    namespace: String,
    samples: RefCell<VecDeque<Vec<PodSummary>>>,
    created: RefCell<Vec<(ResourceKind, String, Value)>>,
    create_failure: Option<(u16, String)>,
    list_calls: Cell<u32>,
}

impl ScriptedClusterApi {
    pub fn new(namespace: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            ..Self::default()
        }
    }

    pub fn with_pod_samples(self, samples: Vec<Vec<PodSummary>>) -> Self {
        Self {
            samples: RefCell::new(samples.into()),
            ..self
        }
    }

    pub fn failing_create(self, status: u16, reason: &str) -> Self {
        Self {
            create_failure: Some((status, reason.to_string())),
            ..self
        }
    }

    pub fn created(&self) -> Vec<(ResourceKind, String, Value)> {
        self.created.borrow().clone()
    }

    pub fn pod_list_calls(&self) -> u32 {
        self.list_calls.get()
    }
}

impl ClusterApi for ScriptedClusterApi {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn create(
        &self,
        kind: ResourceKind,
        namespace: &str,
        manifest: &Value,
    ) -> Result<Value, ApiError> {
        if let Some((status, reason)) = &self.create_failure {
            return Err(ApiError::Status {
                status: *status,
                reason: reason.clone(),
                body: json!({ "kind": "Status", "reason": reason }).to_string(),
            });
        }
        let mut created = manifest.clone();
        let serial = self.created.borrow().len() + 1;
        let metadata = created
            .as_object_mut()
            .map(|obj| obj.entry("metadata").or_insert_with(|| json!({})))
            .and_then(Value::as_object_mut)
            .ok_or_else(|| ApiError::Malformed("manifest is not a mapping".to_string()))?;
        if !metadata.contains_key("name") {
            let prefix = metadata
                .get("generateName")
                .and_then(Value::as_str)
                .unwrap_or("gen-")
                .to_string();
            metadata.insert("name".to_string(), json!(format!("{prefix}x7k2q")));
        }
        if kind.is_namespaced() {
            metadata.insert("namespace".to_string(), json!(namespace));
        }
        metadata.insert("uid".to_string(), json!(format!("uid-{serial}")));
        self.created
            .borrow_mut()
            .push((kind, namespace.to_string(), manifest.clone()));
        Ok(created)
    }

    fn list_pods(&self, _namespace: &str) -> Result<Vec<PodSummary>, ApiError> {
        self.list_calls.set(self.list_calls.get() + 1);
        let mut samples = self.samples.borrow_mut();
        if samples.len() > 1 {
            Ok(samples.pop_front().unwrap_or_default())
        } else {
            Ok(samples.front().cloned().unwrap_or_default())
        }
    }
}

/// A pod created by job `job` in `phase`.
pub fn job_pod(name: &str, job: &str, phase: &str) -> PodSummary {
    PodSummary {
        name: name.to_string(),
        labels: BTreeMap::from([(JOB_NAME_LABEL.to_string(), job.to_string())]),
        phase: Some(phase.to_string()),
    }
}

pub fn host_layout() -> HostLayout {
    HostLayout {
        runtime: "docker".to_string(),
        source_dir: PathBuf::from("/srv/playbook"),
        mount_point: "/opt/docker-playbook".to_string(),
        workdir: "/home/developer/workspace".to_string(),
        container_home: "/home/developer".to_string(),
        host_home: Some(PathBuf::from("/home/alice")),
        cwd: PathBuf::from("/work/project"),
    }
}

/// Command-line inputs as `playbook <playbook>` with no flags.
pub fn cli_inputs(playbook: &str) -> CliInputs {
    CliInputs::new()
        .with("playbook", Some(json!(playbook)), None)
        .with("relocate", None, None)
        .with("container_name", None, None)
        .with("verbose", Some(json!(0)), Some(json!(0)))
}

pub fn plain_context(action: &str) -> ExecutionContext {
    ExecutionContext {
        action: action.to_string(),
        name: None,
        playbook: Some("site.yml".to_string()),
        relocate: None,
        container_name: None,
        docker: None,
        extra: Bag::new(),
    }
}

pub fn context_with_docker(docker: Value) -> ExecutionContext {
    let docker = match docker {
        Value::Object(map) => map,
        other => panic!("docker must be a mapping, got {other}"),
    };
    ExecutionContext {
        docker: Some(docker),
        ..plain_context("train")
    }
}

/// A scripted supervisor plus the host layout a bridge needs.
pub struct TestRig {
    pub supervisor: ScriptedSupervisor,
    pub layout: HostLayout,
}

impl TestRig {
    pub fn new(outcomes: Vec<Outcome>) -> Self {
        Self {
            supervisor: ScriptedSupervisor::new(outcomes),
            layout: host_layout(),
        }
    }

    pub fn bridge(&self) -> ContainerBridge<'_> {
        ContainerBridge::new(
            &self.layout,
            ENTRYPOINT,
            "site.yml",
            ResumeArgs::default(),
            &self.supervisor,
        )
    }

    pub fn env(&self, step: usize, inside_container: bool) -> ActionEnv<'_> {
        ActionEnv {
            step,
            inside_container,
            bridge: self.bridge(),
            supervisor: &self.supervisor,
        }
    }
}

//! Step actions and the registry the orchestrator dispatches through.

pub mod builtin;
pub mod ctxdump;
pub mod k8s_job;
pub mod shell;

use std::collections::BTreeMap;

use anyhow::Result;

use crate::bridge::ContainerBridge;
use crate::core::context::ExecutionContext;
use crate::core::poll::ThreadSleeper;
use crate::io::cluster::LazyClusterApi;
use crate::io::config::PlaybookConfig;
use crate::io::process::Supervisor;

/// What the orchestrator does after a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Continue,
    /// Stop the playbook and exit with `code`.
    Terminate { code: i32 },
}

/// Built-ins steer the run itself and never cause container re-entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Pluggable,
    BuiltIn,
}

/// Everything an action may touch besides its context.
pub struct ActionEnv<'a> {
    /// Zero-based index of the running step.
    pub step: usize,
    pub inside_container: bool,
    pub bridge: ContainerBridge<'a>,
    pub supervisor: &'a dyn Supervisor,
}

pub trait Action {
    fn kind(&self) -> ActionKind {
        ActionKind::Pluggable
    }

    fn invoke(&self, ctx: &ExecutionContext, env: &ActionEnv<'_>) -> Result<StepOutcome>;
}

/// Action name to implementation.
#[derive(Default)]
pub struct ActionRegistry {
    actions: BTreeMap<String, Box<dyn Action>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `action` under `name`, replacing any previous entry.
    pub fn register(&mut self, name: impl Into<String>, action: Box<dyn Action>) {
        self.actions.insert(name.into(), action);
    }

    pub fn get(&self, name: &str) -> Option<&dyn Action> {
        self.actions.get(name).map(|action| action.as_ref())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.actions.keys().map(String::as_str)
    }
}

/// The stock catalog: `sys_exit`, `sys_shell`, `shell`, `ctxdump`, `k8s_job`.
pub fn default_registry(cfg: &PlaybookConfig) -> ActionRegistry {
    let mut registry = ActionRegistry::new();
    registry.register(builtin::SYS_EXIT, Box::new(builtin::SysExit));
    registry.register(builtin::SYS_SHELL, Box::new(builtin::SysShell));
    registry.register(shell::NAME, Box::new(shell::Shell));
    registry.register(ctxdump::NAME, Box::new(ctxdump::CtxDump));
    registry.register(
        k8s_job::NAME,
        Box::new(k8s_job::K8sJob::new(
            LazyClusterApi::new(cfg.cluster.clone()),
            ThreadSleeper,
            cfg.watch.policy(),
            cfg.watch.terminal(),
        )),
    );
    registry
}

//! Running a playbook: every step on the host, or one step after re-entry.

use anyhow::{Context, Result};
use tracing::{info, instrument, warn};

use crate::actions::{ActionEnv, ActionKind, ActionRegistry, StepOutcome};
use crate::bridge::{ContainerBridge, requires_reentry};
use crate::core::context::ContextResolver;
use crate::core::resume::RunMode;
use crate::core::types::{Playbook, Step};
use crate::error::PlaybookError;
use crate::exit_codes;
use crate::io::process::Supervisor;

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every step ran (or was skipped) without asking to stop.
    Completed,
    /// Step `step` (zero-based) stopped the run with `code`.
    Terminated { step: usize, code: i32 },
}

impl RunOutcome {
    pub fn exit_code(self) -> i32 {
        match self {
            RunOutcome::Completed => exit_codes::OK,
            RunOutcome::Terminated { code, .. } => code,
        }
    }
}

pub struct Orchestrator<'a> {
    registry: &'a ActionRegistry,
    playbook: &'a Playbook,
    resolver: ContextResolver<'a>,
    bridge: ContainerBridge<'a>,
    supervisor: &'a dyn Supervisor,
    inside_container: bool,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        registry: &'a ActionRegistry,
        playbook: &'a Playbook,
        resolver: ContextResolver<'a>,
        bridge: ContainerBridge<'a>,
        supervisor: &'a dyn Supervisor,
        inside_container: bool,
    ) -> Self {
        Self {
            registry,
            playbook,
            resolver,
            bridge,
            supervisor,
            inside_container,
        }
    }

    pub fn run(&self, mode: RunMode) -> Result<RunOutcome> {
        match mode {
            RunMode::Host => self.run_all(),
            RunMode::Resumed { step } => self.run_resumed(step),
        }
    }

    fn run_all(&self) -> Result<RunOutcome> {
        for (index, step) in self.playbook.steps.iter().enumerate() {
            let outcome = self
                .run_step(index, step)
                .with_context(|| format!("step {} ({})", index + 1, step.label()))?;
            if let StepOutcome::Terminate { code } = outcome {
                info!(step = index + 1, code, "playbook stopped");
                return Ok(RunOutcome::Terminated { step: index, code });
            }
        }
        Ok(RunOutcome::Completed)
    }

    fn run_resumed(&self, index: usize) -> Result<RunOutcome> {
        let step = self.playbook.steps.get(index).ok_or_else(|| {
            PlaybookError::Config(format!(
                "resume index {index} is out of range (playbook has {} steps)",
                self.playbook.steps.len()
            ))
        })?;
        let outcome = self
            .run_step(index, step)
            .with_context(|| format!("step {} ({})", index + 1, step.label()))?;
        Ok(match outcome {
            StepOutcome::Continue => RunOutcome::Completed,
            StepOutcome::Terminate { code } => RunOutcome::Terminated { step: index, code },
        })
    }

    #[instrument(skip_all, fields(step = index + 1, action = %step.action))]
    fn run_step(&self, index: usize, step: &Step) -> Result<StepOutcome> {
        let Some(action) = self.registry.get(&step.action) else {
            warn!("action not recognized; skipping step");
            return Ok(StepOutcome::Continue);
        };
        let ctx = self.resolver.resolve(step, self.inside_container)?;
        info!(name = step.label(), inside = self.inside_container, "step");

        if action.kind() == ActionKind::Pluggable && requires_reentry(&ctx, self.inside_container)
        {
            return self.bridge.reenter(&ctx, index);
        }
        let env = ActionEnv {
            step: index,
            inside_container: self.inside_container,
            bridge: self.bridge.clone(),
            supervisor: self.supervisor,
        };
        action.invoke(&ctx, &env)
    }
}

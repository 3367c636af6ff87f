//! Re-running a step inside a container.
//!
//! The host process starts a fresh container whose command is this program again,
//! pinned to one step index. The container's exit status becomes the step's.

use anyhow::Result;
use tracing::{info, instrument, warn};

use crate::actions::StepOutcome;
use crate::core::container::{ContainerSpec, HostLayout, run_invocation};
use crate::core::context::ExecutionContext;
use crate::core::resume::{ResumeArgs, resume_command};
use crate::error::PlaybookError;
use crate::io::process::{LaunchMode, Outcome, Supervisor};

/// A step leaves the host iff it asks for a container and we are not in one.
pub fn requires_reentry(ctx: &ExecutionContext, inside_container: bool) -> bool {
    ctx.docker.is_some() && !inside_container
}

#[derive(Clone)]
pub struct ContainerBridge<'a> {
    layout: &'a HostLayout,
    entrypoint: &'a str,
    /// Playbook reference exactly as given on the host command line.
    playbook: &'a str,
    resume: ResumeArgs,
    supervisor: &'a dyn Supervisor,
}

impl<'a> ContainerBridge<'a> {
    pub fn new(
        layout: &'a HostLayout,
        entrypoint: &'a str,
        playbook: &'a str,
        resume: ResumeArgs,
        supervisor: &'a dyn Supervisor,
    ) -> Self {
        Self {
            layout,
            entrypoint,
            playbook,
            resume,
            supervisor,
        }
    }

    /// Run `command` in a container described by `spec`.
    ///
    /// Interactive specs replace this process; otherwise a non-zero exit becomes
    /// [`PlaybookError::ChildExit`].
    pub fn launch(
        &self,
        spec: &ContainerSpec,
        container_name: Option<&str>,
        command: &[String],
    ) -> Result<StepOutcome> {
        let invocation = run_invocation(spec, self.layout, container_name, command)?;
        info!(command = %invocation, "starting container");
        let mode = if spec.interactive {
            LaunchMode::Replace
        } else {
            LaunchMode::Wait
        };
        match self.supervisor.run(&invocation, mode)? {
            Outcome::Completed { code: 0 } => Ok(StepOutcome::Continue),
            Outcome::Completed { code } => {
                warn!(code, image = %spec.image, "container failed");
                Err(PlaybookError::ChildExit { code }.into())
            }
            Outcome::Replaced => Ok(StepOutcome::Terminate { code: 0 }),
        }
    }

    /// Re-invoke this program in the step's container, resuming at `step`.
    #[instrument(skip_all, fields(step = step))]
    pub fn reenter(&self, ctx: &ExecutionContext, step: usize) -> Result<StepOutcome> {
        let docker = ctx.docker.as_ref().ok_or_else(|| {
            PlaybookError::Config(format!("step {} has no docker mapping", step + 1))
        })?;
        let spec = ContainerSpec::from_mapping(docker)?;
        let command = resume_command(self.entrypoint, step, self.playbook, &self.resume);
        self.launch(&spec, ctx.container_name.as_deref(), &command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedSupervisor, context_with_docker, host_layout};
    use serde_json::json;

    #[test]
    fn reentry_needs_docker_and_host() {
        let with = context_with_docker(json!({ "image": "busybox" }));
        let mut without = with.clone();
        without.docker = None;

        assert!(requires_reentry(&with, false));
        assert!(!requires_reentry(&with, true));
        assert!(!requires_reentry(&without, false));
    }

    #[test]
    fn reenter_runs_resume_command_in_container() {
        let layout = host_layout();
        let supervisor = ScriptedSupervisor::new(vec![Outcome::Completed { code: 0 }]);
        let bridge = ContainerBridge::new(
            &layout,
            "/opt/docker-playbook/playbook",
            "site.yml",
            ResumeArgs {
                verbose: 1,
                ..ResumeArgs::default()
            },
            &supervisor,
        );
        let ctx = context_with_docker(json!({ "image": "busybox" }));

        let outcome = bridge.reenter(&ctx, 4).expect("reenter");

        assert_eq!(outcome, StepOutcome::Continue);
        let calls = supervisor.calls();
        assert_eq!(calls.len(), 1);
        let (invocation, mode) = &calls[0];
        assert_eq!(*mode, LaunchMode::Wait);
        assert_eq!(invocation.program, "docker");
        let tail = &invocation.args[invocation.args.len() - 4..];
        assert_eq!(
            tail.to_vec(),
            vec!["/opt/docker-playbook/playbook", "--docker-step=4", "site.yml", "-v"]
        );
    }

    #[test]
    fn nonzero_container_exit_becomes_child_exit() {
        let layout = host_layout();
        let supervisor = ScriptedSupervisor::new(vec![Outcome::Completed { code: 137 }]);
        let bridge = ContainerBridge::new(&layout, "pb", "site.yml", ResumeArgs::default(), &supervisor);
        let ctx = context_with_docker(json!({ "image": "busybox" }));

        let err = bridge.reenter(&ctx, 0).unwrap_err();

        assert!(matches!(
            err.downcast_ref::<PlaybookError>(),
            Some(PlaybookError::ChildExit { code: 137 })
        ));
    }

    #[test]
    fn interactive_containers_replace_the_process() {
        let layout = host_layout();
        let supervisor = ScriptedSupervisor::new(vec![Outcome::Replaced]);
        let bridge = ContainerBridge::new(&layout, "pb", "site.yml", ResumeArgs::default(), &supervisor);
        let ctx = context_with_docker(json!({ "image": "busybox", "interactive": true }));

        let outcome = bridge.reenter(&ctx, 0).expect("reenter");

        assert_eq!(outcome, StepOutcome::Terminate { code: 0 });
        assert_eq!(supervisor.calls()[0].1, LaunchMode::Replace);
        assert!(supervisor.calls()[0].0.args.contains(&"-i".to_string()));
    }
}

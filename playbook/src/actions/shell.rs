//! `shell`: run a command where the step runs.

use anyhow::Result;
use serde_json::Value;
use tracing::{info, instrument};

use crate::actions::{Action, ActionEnv, StepOutcome};
use crate::core::container::Invocation;
use crate::core::context::ExecutionContext;
use crate::error::PlaybookError;
use crate::io::process::{LaunchMode, Outcome};

pub const NAME: &str = "shell";

/// Runs `command` (an argv list, or a string for `sh -c`) and fails the step on a
/// non-zero exit.
pub struct Shell;

impl Action for Shell {
    #[instrument(skip_all, fields(step = env.step))]
    fn invoke(&self, ctx: &ExecutionContext, env: &ActionEnv<'_>) -> Result<StepOutcome> {
        let invocation = command_of(ctx)?;
        info!(command = %invocation, "running");
        match env.supervisor.run(&invocation, LaunchMode::Wait)? {
            Outcome::Completed { code: 0 } => Ok(StepOutcome::Continue),
            Outcome::Completed { code } => Err(PlaybookError::ChildExit { code }.into()),
            Outcome::Replaced => Ok(StepOutcome::Terminate { code: 0 }),
        }
    }
}

fn command_of(ctx: &ExecutionContext) -> Result<Invocation, PlaybookError> {
    match ctx.get("command") {
        Some(Value::String(script)) => Ok(Invocation::new(
            "sh",
            vec!["-c".to_string(), script.clone()],
        )),
        Some(Value::Array(words)) => {
            let mut argv = words.iter().map(|word| match word {
                Value::String(s) => Ok(s.clone()),
                Value::Number(n) => Ok(n.to_string()),
                other => Err(PlaybookError::Config(format!(
                    "`command` words must be strings, got {other}"
                ))),
            });
            let program = argv.next().ok_or_else(|| {
                PlaybookError::Config("`command` must not be empty".to_string())
            })??;
            let args = argv.collect::<Result<Vec<_>, _>>()?;
            Ok(Invocation::new(program, args))
        }
        Some(other) => Err(PlaybookError::Config(format!(
            "`command` must be a string or a list, got {other}"
        ))),
        None => Err(PlaybookError::Config(
            "shell step needs a `command`".to_string(),
        )),
    }
}

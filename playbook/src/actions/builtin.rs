//! Control actions: `sys_exit` and `sys_shell`.

use anyhow::Result;
use serde_json::Value;
use tracing::{error, warn};

use crate::actions::{Action, ActionEnv, ActionKind, StepOutcome};
use crate::core::container::ContainerSpec;
use crate::core::context::ExecutionContext;
use crate::error::PlaybookError;

pub const SYS_EXIT: &str = "sys_exit";
pub const SYS_SHELL: &str = "sys_shell";

/// Stop the playbook with `exit_code` (default 0). Codes are process statuses,
/// so only `0..=255` is accepted.
pub struct SysExit;

impl Action for SysExit {
    fn kind(&self) -> ActionKind {
        ActionKind::BuiltIn
    }

    fn invoke(&self, ctx: &ExecutionContext, _env: &ActionEnv<'_>) -> Result<StepOutcome> {
        let code = match ctx.get("exit_code") {
            None | Some(Value::Null) => 0,
            Some(value) => value
                .as_u64()
                .and_then(|code| u8::try_from(code).ok())
                .map(i32::from)
                .ok_or_else(|| {
                    PlaybookError::Config(format!(
                        "`exit_code` must be an integer in 0..=255, got {value}"
                    ))
                })?,
        };
        Ok(StepOutcome::Terminate { code })
    }
}

/// Open a shell in the step's container, then end the run.
///
/// With a `bash: [...]` list the words are run through `bash -c` instead of an
/// interactive session. Refused inside a container.
pub struct SysShell;

impl Action for SysShell {
    fn kind(&self) -> ActionKind {
        ActionKind::BuiltIn
    }

    fn invoke(&self, ctx: &ExecutionContext, env: &ActionEnv<'_>) -> Result<StepOutcome> {
        if env.inside_container {
            warn!("shell access from inside a container is denied (possible privilege escalation)");
            return Ok(StepOutcome::Terminate { code: 0 });
        }
        let docker = ctx.docker.as_ref().ok_or_else(|| {
            error!("sys_shell needs a docker context");
            PlaybookError::Syntax("sys_shell step has no `docker` mapping".to_string())
        })?;
        let mut spec = ContainerSpec::from_mapping(docker)?;
        let command = match ctx.get("bash") {
            Some(Value::Array(words)) => {
                vec!["bash".to_string(), "-c".to_string(), join_words(words)]
            }
            None | Some(Value::Null) => {
                warn!("starting a plain bash shell");
                spec.interactive = true;
                vec!["bash".to_string()]
            }
            Some(other) => {
                return Err(
                    PlaybookError::Config(format!("`bash` must be a list, got {other}")).into(),
                );
            }
        };
        env.bridge
            .launch(&spec, ctx.container_name.as_deref(), &command)?;
        Ok(StepOutcome::Terminate { code: 0 })
    }
}

/// Join words into one shell line, double-quoting words that contain spaces.
fn join_words(words: &[Value]) -> String {
    words
        .iter()
        .map(|word| match word {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .map(|word| {
            if word.contains(' ') {
                format!("\"{word}\"")
            } else {
                word
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

//! Launching external programs and translating how they ended.

use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::process::{Command, ExitStatus, Stdio};

use anyhow::{Context, Result};
use tracing::{debug, error, instrument};

use crate::core::container::Invocation;
use crate::exit_codes;

/// How an invocation takes over control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchMode {
    /// Spawn a child and block until it ends.
    Wait,
    /// Replace the current process image. Only returns on failure.
    Replace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed { code: i32 },
    /// The process image was handed over. Real supervisors never produce this;
    /// test doubles do, so callers must handle it.
    Replaced,
}

pub trait Supervisor {
    fn run(&self, invocation: &Invocation, mode: LaunchMode) -> Result<Outcome>;
}

/// Runs invocations as real OS processes with inherited stdio.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessSupervisor;

impl Supervisor for ProcessSupervisor {
    #[instrument(skip_all, fields(program = %invocation.program, mode = ?mode))]
    fn run(&self, invocation: &Invocation, mode: LaunchMode) -> Result<Outcome> {
        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args);
        match mode {
            LaunchMode::Replace => {
                debug!("replacing process image");
                let err = cmd.exec();
                error!(err = %err, "exec failed");
                Err(err).with_context(|| format!("exec {}", invocation.program))
            }
            LaunchMode::Wait => {
                cmd.stdin(Stdio::inherit())
                    .stdout(Stdio::inherit())
                    .stderr(Stdio::inherit());
                debug!("spawning child process");
                let mut child = match cmd.spawn() {
                    Ok(c) => c,
                    Err(e) => {
                        error!(err = %e, "failed to spawn command");
                        return Err(e).with_context(|| format!("spawn {}", invocation.program));
                    }
                };
                let status = child
                    .wait()
                    .with_context(|| format!("wait for {}", invocation.program))?;
                let code = exit_code_of(status);
                debug!(code, "child finished");
                Ok(Outcome::Completed { code })
            }
        }
    }
}

/// The child's exit code, or `128 + signal` if it was killed.
pub fn exit_code_of(status: ExitStatus) -> i32 {
    match (status.code(), status.signal()) {
        (Some(code), _) => code,
        (None, Some(signal)) => 128 + signal,
        (None, None) => exit_codes::ERR_SYS,
    }
}

//! Typed failures that decide the process exit code.
//!
//! Most code returns `anyhow::Result`; these variants are raised where the exit
//! code matters and recovered with [`crate::exit_codes::for_error`].

use thiserror::Error;

use crate::exit_codes;

#[derive(Debug, Error)]
pub enum PlaybookError {
    /// A supervised child (usually a container) terminated unsuccessfully.
    #[error("child process exited with status {code}")]
    ChildExit { code: i32 },

    /// Invocation or configuration is inconsistent.
    #[error("configuration error: {0}")]
    Config(String),

    /// The playbook document is malformed.
    #[error("syntax error: {0}")]
    Syntax(String),

    /// A step action failed for a reason other than a child exit status.
    #[error("task failed: {0}")]
    Task(String),
}

impl PlaybookError {
    pub fn exit_code(&self) -> i32 {
        match self {
            PlaybookError::ChildExit { code } => *code,
            PlaybookError::Config(_) => exit_codes::ERR_APP,
            PlaybookError::Syntax(_) => exit_codes::ERR_YAML,
            PlaybookError::Task(_) => exit_codes::ERR_TASK,
        }
    }
}

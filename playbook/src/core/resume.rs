//! Resume protocol across the container boundary.
//!
//! The host never serializes step state. It passes the step index and the
//! original playbook reference; the re-entered process reloads the playbook and
//! rebuilds the same step and context on its own.

use std::path::{Path, PathBuf};

use crate::error::PlaybookError;

/// Flag carrying the resume index. Its presence alone means "resumed mode".
pub const STEP_FLAG: &str = "--docker-step";
pub const RELOCATE_FLAG: &str = "--relocate";
pub const CONTAINER_NAME_FLAG: &str = "--container-name";
/// Inline TOML engine config; replaces `--config` in a re-entered process.
pub const ENGINE_CONFIG_FLAG: &str = "--engine-config";

/// How this process participates in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Iterate every step on the host.
    Host,
    /// Run exactly one step inside a container.
    Resumed { step: usize },
}

/// Reconcile container detection with the presence of a resume index.
///
/// Either signal without the other is an invocation error.
pub fn check_mode(inside_container: bool, resume: Option<usize>) -> Result<RunMode, PlaybookError> {
    match (inside_container, resume) {
        (false, None) => Ok(RunMode::Host),
        (true, Some(step)) => Ok(RunMode::Resumed { step }),
        (true, None) => Err(PlaybookError::Config(format!(
            "running inside a container without {STEP_FLAG}"
        ))),
        (false, Some(step)) => Err(PlaybookError::Config(format!(
            "{STEP_FLAG}={step} given but not running inside a container"
        ))),
    }
}

/// Arguments forwarded verbatim from the host invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResumeArgs {
    pub relocate: Option<String>,
    pub container_name: Option<String>,
    /// The host's effective engine config as TOML.
    pub engine_config: Option<String>,
    pub verbose: u8,
}

/// Command that re-invokes the program inside the container at `step`.
pub fn resume_command(
    entrypoint: &str,
    step: usize,
    playbook: &str,
    args: &ResumeArgs,
) -> Vec<String> {
    let mut cmd = vec![
        entrypoint.to_string(),
        format!("{STEP_FLAG}={step}"),
        playbook.to_string(),
    ];
    if let Some(relocate) = &args.relocate {
        cmd.push(RELOCATE_FLAG.to_string());
        cmd.push(relocate.clone());
    }
    if let Some(name) = &args.container_name {
        cmd.push(CONTAINER_NAME_FLAG.to_string());
        cmd.push(name.clone());
    }
    if let Some(config) = &args.engine_config {
        cmd.push(ENGINE_CONFIG_FLAG.to_string());
        cmd.push(config.clone());
    }
    if args.verbose > 0 {
        cmd.push(format!("-{}", "v".repeat(usize::from(args.verbose))));
    }
    cmd
}

/// Where a re-entered process finds the playbook.
///
/// Relative references point into the read-only program mount. Absolute ones
/// only make sense on the host, so the caller must have mounted the playbook
/// directory and told us where via `--relocate`.
pub fn locate_playbook(
    playbook: &Path,
    relocate: Option<&Path>,
    mount_point: &Path,
) -> Result<PathBuf, PlaybookError> {
    if playbook.is_absolute() {
        let relocate = relocate.ok_or_else(|| {
            PlaybookError::Config(format!(
                "absolute playbook path {} requires {RELOCATE_FLAG} inside a container",
                playbook.display()
            ))
        })?;
        let file_name = playbook.file_name().ok_or_else(|| {
            PlaybookError::Config(format!("playbook path {} has no file name", playbook.display()))
        })?;
        Ok(relocate.join(file_name))
    } else {
        Ok(mount_point.join(playbook))
    }
}

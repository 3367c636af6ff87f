//! Stable exit codes for the playbook CLI.
//!
//! Child container failures are not listed here: they surface with the child's own
//! code (or `128 + signal`), see [`crate::io::process::exit_code_of`].

use crate::error::PlaybookError;

/// The playbook ran to completion (or a step asked to stop with success).
pub const OK: i32 = 0;
/// Host-level failure: I/O, spawning processes, reading files.
pub const ERR_SYS: i32 = 1;
/// Invalid invocation or configuration (inconsistent container signals, bad config).
pub const ERR_APP: i32 = 2;
/// The playbook document is malformed.
pub const ERR_YAML: i32 = 3;
/// A step action failed.
pub const ERR_TASK: i32 = 4;

/// Map an error chain to the exit code reported to the caller.
///
/// The first [`PlaybookError`] found in the chain decides; anything else is a
/// system error.
pub fn for_error(err: &anyhow::Error) -> i32 {
    err.downcast_ref::<PlaybookError>()
        .or_else(|| {
            err.chain()
                .find_map(|cause| cause.downcast_ref::<PlaybookError>())
        })
        .map_or(ERR_SYS, PlaybookError::exit_code)
}

//! `ctxdump`: write the resolved context to disk.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::actions::{Action, ActionEnv, StepOutcome};
use crate::core::context::ExecutionContext;
use crate::error::PlaybookError;

pub const NAME: &str = "ctxdump";

/// Dumps the step's context as YAML into the `ctxdump` directory.
///
/// The file name carries a digest of the contents, so identical contexts (for
/// example the host and resumed views of a step) land in the same file.
pub struct CtxDump;

impl Action for CtxDump {
    fn invoke(&self, ctx: &ExecutionContext, _env: &ActionEnv<'_>) -> Result<StepOutcome> {
        let dir = ctx.get_str(NAME).ok_or_else(|| {
            PlaybookError::Config("ctxdump step needs a `ctxdump` directory".to_string())
        })?;
        match dump(ctx, Path::new(dir)) {
            Ok(path) => info!(path = %path.display(), "context dumped"),
            Err(err) => warn!(err = %format!("{err:#}"), "failed to dump context"),
        }
        Ok(StepOutcome::Continue)
    }
}

/// Write `ctx` to `<dir>/ctxdump-<sha256>.yml` and return the path.
pub fn dump(ctx: &ExecutionContext, dir: &Path) -> Result<PathBuf> {
    let contents =
        serde_yaml::to_string(&Value::Object(ctx.to_bag())).context("serialize context")?;
    let digest = hex::encode(Sha256::digest(contents.as_bytes()));
    fs::create_dir_all(dir).with_context(|| format!("create directory {}", dir.display()))?;
    let path = dir.join(format!("ctxdump-{digest}.yml"));
    fs::write(&path, &contents).with_context(|| format!("write {}", path.display()))?;
    Ok(path)
}

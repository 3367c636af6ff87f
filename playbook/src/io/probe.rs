//! Container detection.

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::io::config::Detection;

/// Environment override: `1` forces container mode, `0` forces host mode.
pub const INSIDE_CONTAINER_ENV: &str = "PLAYBOOK_INSIDE_CONTAINER";

/// Decide whether this process runs inside a container.
///
/// The environment variable wins over configuration, which wins over probing.
pub fn inside_container(detection: Detection) -> bool {
    let from_env = std::env::var(INSIDE_CONTAINER_ENV).ok();
    let inside = decide(
        from_env.as_deref(),
        detection,
        || detect_from(Path::new("/.dockerenv"), Path::new("/proc/1/cgroup")),
    );
    debug!(inside, ?detection, env = ?from_env, "container detection");
    inside
}

fn decide(env: Option<&str>, detection: Detection, probe: impl FnOnce() -> bool) -> bool {
    match env.map(str::trim) {
        Some("1") | Some("true") => return true,
        Some("0") | Some("false") => return false,
        _ => {}
    }
    match detection {
        Detection::Host => false,
        Detection::Container => true,
        Detection::Auto => probe(),
    }
}

/// Probe the filesystem markers a Docker-style runtime leaves behind.
pub fn detect_from(dockerenv: &Path, cgroup: &Path) -> bool {
    if dockerenv.exists() {
        return true;
    }
    fs::read_to_string(cgroup)
        .map(|contents| contents.contains("docker"))
        .unwrap_or(false)
}

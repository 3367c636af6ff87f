//! Engine configuration stored in `playbook.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::phase::TerminalPhases;
use crate::core::poll::PollPolicy;
use crate::error::PlaybookError;

/// Engine configuration (TOML).
///
/// Every field has a default, so a missing file behaves like an empty one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct PlaybookConfig {
    pub container: ContainerConfig,
    pub cluster: ClusterConfig,
    pub watch: WatchConfig,
}

/// How the process decides whether it already runs inside a container.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Detection {
    #[default]
    Auto,
    Host,
    Container,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ContainerConfig {
    /// Container runtime binary.
    pub runtime: String,
    /// In-container mount point of the program directory.
    pub mount_point: String,
    /// Program path inside the container used for re-entry.
    pub entrypoint: String,
    pub workdir: String,
    /// Home directory of the container user (X authority target).
    pub home: String,
    /// Host directory mounted at `mount_point`; defaults to the executable's directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_dir: Option<PathBuf>,
    pub detection: Detection,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            runtime: "docker".to_string(),
            mount_point: "/opt/docker-playbook".to_string(),
            entrypoint: "/opt/docker-playbook/playbook".to_string(),
            workdir: "/home/developer/workspace".to_string(),
            home: "/home/developer".to_string(),
            source_dir: None,
            detection: Detection::Auto,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ClusterConfig {
    /// API server URL. Unset means in-cluster discovery.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_server: Option<String>,
    pub namespace: String,
    pub token_path: PathBuf,
    pub ca_path: PathBuf,
    pub timeout_secs: u64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        let sa = Path::new("/var/run/secrets/kubernetes.io/serviceaccount");
        Self {
            api_server: None,
            namespace: "default".to_string(),
            token_path: sa.join("token"),
            ca_path: sa.join("ca.crt"),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WatchConfig {
    pub interval_secs: u64,
    pub backoff_multiplier: f64,
    pub max_interval_secs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline_secs: Option<u64>,
    pub terminal_phases: Vec<String>,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            interval_secs: 3,
            backoff_multiplier: 1.0,
            max_interval_secs: 60,
            max_attempts: None,
            deadline_secs: None,
            terminal_phases: vec![
                "Succeeded".to_string(),
                "Failed".to_string(),
                "Unknown".to_string(),
            ],
        }
    }
}

impl WatchConfig {
    pub fn policy(&self) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_secs(self.interval_secs),
            multiplier: self.backoff_multiplier,
            max_interval: Duration::from_secs(self.max_interval_secs),
            max_attempts: self.max_attempts,
            deadline: self.deadline_secs.map(Duration::from_secs),
        }
    }

    pub fn terminal(&self) -> TerminalPhases {
        TerminalPhases::new(self.terminal_phases.iter().cloned())
    }
}

impl PlaybookConfig {
    pub fn validate(&self) -> Result<(), PlaybookError> {
        let invalid = |msg: &str| Err(PlaybookError::Config(msg.to_string()));
        if self.container.runtime.trim().is_empty() {
            return invalid("container.runtime must be non-empty");
        }
        for (key, value) in [
            ("container.mount_point", &self.container.mount_point),
            ("container.entrypoint", &self.container.entrypoint),
            ("container.workdir", &self.container.workdir),
            ("container.home", &self.container.home),
        ] {
            if !value.starts_with('/') {
                return Err(PlaybookError::Config(format!(
                    "{key} must be an absolute path, got `{value}`"
                )));
            }
        }
        if self.cluster.namespace.trim().is_empty() {
            return invalid("cluster.namespace must be non-empty");
        }
        if self.cluster.timeout_secs == 0 {
            return invalid("cluster.timeout_secs must be > 0");
        }
        if self.watch.interval_secs == 0 {
            return invalid("watch.interval_secs must be > 0");
        }
        let multiplier = self.watch.backoff_multiplier;
        if multiplier.is_nan() || multiplier < 1.0 {
            return invalid("watch.backoff_multiplier must be >= 1.0");
        }
        if self.watch.max_interval_secs < self.watch.interval_secs {
            return invalid("watch.max_interval_secs must be >= watch.interval_secs");
        }
        if self.watch.max_attempts == Some(0) {
            return invalid("watch.max_attempts must be > 0 when set");
        }
        if self.watch.terminal_phases.is_empty() {
            return invalid("watch.terminal_phases must be a non-empty array");
        }
        Ok(())
    }

    /// The config a re-entered process should run with, as TOML.
    ///
    /// That process always runs inside a container, and the host source
    /// directory means nothing there.
    pub fn forwarded(&self) -> Result<String> {
        let mut cfg = self.clone();
        cfg.container.detection = Detection::Container;
        cfg.container.source_dir = None;
        toml::to_string(&cfg).context("serialize forwarded config")
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `PlaybookConfig::default()`.
pub fn load_config(path: &Path) -> Result<PlaybookConfig> {
    if !path.exists() {
        return Ok(PlaybookConfig::default());
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    parse_config(&contents, &path.display().to_string())
}

/// Parse and validate TOML config text; `origin` names it in errors.
pub fn parse_config(contents: &str, origin: &str) -> Result<PlaybookConfig> {
    let cfg: PlaybookConfig = toml::from_str(contents)
        .map_err(|err| PlaybookError::Config(format!("parse {origin}: {err}")))?;
    cfg.validate()
        .with_context(|| format!("validate {origin}"))?;
    Ok(cfg)
}

//! The `playbook` command: load everything, pick a mode, run.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use serde_json::json;
use tracing::{debug, info};

use crate::actions::{ActionRegistry, default_registry};
use crate::bridge::ContainerBridge;
use crate::core::container::{HostLayout, absolutize};
use crate::core::context::{CliInputs, ContextResolver};
use crate::core::resume::{ResumeArgs, RunMode, check_mode, locate_playbook};
use crate::core::types::Playbook;
use crate::io::config::{ContainerConfig, PlaybookConfig, load_config, parse_config};
use crate::io::playbook::load_playbook;
use crate::io::probe::inside_container;
use crate::io::process::{ProcessSupervisor, Supervisor};
use crate::orchestrator::{Orchestrator, RunOutcome};

#[derive(Debug, Clone, Parser)]
#[command(
    name = "playbook",
    version,
    about = "Run playbook steps on the host or inside containers"
)]
pub struct PlayArgs {
    /// Engine configuration (missing file means defaults).
    #[arg(long, default_value = "playbook.toml")]
    pub config: PathBuf,

    /// Run only this step; set by the host when it re-enters a container.
    #[arg(long = "docker-step", value_name = "INDEX")]
    pub docker_step: Option<usize>,

    /// Directory inside the container holding an absolutely-referenced playbook.
    #[arg(long)]
    pub relocate: Option<String>,

    /// Name for containers started by this run.
    #[arg(long = "container-name")]
    pub container_name: Option<String>,

    /// Engine config as inline TOML; set by the host when it re-enters a container.
    #[arg(long = "engine-config", value_name = "TOML", hide = true)]
    pub engine_config: Option<String>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Playbook YAML file.
    pub playbook: PathBuf,
}

impl PlayArgs {
    /// The playbook reference exactly as given.
    pub fn playbook_ref(&self) -> String {
        self.playbook.display().to_string()
    }

    /// Command-line inputs that participate in context layering.
    pub fn context_inputs(&self) -> CliInputs {
        CliInputs::new()
            .with("playbook", Some(json!(self.playbook_ref())), None)
            .with("relocate", self.relocate.as_ref().map(|r| json!(r)), None)
            .with(
                "container_name",
                self.container_name.as_ref().map(|n| json!(n)),
                None,
            )
            .with("verbose", Some(json!(self.verbose)), Some(json!(0)))
    }

    pub fn resume_args(&self) -> ResumeArgs {
        ResumeArgs {
            relocate: self.relocate.clone(),
            container_name: self.container_name.clone(),
            engine_config: None,
            verbose: self.verbose,
        }
    }
}

/// Process-level facts a run depends on.
pub struct PlayEnv<'a> {
    pub config: &'a PlaybookConfig,
    pub layout: &'a HostLayout,
    pub registry: &'a ActionRegistry,
    pub supervisor: &'a dyn Supervisor,
    pub inside_container: bool,
}

/// Load configuration and playbook from disk and run with real processes.
pub fn play(args: &PlayArgs) -> Result<RunOutcome> {
    let config = resolve_config(args)?;
    let inside = inside_container(config.container.detection);
    let mode = check_mode(inside, args.docker_step)?;
    let path = match mode {
        RunMode::Host => args.playbook.clone(),
        RunMode::Resumed { .. } => locate_playbook(
            &args.playbook,
            args.relocate.as_deref().map(Path::new),
            Path::new(&config.container.mount_point),
        )?,
    };
    debug!(path = %path.display(), ?mode, "resolved playbook");
    let playbook = load_playbook(&path)?;
    let layout = discover_layout(&config.container)?;
    let registry = default_registry(&config);
    let supervisor = ProcessSupervisor;
    execute(
        &playbook,
        args,
        mode,
        &PlayEnv {
            config: &config,
            layout: &layout,
            registry: &registry,
            supervisor: &supervisor,
            inside_container: inside,
        },
    )
}

/// Engine config for this process: forwarded inline by the host, else `--config`.
pub fn resolve_config(args: &PlayArgs) -> Result<PlaybookConfig> {
    match &args.engine_config {
        Some(text) => parse_config(text, "forwarded engine config"),
        None => load_config(&args.config),
    }
}

/// Run an already loaded playbook.
pub fn execute(
    playbook: &Playbook,
    args: &PlayArgs,
    mode: RunMode,
    env: &PlayEnv<'_>,
) -> Result<RunOutcome> {
    let inputs = args.context_inputs();
    let resolver = ContextResolver::new(&playbook.global, &inputs);
    let playbook_ref = args.playbook_ref();
    let resume = ResumeArgs {
        engine_config: Some(env.config.forwarded()?),
        ..args.resume_args()
    };
    let bridge = ContainerBridge::new(
        env.layout,
        &env.config.container.entrypoint,
        &playbook_ref,
        resume,
        env.supervisor,
    );
    info!(steps = playbook.steps.len(), ?mode, "running playbook");
    let outcome = Orchestrator::new(
        env.registry,
        playbook,
        resolver,
        bridge,
        env.supervisor,
        env.inside_container,
    )
    .run(mode)?;
    info!(?outcome, "playbook finished");
    Ok(outcome)
}

fn discover_layout(cfg: &ContainerConfig) -> Result<HostLayout> {
    let cwd = std::env::current_dir().context("read current directory")?;
    let source_dir = match &cfg.source_dir {
        Some(dir) => absolutize(&cwd, dir),
        None => {
            let exe = std::env::current_exe().context("locate playbook executable")?;
            exe.parent()
                .map(Path::to_path_buf)
                .with_context(|| format!("executable {} has no parent", exe.display()))?
        }
    };
    Ok(HostLayout {
        runtime: cfg.runtime.clone(),
        source_dir,
        mount_point: cfg.mount_point.clone(),
        workdir: cfg.workdir.clone(),
        container_home: cfg.home.clone(),
        host_home: dirs::home_dir(),
        cwd,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_resume_invocation() {
        let args = PlayArgs::try_parse_from([
            "playbook",
            "--docker-step=3",
            "books/site.yml",
            "--relocate",
            "/mnt/pb",
            "-vv",
        ])
        .expect("parse");

        assert_eq!(args.docker_step, Some(3));
        assert_eq!(args.playbook, PathBuf::from("books/site.yml"));
        assert_eq!(args.relocate.as_deref(), Some("/mnt/pb"));
        assert_eq!(args.verbose, 2);
        assert_eq!(args.config, PathBuf::from("playbook.toml"));
    }

    #[test]
    fn verbose_is_explicit_only_when_raised() {
        let quiet = PlayArgs::try_parse_from(["playbook", "site.yml"]).expect("parse");
        let loud = PlayArgs::try_parse_from(["playbook", "-v", "site.yml"]).expect("parse");

        assert_eq!(quiet.context_inputs(), crate::test_support::cli_inputs("site.yml"));
        assert_ne!(loud.context_inputs(), quiet.context_inputs());
    }

    #[test]
    fn forwarded_engine_config_replaces_the_config_file() {
        let args = PlayArgs::try_parse_from([
            "playbook",
            "--config",
            "/nonexistent/playbook.toml",
            "--engine-config",
            "[container]\nmount_point = \"/opt/pb\"\n",
            "site.yml",
        ])
        .expect("parse");

        let cfg = resolve_config(&args).expect("config");

        assert_eq!(cfg.container.mount_point, "/opt/pb");
        assert_eq!(cfg.watch, PlaybookConfig::default().watch);
    }

    #[test]
    fn configured_source_dir_is_absolutized() {
        let cfg = ContainerConfig {
            source_dir: Some(PathBuf::from("/srv/./playbook")),
            ..ContainerConfig::default()
        };
        let layout = discover_layout(&cfg).expect("layout");
        assert_eq!(layout.source_dir, PathBuf::from("/srv/playbook"));
        assert_eq!(layout.mount_point, "/opt/docker-playbook");
    }
}

//! Container specs and the runtime invocation built from them.
//!
//! The flag order is part of the contract (people replay logged invocations):
//! base flags, `--runtime`, `-i`, ports, volumes, GUI forwarding, `--name`,
//! image, command.

use std::fmt;
use std::path::{Component, Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;

use crate::core::types::Bag;
use crate::error::PlaybookError;

/// Declarative container request, read from a context's `docker` mapping.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ContainerSpec {
    pub image: String,
    #[serde(default)]
    pub runtime: Option<String>,
    #[serde(default)]
    pub interactive: bool,
    #[serde(default)]
    pub ports: Vec<String>,
    #[serde(default)]
    pub volumes: Vec<String>,
    #[serde(default)]
    pub gui: bool,
    /// Fallback container name when the context carries no `container_name`.
    #[serde(default)]
    pub name: Option<String>,
}

impl ContainerSpec {
    pub fn from_mapping(docker: &Bag) -> Result<Self, PlaybookError> {
        serde_json::from_value(Value::Object(docker.clone()))
            .map_err(|err| PlaybookError::Config(format!("invalid docker mapping: {err}")))
    }
}

/// Host facts and fixed in-container paths needed to build an invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostLayout {
    /// Container runtime binary (`docker`, `podman`).
    pub runtime: String,
    /// Host directory holding the playbook program and bundled playbooks.
    pub source_dir: PathBuf,
    /// Where `source_dir` is mounted (read-only) inside the container.
    pub mount_point: String,
    /// Working directory inside the container.
    pub workdir: String,
    /// Home directory of the container user.
    pub container_home: String,
    /// Home directory on the host, for X authority forwarding.
    pub host_home: Option<PathBuf>,
    /// Base for resolving relative volume sources.
    pub cwd: PathBuf,
}

/// A program plus its arguments, ready for the process supervisor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
}

impl Invocation {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

impl fmt::Display for Invocation {
    /// Shell-ish rendering for logs; arguments with spaces are single-quoted.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", quote(&self.program))?;
        for arg in &self.args {
            write!(f, " {}", quote(arg))?;
        }
        Ok(())
    }
}

fn quote(arg: &str) -> String {
    if arg.contains(' ') {
        format!("'{arg}'")
    } else {
        arg.to_string()
    }
}

/// Build `<runtime> run ...` for `spec`, ending with `command`.
pub fn run_invocation(
    spec: &ContainerSpec,
    layout: &HostLayout,
    container_name: Option<&str>,
    command: &[String],
) -> Result<Invocation, PlaybookError> {
    let mut args: Vec<String> = vec![
        "run".into(),
        "--rm".into(),
        "-t".into(),
        "-v".into(),
        format!(
            "{}:{}:ro",
            layout.source_dir.display(),
            layout.mount_point
        ),
        "-w".into(),
        layout.workdir.clone(),
    ];
    if let Some(runtime) = &spec.runtime {
        args.push(format!("--runtime={runtime}"));
    }
    if spec.interactive {
        args.push("-i".into());
    }
    for port in &spec.ports {
        args.push("-p".into());
        args.push(port.clone());
    }
    for volume in &spec.volumes {
        args.push("-v".into());
        args.push(resolve_volume(volume, &layout.cwd)?);
    }
    if spec.gui {
        let host_home = layout.host_home.as_ref().ok_or_else(|| {
            PlaybookError::Config("gui forwarding needs a host home directory".to_string())
        })?;
        args.extend([
            "-e".into(),
            "DISPLAY".into(),
            "--net=host".into(),
            "-v".into(),
            "/tmp/.X11-unix:/tmp/.X11-unix:rw".into(),
            "-v".into(),
            format!(
                "{}:{}/.Xauthority:ro",
                host_home.join(".Xauthority").display(),
                layout.container_home
            ),
        ]);
    }
    if let Some(name) = container_name.or(spec.name.as_deref()) {
        args.push("--name".into());
        args.push(name.to_string());
    }
    args.push(spec.image.clone());
    args.extend(command.iter().cloned());
    Ok(Invocation::new(layout.runtime.clone(), args))
}

/// Rewrite `src:dst[:mode]` so that `src` is absolute.
fn resolve_volume(volume: &str, cwd: &Path) -> Result<String, PlaybookError> {
    let (src, rest) = volume.split_once(':').ok_or_else(|| {
        PlaybookError::Config(format!("volume `{volume}` must look like src:dst"))
    })?;
    if src.is_empty() || rest.is_empty() {
        return Err(PlaybookError::Config(format!(
            "volume `{volume}` must look like src:dst"
        )));
    }
    Ok(format!("{}:{rest}", absolutize(cwd, Path::new(src)).display()))
}

/// Lexically absolutize `path` against `base`, folding `.` and `..`.
pub fn absolutize(base: &Path, path: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    };
    let mut out = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn layout() -> HostLayout {
        HostLayout {
            runtime: "docker".to_string(),
            source_dir: PathBuf::from("/srv/playbook"),
            mount_point: "/opt/docker-playbook".to_string(),
            workdir: "/home/developer/workspace".to_string(),
            container_home: "/home/developer".to_string(),
            host_home: Some(PathBuf::from("/home/alice")),
            cwd: PathBuf::from("/work/project"),
        }
    }

    fn spec(value: Value) -> ContainerSpec {
        match value {
            Value::Object(map) => ContainerSpec::from_mapping(&map).expect("spec"),
            other => panic!("expected mapping, got {other}"),
        }
    }

    #[test]
    fn minimal_invocation_has_base_flags_image_and_command() {
        let inv = run_invocation(
            &spec(json!({ "image": "busybox" })),
            &layout(),
            None,
            &["true".to_string()],
        )
        .expect("invocation");

        assert_eq!(inv.program, "docker");
        assert_eq!(
            inv.args,
            vec![
                "run",
                "--rm",
                "-t",
                "-v",
                "/srv/playbook:/opt/docker-playbook:ro",
                "-w",
                "/home/developer/workspace",
                "busybox",
                "true",
            ]
        );
    }

    #[test]
    fn full_invocation_keeps_documented_flag_order() {
        let s = spec(json!({
            "image": "trainer:1",
            "runtime": "nvidia",
            "interactive": true,
            "ports": ["8888:8888", "6006:6006"],
            "volumes": ["data:/data", "/abs/models:/models:rw"],
            "gui": true,
        }));

        let inv = run_invocation(&s, &layout(), Some("box"), &["bash".to_string()])
            .expect("invocation");

        let tail: Vec<&str> = inv.args[7..].iter().map(String::as_str).collect();
        assert_eq!(
            tail,
            vec![
                "--runtime=nvidia",
                "-i",
                "-p",
                "8888:8888",
                "-p",
                "6006:6006",
                "-v",
                "/work/project/data:/data",
                "-v",
                "/abs/models:/models:rw",
                "-e",
                "DISPLAY",
                "--net=host",
                "-v",
                "/tmp/.X11-unix:/tmp/.X11-unix:rw",
                "-v",
                "/home/alice/.Xauthority:/home/developer/.Xauthority:ro",
                "--name",
                "box",
                "trainer:1",
                "bash",
            ]
        );
    }

    #[test]
    fn context_name_wins_over_spec_name() {
        let s = spec(json!({ "image": "busybox", "name": "from-spec" }));

        let named = run_invocation(&s, &layout(), Some("from-ctx"), &[]).expect("invocation");
        let fallback = run_invocation(&s, &layout(), None, &[]).expect("invocation");

        assert!(named.to_string().contains("--name from-ctx"));
        assert!(fallback.to_string().contains("--name from-spec"));
    }

    #[test]
    fn volume_without_destination_is_a_config_error() {
        let err = run_invocation(
            &spec(json!({ "image": "busybox", "volumes": ["just-a-path"] })),
            &layout(),
            None,
            &[],
        )
        .unwrap_err();
        assert!(matches!(err, PlaybookError::Config(_)));
    }

    #[test]
    fn missing_image_is_a_config_error() {
        let mut map = Bag::new();
        map.insert("ports".to_string(), json!(["80:80"]));
        assert!(ContainerSpec::from_mapping(&map).is_err());
    }

    #[test]
    fn absolutize_folds_dot_segments() {
        let base = Path::new("/work/project");
        assert_eq!(
            absolutize(base, Path::new("./a/../b")),
            PathBuf::from("/work/project/b")
        );
        assert_eq!(
            absolutize(base, Path::new("../shared")),
            PathBuf::from("/work/shared")
        );
        assert_eq!(absolutize(base, Path::new("/etc/x")), PathBuf::from("/etc/x"));
    }

    #[test]
    fn display_quotes_arguments_with_spaces() {
        let inv = Invocation::new("bash", vec!["-c".into(), "echo hi".into()]);
        assert_eq!(inv.to_string(), "bash -c 'echo hi'");
    }
}

//! CLI tests for the `playbook` binary.
//!
//! Spawns the binary on playbooks made of `shell` steps and checks exit codes
//! and side effects. Container detection is pinned through the environment.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use playbook::exit_codes;
use playbook::io::probe::INSIDE_CONTAINER_ENV;

fn run_playbook(dir: &Path, inside: bool, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_playbook"))
        .current_dir(dir)
        .env(INSIDE_CONTAINER_ENV, if inside { "1" } else { "0" })
        .env_remove("RUST_LOG")
        .args(args)
        .output()
        .expect("run playbook")
}

fn write(dir: &Path, name: &str, contents: &str) {
    fs::write(dir.join(name), contents).expect("write fixture");
}

#[test]
fn shell_steps_run_in_order() {
    let temp = tempfile::tempdir().expect("tempdir");
    write(
        temp.path(),
        "site.yml",
        "steps:\n  - name: first\n    action: shell\n    command: echo one >> log\n  - action: shell\n    command: [sh, -c, echo two >> log]\n",
    );

    let out = run_playbook(temp.path(), false, &["site.yml"]);

    assert_eq!(out.status.code(), Some(exit_codes::OK));
    let log = fs::read_to_string(temp.path().join("log")).expect("log");
    assert_eq!(log, "one\ntwo\n");
}

#[test]
fn unknown_action_warns_and_continues() {
    let temp = tempfile::tempdir().expect("tempdir");
    write(
        temp.path(),
        "site.yml",
        "steps:\n  - action: nonexistent_action\n  - action: shell\n    command: [touch, marker]\n",
    );

    let out = run_playbook(temp.path(), false, &["site.yml"]);

    assert_eq!(out.status.code(), Some(exit_codes::OK));
    assert!(temp.path().join("marker").exists());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("not recognized"), "stderr: {stderr}");
}

#[test]
fn sys_exit_stops_with_its_code() {
    let temp = tempfile::tempdir().expect("tempdir");
    write(
        temp.path(),
        "site.yml",
        "steps:\n  - action: sys_exit\n    exit_code: 5\n  - action: shell\n    command: [touch, never]\n",
    );

    let out = run_playbook(temp.path(), false, &["site.yml"]);

    assert_eq!(out.status.code(), Some(5));
    assert!(!temp.path().join("never").exists());
}

#[test]
fn failing_step_exit_code_is_propagated() {
    let temp = tempfile::tempdir().expect("tempdir");
    write(
        temp.path(),
        "site.yml",
        "steps:\n  - action: shell\n    command: exit 7\n  - action: shell\n    command: [touch, never]\n",
    );

    let out = run_playbook(temp.path(), false, &["site.yml"]);

    assert_eq!(out.status.code(), Some(7));
    assert!(!temp.path().join("never").exists());
}

#[test]
fn resume_index_on_host_is_an_app_error() {
    let temp = tempfile::tempdir().expect("tempdir");
    write(temp.path(), "site.yml", "steps: []\n");

    let out = run_playbook(temp.path(), false, &["--docker-step=0", "site.yml"]);

    assert_eq!(out.status.code(), Some(exit_codes::ERR_APP));
}

#[test]
fn container_without_resume_index_is_an_app_error() {
    let temp = tempfile::tempdir().expect("tempdir");
    write(temp.path(), "site.yml", "steps: []\n");

    let out = run_playbook(temp.path(), true, &["site.yml"]);

    assert_eq!(out.status.code(), Some(exit_codes::ERR_APP));
}

#[test]
fn malformed_playbooks_are_syntax_errors() {
    let temp = tempfile::tempdir().expect("tempdir");
    write(temp.path(), "broken.yml", "steps: [\n");
    write(temp.path(), "nosteps.yml", "dataset: x\n");

    for name in ["broken.yml", "nosteps.yml"] {
        let out = run_playbook(temp.path(), false, &[name]);
        assert_eq!(out.status.code(), Some(exit_codes::ERR_YAML), "{name}");
    }
}

#[test]
fn missing_playbook_is_a_system_error() {
    let temp = tempfile::tempdir().expect("tempdir");

    let out = run_playbook(temp.path(), false, &["absent.yml"]);

    assert_eq!(out.status.code(), Some(exit_codes::ERR_SYS));
}

#[test]
fn resumed_run_executes_only_the_indexed_step() {
    let temp = tempfile::tempdir().expect("tempdir");
    let mount = temp.path().join("mount");
    fs::create_dir_all(&mount).expect("mount dir");
    write(
        &mount,
        "site.yml",
        "steps:\n  - action: shell\n    command: [touch, first]\n  - action: shell\n    command: [touch, second]\n",
    );
    write(
        temp.path(),
        "playbook.toml",
        &format!("[container]\nmount_point = \"{}\"\n", mount.display()),
    );

    let out = run_playbook(temp.path(), true, &["--docker-step=1", "site.yml"]);

    assert_eq!(
        out.status.code(),
        Some(exit_codes::OK),
        "stderr: {}",
        String::from_utf8_lossy(&out.stderr)
    );
    assert!(!temp.path().join("first").exists());
    assert!(temp.path().join("second").exists());
}

#[test]
fn sys_shell_inside_container_exits_zero() {
    let temp = tempfile::tempdir().expect("tempdir");
    let mount = temp.path().join("mount");
    fs::create_dir_all(&mount).expect("mount dir");
    write(
        &mount,
        "site.yml",
        "steps:\n  - action: sys_shell\n    docker:\n      image: busybox\n",
    );
    write(
        temp.path(),
        "playbook.toml",
        &format!("[container]\nmount_point = \"{}\"\n", mount.display()),
    );

    let out = run_playbook(temp.path(), true, &["--docker-step=0", "site.yml"]);

    assert_eq!(out.status.code(), Some(exit_codes::OK));
}

#[test]
fn invalid_config_is_an_app_error() {
    let temp = tempfile::tempdir().expect("tempdir");
    write(temp.path(), "site.yml", "steps: []\n");
    write(temp.path(), "playbook.toml", "[watch]\ninterval_secs = 0\n");

    let out = run_playbook(temp.path(), false, &["site.yml"]);

    assert_eq!(out.status.code(), Some(exit_codes::ERR_APP));
}

#[test]
fn sys_exit_code_out_of_process_range_is_an_app_error() {
    let temp = tempfile::tempdir().expect("tempdir");
    write(
        temp.path(),
        "site.yml",
        "steps:\n  - action: sys_exit\n    exit_code: 256\n",
    );

    let out = run_playbook(temp.path(), false, &["site.yml"]);

    assert_eq!(out.status.code(), Some(exit_codes::ERR_APP));
}

#[test]
fn sys_shell_without_docker_is_a_syntax_error() {
    let temp = tempfile::tempdir().expect("tempdir");
    write(temp.path(), "site.yml", "steps:\n  - action: sys_shell\n");

    let out = run_playbook(temp.path(), false, &["site.yml"]);

    assert_eq!(out.status.code(), Some(exit_codes::ERR_YAML));
}

#[test]
fn resumed_run_uses_forwarded_engine_config() {
    let temp = tempfile::tempdir().expect("tempdir");
    let mount = temp.path().join("mount");
    fs::create_dir_all(&mount).expect("mount dir");
    write(
        &mount,
        "site.yml",
        "steps:\n  - action: shell\n    command: [touch, first]\n  - action: shell\n    command: [touch, second]\n",
    );
    let forwarded = format!("[container]\nmount_point = \"{}\"\n", mount.display());

    let out = run_playbook(
        temp.path(),
        true,
        &["--docker-step=1", "--engine-config", &forwarded, "site.yml"],
    );

    assert_eq!(
        out.status.code(),
        Some(exit_codes::OK),
        "stderr: {}",
        String::from_utf8_lossy(&out.stderr)
    );
    assert!(!temp.path().join("first").exists());
    assert!(temp.path().join("second").exists());
}

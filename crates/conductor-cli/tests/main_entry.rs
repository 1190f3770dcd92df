//! Integration tests for the `conductor` binary entry point.
//!
//! Verifies help output, user-facing error handling, and a local dispatch
//! through a real handler process.

use std::fs;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::str::{contains, starts_with};
use tempfile::TempDir;

fn conductor(dir: &TempDir) -> assert_cmd::Command {
    let mut command = cargo_bin_cmd!("conductor");
    command
        .current_dir(dir.path())
        .env("CONDUCTOR_CACHE_DIR", dir.path().join("cache"))
        .env("CONDUCTOR_TEMP_DIR", dir.path().join("tmp"))
        .env_remove("GITHUB_ACTIONS")
        .env_remove("CONDUCTOR_LOG_FILTER");
    command
}

#[test]
fn help_succeeds() {
    let mut command = cargo_bin_cmd!("conductor");
    command.arg("--help");
    command.assert().success().stdout(contains("--invoke"));
}

#[test]
fn unknown_flags_exit_with_usage_status() {
    let dir = TempDir::new().expect("temp dir");
    conductor(&dir).arg("--bogus").assert().code(2);
}

#[test]
fn missing_configuration_is_annotated() {
    let dir = TempDir::new().expect("temp dir");
    conductor(&dir)
        .assert()
        .code(1)
        .stdout(starts_with("::error::no configuration file found"))
        .stderr(contains("no configuration file found"));
}

#[test]
fn empty_handler_list_dispatches_locally() {
    let dir = TempDir::new().expect("temp dir");
    fs::write(dir.path().join("conductor.yaml"), "handlers: []\n").expect("write config");
    conductor(&dir).assert().success();
}

#[cfg(unix)]
#[test]
fn local_handler_runs_in_the_working_directory() {
    let dir = TempDir::new().expect("temp dir");
    let package = dir.path().join("stamp");
    fs::create_dir_all(&package).expect("create package");
    fs::write(
        package.join("handler.toml"),
        "entrypoint = \"main.sh\"\ninterpreter = \"/bin/sh\"\n",
    )
    .expect("write manifest");
    fs::write(
        package.join("main.sh"),
        r#"request=$(cat)
case "$request" in
  *'"kind":"describe"'*) echo '{"functions":["handle_workflow_dispatch"]}' ;;
  *) echo "$CONDUCTOR_HANDLER_NAME" > stamped; echo '{"status":"ok"}' ;;
esac
"#,
    )
    .expect("write script");
    fs::write(
        dir.path().join("conductor.yaml"),
        "handlers:\n  - name: stamp\n    path: stamp\n",
    )
    .expect("write config");

    conductor(&dir)
        .args(["--local", "--event", "workflow_dispatch"])
        .assert()
        .success();

    let stamped = fs::read_to_string(dir.path().join("stamped")).expect("handler ran");
    assert_eq!(stamped.trim(), "stamp");
}

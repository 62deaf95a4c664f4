//! Behavioural smoke tests for the CLI entrypoint.

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::TempDir;

const GCE_VARS: [&str; 6] = [
    "GCE_PROJECT",
    "GCE_ZONE",
    "GCE_DRIVER_URL",
    "GCE_ACCESS_TOKEN",
    "GCE_CREDENTIALS_FILE",
    "GCE_MACHINES_CONFIG_PATH",
];

fn isolated_cmd(home: &TempDir) -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("gce-machines");
    cmd.current_dir(home.path())
        .env("HOME", home.path())
        .env("XDG_CONFIG_HOME", home.path());
    for var in GCE_VARS {
        cmd.env_remove(var);
    }
    cmd
}

#[test]
fn help_lists_lifecycle_commands() {
    let mut cmd = cargo_bin_cmd!("gce-machines");
    cmd.arg("--help").assert().success().stdout(
        predicate::str::contains("allocate")
            .and(predicate::str::contains("ready"))
            .and(predicate::str::contains("destroy"))
            .and(predicate::str::contains("key-pair")),
    );
}

#[test]
fn missing_project_fails_with_actionable_error() {
    let home = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
    isolated_cmd(&home)
        .args(["stop", "web-1"])
        .assert()
        .failure()
        .code(1)
        .stdout("")
        .stderr(predicate::str::contains("GCE_PROJECT"));
}

#[test]
fn missing_token_is_reported_before_any_request() {
    let home = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
    isolated_cmd(&home)
        .env("GCE_DRIVER_URL", "google:europe-west1-b:demo")
        .args(["key-pair", "destroy", "agents"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("GCE_ACCESS_TOKEN"));
}

#[test]
fn malformed_driver_url_is_rejected() {
    let home = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
    isolated_cmd(&home)
        .env("GCE_DRIVER_URL", "europe-west1-b:demo")
        .args(["destroy", "web-1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid driver URL"));
}

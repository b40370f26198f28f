//! Integration tests for the `fleet` binary

#![allow(deprecated)] // cargo_bin is the standard way to test CLI binaries

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;
use tempfile::TempDir;

const REPO_LIST: &str = "\
# services
git@github.com:acme/web.git
https://github.com/acme/api

git@gitlab.com:acme/platform/billing.git
";

/// `fleet` isolated from the user's config and environment
fn fleet(workdir: &Path) -> Command {
    let config = workdir.join("config.toml");
    if !config.exists() {
        std::fs::write(&config, "").unwrap();
    }
    let mut cmd = Command::cargo_bin("fleet").unwrap();
    cmd.env_remove("FLEET_WORKDIR")
        .env_remove("FLEET_CONFIG")
        .env_remove("RUST_LOG")
        .arg("--workdir")
        .arg(workdir)
        .arg("--config")
        .arg(&config);
    cmd
}

fn init_from_file(temp: &TempDir) {
    let list = temp.path().join("repos.txt");
    std::fs::write(&list, REPO_LIST).unwrap();
    fleet(temp.path())
        .args(["init", "--file"])
        .arg(&list)
        .assert()
        .success();
}

// =============================================================================
// CLI surface
// =============================================================================

#[test]
fn test_cli_help() {
    let mut cmd = Command::cargo_bin("fleet").unwrap();
    cmd.arg("--help");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Apply one change across many repositories"));
}

#[test]
fn test_cli_version() {
    let mut cmd = Command::cargo_bin("fleet").unwrap();
    cmd.arg("--version");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_merge_help_lists_gates() {
    let mut cmd = Command::cargo_bin("fleet").unwrap();
    cmd.args(["merge", "--help"]);

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("--ignore-build-status"))
        .stdout(predicate::str::contains("--ignore-review-approval"))
        .stdout(predicate::str::contains("--throttle"));
}

#[test]
fn test_plan_requires_command() {
    let temp = TempDir::new().unwrap();
    fleet(temp.path())
        .args(["plan", "-b", "fleet-change", "-m", "Change"])
        .assert()
        .failure();
}

#[test]
fn test_init_requires_query_or_file() {
    let temp = TempDir::new().unwrap();
    fleet(temp.path()).arg("init").assert().failure();
}

#[test]
fn test_invalid_throttle_is_rejected() {
    let temp = TempDir::new().unwrap();
    fleet(temp.path())
        .args(["status", "--api-throttle", "soon"])
        .assert()
        .failure();
}

// =============================================================================
// Workdir lifecycle
// =============================================================================

#[test]
fn test_status_without_catalog_points_at_init() {
    let temp = TempDir::new().unwrap();

    fleet(temp.path())
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("fleet init"));
}

#[test]
fn test_init_from_file_then_status() {
    let temp = TempDir::new().unwrap();
    init_from_file(&temp);

    let catalog = std::fs::read_to_string(temp.path().join("init.json")).unwrap();
    assert!(catalog.contains(env!("CARGO_PKG_VERSION")));

    fleet(temp.path())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("billing"))
        .stdout(predicate::str::contains("web"))
        .stdout(predicate::str::contains("initialized"));
}

#[test]
fn test_unknown_repo_is_rejected() {
    let temp = TempDir::new().unwrap();
    init_from_file(&temp);

    fleet(temp.path())
        .args(["status", "--repo", "nope"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("nope is not a targeted repo name"));
}

#[test]
fn test_workdir_from_other_version_is_refused() {
    let temp = TempDir::new().unwrap();
    std::fs::write(
        temp.path().join("init.json"),
        r#"{"version":"0.0.0-old","created_at":"2024-01-01T00:00:00Z","repos":[]}"#,
    )
    .unwrap();

    fleet(temp.path())
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("0.0.0-old"));
}

#[test]
fn test_merge_with_nothing_pushed_is_a_no_op() {
    let temp = TempDir::new().unwrap();
    init_from_file(&temp);

    fleet(temp.path())
        .env("GITHUB_TOKEN", "test-token")
        .env("GITLAB_TOKEN", "test-token")
        .arg("merge")
        .assert()
        .success()
        .stdout(predicate::str::contains("No pushed, unmerged PRs"));
}

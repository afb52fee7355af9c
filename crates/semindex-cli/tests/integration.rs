//! Integration tests for the semindex CLI binary.
//!
//! Tests that only touch local state (init, status, config, clean) run
//! unconditionally. Tests that exercise `index`/`search` need a reachable
//! embedding provider and are marked `#[ignore]`.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn semindex() -> Command {
    Command::cargo_bin("semindex").expect("failed to find semindex binary")
}

#[test]
fn init_creates_local_config() {
    let workspace = TempDir::new().unwrap();

    semindex()
        .current_dir(workspace.path())
        .args(["init"])
        .assert()
        .success();

    assert!(workspace.path().join(".semindex/config.toml").exists());
}

#[test]
fn init_refuses_to_overwrite_without_force() {
    let workspace = TempDir::new().unwrap();

    semindex().current_dir(workspace.path()).args(["init"]).assert().success();

    semindex().current_dir(workspace.path()).args(["init"]).assert().failure();

    semindex()
        .current_dir(workspace.path())
        .args(["init", "--force"])
        .assert()
        .success();
}

#[test]
fn init_rejects_nonexistent_path() {
    semindex()
        .args(["init", "/nonexistent/path/semindex-test-12345"])
        .assert()
        .failure();
}

#[test]
fn status_on_fresh_workspace_reports_no_repositories() {
    let workspace = TempDir::new().unwrap();

    semindex()
        .current_dir(workspace.path())
        .args(["status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No repositories indexed"));
}

#[test]
fn status_json_on_fresh_workspace_is_an_empty_array() {
    let workspace = TempDir::new().unwrap();

    semindex()
        .current_dir(workspace.path())
        .args(["status", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[]"));
}

#[test]
fn config_show_prints_resolved_toml() {
    let workspace = TempDir::new().unwrap();

    semindex()
        .current_dir(workspace.path())
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[model]"))
        .stdout(predicate::str::contains("[embedding]"))
        .stdout(predicate::str::contains("[storage]"));
}

#[test]
fn config_path_prints_global_and_local_paths() {
    let workspace = TempDir::new().unwrap();

    semindex()
        .current_dir(workspace.path())
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("global:"))
        .stdout(predicate::str::contains("local:"));
}

#[test]
fn clean_on_unknown_repository_succeeds_with_zero_counts() {
    let workspace = TempDir::new().unwrap();

    semindex()
        .current_dir(workspace.path())
        .args(["clean", "--yes", "no-such-repo"])
        .assert()
        .success()
        .stderr(predicate::str::contains("0 blocks, 0 vectors"));
}

#[test]
fn clean_without_yes_prompts_and_aborts_on_non_y_answer() {
    let workspace = TempDir::new().unwrap();

    semindex()
        .current_dir(workspace.path())
        .args(["clean", "no-such-repo"])
        .write_stdin("n\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Aborted"));
}

#[test]
fn search_reports_invalid_block_type() {
    let workspace = TempDir::new().unwrap();

    semindex()
        .current_dir(workspace.path())
        .args(["search", "anything", "--block-type", "not-a-type"])
        .assert()
        .failure();
}

#[test]
#[ignore = "requires a reachable embedding provider"]
fn index_then_search_round_trips_a_local_directory() {
    let workspace = TempDir::new().unwrap();
    std::fs::write(
        workspace.path().join("lib.rs"),
        "fn add(a: i32, b: i32) -> i32 {\n    a + b\n}\n",
    )
    .unwrap();

    semindex()
        .current_dir(workspace.path())
        .args(["index", ".", "--repository-id", "local-fixture"])
        .assert()
        .success();

    semindex()
        .current_dir(workspace.path())
        .args(["search", "add two numbers"])
        .assert()
        .success()
        .stdout(predicate::str::contains("add"));
}

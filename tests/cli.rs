mod common;

use assert_cmd::Command;
use common::{BACKUP_FIXTURE, TestWorkspace};
use predicates::{prelude::PredicateBooleanExt, str::contains};

fn reconciler() -> Command {
    Command::cargo_bin("backup-reconciler").expect("binary exists")
}

#[test]
fn inspect_finds_backup_in_search_dir() {
    let workspace = TestWorkspace::new();
    workspace.copy_fixture(BACKUP_FIXTURE);
    workspace.write("notes.txt", "not a backup");

    reconciler()
        .args(["inspect", "--search-dir", workspace.path().to_str().unwrap()])
        .assert()
        .success()
        .stdout(contains("Users: 4 row(s), 7 column(s)"))
        .stdout(contains("Books: 2 row(s), 6 column(s)"))
        .stdout(contains("Subscriptions: not present"));
}

#[test]
fn inspect_reads_json_snapshot_documents() {
    let workspace = TestWorkspace::new();
    let path = workspace.write(
        "legacy.json",
        r#"{"Chapters": [
            {"id": "c1", "bookId": "b1"},
            {"id": "c2", "bookId": "b1", "title": "Two"}
        ]}"#,
    );

    reconciler()
        .args(["inspect", "--source", path.to_str().unwrap()])
        .assert()
        .success()
        .stdout(contains("Chapters: 2 row(s), 3 column(s)"))
        .stdout(contains("Users: not present"));
}

#[test]
fn migrate_without_backup_fails_before_connecting() {
    let workspace = TestWorkspace::new();

    reconciler()
        .current_dir(workspace.path())
        .args(["migrate", "--search-dir", workspace.path().to_str().unwrap()])
        .assert()
        .failure()
        .stderr(contains("no backup source found").and(contains("*backup*.sql")));
}

#[test]
fn migrate_reports_missing_explicit_source() {
    let workspace = TestWorkspace::new();
    let missing = workspace.path().join("gone.sql");

    reconciler()
        .current_dir(workspace.path())
        .args(["migrate", "--source", missing.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(contains("does not exist"));
}

#[test]
fn migrate_rejects_malformed_override_file() {
    let workspace = TestWorkspace::new();
    workspace.copy_fixture(BACKUP_FIXTURE);
    let overrides = workspace.write("overrides.yaml", "Users: [not, a, map]");

    reconciler()
        .current_dir(workspace.path())
        .args([
            "migrate",
            "--search-dir",
            workspace.path().to_str().unwrap(),
            "--overrides",
            overrides.to_str().unwrap(),
        ])
        .assert()
        .failure()
        .stderr(contains("Parsing override file"));
}

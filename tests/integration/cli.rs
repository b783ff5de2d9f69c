//! End-to-end tests of the `gsb` binary

use assert_cmd::Command;
use predicates::prelude::*;

use super::common::save_fixtures::{git_in, TestSave};
use gsb::repo::INITIAL_MESSAGE;

fn gsb() -> Command {
    let mut cmd = Command::cargo_bin("gsb").unwrap();
    cmd.env_remove("GSB_LOG");
    cmd
}

#[test]
fn test_help() {
    gsb()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("backup"))
        .stdout(predicate::str::contains("rewind"));
}

#[test]
fn test_init_backup_and_history() {
    let save = TestSave::untracked();

    gsb().arg("init").arg(&save.path).assert().success();
    assert_eq!(save.messages(), vec![INITIAL_MESSAGE]);

    save.write("slot1.sav", "boss door");
    gsb()
        .arg("backup")
        .arg(&save.path)
        .args(["--tag", "Before boss", "--tag-name", "before-boss"])
        .assert()
        .success();

    gsb()
        .arg("history")
        .arg(&save.path)
        .assert()
        .success()
        .stdout(predicate::str::contains("- before-boss: Before boss"))
        .stdout(predicate::str::contains("(current)"))
        .stdout(predicate::str::contains(INITIAL_MESSAGE).not());

    gsb()
        .args(["history", "--all", "--json"])
        .arg(&save.path)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"tag\": \"before-boss\""))
        .stdout(predicate::str::contains(INITIAL_MESSAGE));
}

#[test]
fn test_generated_tag_name() {
    let save = TestSave::new();
    save.write("slot1.sav", "shiny");

    gsb()
        .current_dir(&save.path)
        .args(["backup", "--tag", "Found a shiny"])
        .assert()
        .success();

    let tags = save.git(&["tag", "--list"]);
    assert!(tags.starts_with("gsb"), "unexpected tags: {}", tags);
}

#[test]
fn test_rewind_and_export() {
    let (save, s) = TestSave::with_history(&[("A", None), ("B", None)]);

    gsb()
        .arg("rewind")
        .arg(&s[0].id)
        .arg("--path")
        .arg(&save.path)
        .assert()
        .success();
    assert_eq!(save.read("slot1.sav"), "state: A");

    let out = tempfile::tempdir().unwrap();
    let archive = out.path().join("a.zip");
    gsb()
        .args(["export", "HEAD", "-o"])
        .arg(&archive)
        .arg("--path")
        .arg(&save.path)
        .assert()
        .success()
        .stdout(predicate::str::contains("a.zip"));
    assert!(archive.exists());
}

#[test]
fn test_export_relative_to_working_directory() {
    let (save, _) = TestSave::with_history(&[("A", None)]);
    let out = tempfile::tempdir().unwrap();

    gsb()
        .current_dir(out.path())
        .args(["export", "HEAD", "-o", "relative.zip", "--path"])
        .arg(&save.path)
        .assert()
        .success();

    assert!(out.path().join("relative.zip").exists());
    assert!(!save.exists("relative.zip"));
}

#[test]
fn test_history_include_non_gsb() {
    let save = TestSave::untracked();
    git_in(&save.path, &["add", "."]);
    git_in(
        &save.path,
        &["commit", "--quiet", "--no-gpg-sign", "-m", "It's my ancestors!"],
    );
    git_in(&save.path, &["tag", "-a", "-m", "Before gsb", "Init"]);
    gsb().arg("init").arg(&save.path).assert().success();

    gsb()
        .args(["history", "--all"])
        .arg(&save.path)
        .assert()
        .success()
        .stdout(predicate::str::contains(INITIAL_MESSAGE))
        .stdout(predicate::str::contains("ancestors").not());

    gsb()
        .args(["history", "--all", "--include-non-gsb"])
        .arg(&save.path)
        .assert()
        .success()
        .stdout(predicate::str::contains("- Init: It's my ancestors!"));
}

#[test]
fn test_delete_prompt_can_be_cancelled() {
    let (save, _) = TestSave::with_history(&[("A", None), ("B", None)]);

    gsb()
        .arg("delete")
        .arg("--path")
        .arg(&save.path)
        .write_stdin("q\n")
        .assert()
        .success();
    assert_eq!(save.messages().len(), 3);
}

#[test]
fn test_delete_from_command_line() {
    let (save, s) = TestSave::with_history(&[("A", None), ("B", None)]);

    gsb()
        .arg("delete")
        .arg(&s[0].id)
        .arg("--path")
        .arg(&save.path)
        .assert()
        .success()
        .stderr(predicate::str::contains("git gc"));
    assert_eq!(save.messages(), vec![INITIAL_MESSAGE, "B"]);
}

#[test]
fn test_not_a_save() {
    let dir = tempfile::tempdir().unwrap();

    gsb()
        .arg("history")
        .arg(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("Could not open save"));
}

#[test]
fn test_unknown_backup() {
    let (save, _) = TestSave::with_history(&[("A", None)]);

    gsb()
        .args(["rewind", "no-such-backup", "--path"])
        .arg(&save.path)
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "Could not find a backup named no-such-backup",
        ));
}

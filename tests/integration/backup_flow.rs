//! Onboarding and backups against a real git repository

use super::common::save_fixtures::{git_in, TestSave};
use gsb::repo::INITIAL_MESSAGE;
use gsb::store::LOCK_FILE_NAME;
use gsb::{create_repo, CheckpointRequest, CombineMode, HistoryError, HistoryFilter, RepoError};

#[test]
fn test_init_records_initial_snapshot() {
    let save = TestSave::new();

    assert_eq!(save.messages(), vec![INITIAL_MESSAGE]);
    assert_eq!(save.git(&["symbolic-ref", "HEAD"]), "refs/heads/gsb");
    assert_eq!(save.git(&["tag", "--list"]), "");
    assert_eq!(save.git(&["log", "-1", "--format=%cn <%ce>", "gsb"]), "gsb <gsb@localhost>");
    assert_eq!(save.git(&["log", "-1", "--format=%an", "gsb"]), "Test User");

    let tracked = save.git(&["ls-tree", "-r", "--name-only", "gsb"]);
    for file in [".gitignore", ".gsb_manifest", "settings.ini", "slot1.sav"] {
        assert!(tracked.lines().any(|l| l == file), "{} is not tracked", file);
    }

    let repo = save.repo();
    assert_eq!(repo.name(), "Test Save");
    assert!(repo.ledger().unwrap().current().unwrap().is_root());
}

#[test]
fn test_init_with_patterns_and_ignores() {
    let save = TestSave::untracked();
    save.write("debug.log", "noise");
    save.write("saves/slot2.sav", "level 2");

    create_repo(
        &save.path,
        Some("Patterned"),
        &["*.sav".to_string(), "saves/".to_string()],
        &["*.log".to_string()],
    )
    .unwrap();

    let tracked = save.git(&["ls-tree", "-r", "--name-only", "gsb"]);
    let mut tracked: Vec<&str> = tracked.lines().collect();
    tracked.sort();
    assert_eq!(
        tracked,
        vec![".gitignore", ".gsb_manifest", "saves/slot2.sav", "slot1.sav"]
    );
    assert_eq!(save.read(".gitignore"), "*.log\n");
    assert!(save.read(".gsb_manifest").contains("Patterned"));
}

#[test]
fn test_init_twice_is_rejected() {
    let save = TestSave::new();
    assert!(matches!(
        create_repo(&save.path, None, &[], &[]),
        Err(RepoError::AlreadyExists(_))
    ));
}

#[test]
fn test_init_keeps_existing_history() {
    let save = TestSave::untracked();
    git_in(&save.path, &["add", "."]);
    git_in(
        &save.path,
        &["commit", "--quiet", "--no-gpg-sign", "-m", "Hand-made commit"],
    );
    let original_branch = save.git(&["symbolic-ref", "--short", "HEAD"]);

    create_repo(&save.path, None, &[], &[]).unwrap();

    assert_eq!(save.messages(), vec!["Hand-made commit", INITIAL_MESSAGE]);
    assert_eq!(save.git(&["log", "-1", "--format=%s", original_branch.as_str()]), "Hand-made commit");
}

#[test]
fn test_commits_made_outside_gsb_are_hidden() {
    let save = TestSave::untracked();
    git_in(&save.path, &["add", "."]);
    git_in(
        &save.path,
        &["commit", "--quiet", "--no-gpg-sign", "-m", "It's my ancestors!"],
    );
    git_in(&save.path, &["tag", "-a", "-m", "Before gsb", "0.1"]);
    create_repo(&save.path, None, &[], &[]).unwrap();
    save.write("slot1.sav", "level 2");
    save.tag("gsb-level-2", "Level 2");

    let repo = save.repo();
    let identifiers = |filter: &HistoryFilter| -> Vec<String> {
        repo.list_history(filter)
            .unwrap()
            .iter()
            .map(|s| s.identifier().to_string())
            .collect()
    };

    assert_eq!(identifiers(&HistoryFilter::tagged()), vec!["gsb-level-2"]);
    assert_eq!(identifiers(&HistoryFilter::default()).len(), 2);
    let everything = HistoryFilter {
        include_non_gsb: true,
        ..HistoryFilter::tagged()
    };
    assert_eq!(identifiers(&everything), vec!["gsb-level-2", "0.1"]);
    assert!(!repo
        .ledger()
        .unwrap()
        .recent_and_tagged()
        .iter()
        .any(|s| s.message == "It's my ancestors!"));
}

#[test]
fn test_backups_append() {
    let save = TestSave::new();
    save.write("slot1.sav", "level 2");
    let first = save.backup("Reached level 2");
    let second = save.backup("Nothing changed");

    assert_eq!(
        save.messages(),
        vec![INITIAL_MESSAGE, "Reached level 2", "Nothing changed"]
    );
    assert_eq!(second.parent.as_ref(), Some(&first.id));
    assert_eq!(second.tree, first.tree);

    let untitled = save.repo().checkpoint(&CheckpointRequest::default()).unwrap();
    assert_eq!(untitled.snapshot.message, "GSB-managed commit");
}

#[test]
fn test_deleted_files_are_backed_up() {
    let save = TestSave::new();
    std::fs::remove_file(save.path.join("settings.ini")).unwrap();
    save.backup("Removed settings");

    let tracked = save.git(&["ls-tree", "-r", "--name-only", "gsb"]);
    assert!(!tracked.lines().any(|l| l == "settings.ini"));
}

#[test]
fn test_tags_are_annotated() {
    let save = TestSave::new();
    save.write("slot1.sav", "boss door");
    let tagged = save.tag("before-boss", "Right before the boss");

    assert_eq!(save.git(&["cat-file", "-t", "before-boss"]), "tag");
    assert_eq!(save.git(&["rev-parse", "before-boss^{commit}"]), tagged.id);
    assert!(save
        .git(&["cat-file", "tag", "before-boss"])
        .contains("Right before the boss"));

    let tagged = save.repo().list_history(&HistoryFilter::tagged()).unwrap();
    assert_eq!(tagged.len(), 1);
    assert_eq!(tagged[0].identifier(), "before-boss");
}

#[test]
fn test_combine_last() {
    let save = TestSave::new();
    save.write("slot1.sav", "level 2");
    let replaced = save.backup("Level 2");
    save.write("slot1.sav", "level 3");

    let combined = save
        .repo()
        .checkpoint(&CheckpointRequest::with_message("Level 3").combine(CombineMode::CombineLast))
        .unwrap();

    assert_eq!(save.messages(), vec![INITIAL_MESSAGE, "Level 3"]);
    assert_eq!(combined.snapshot.parent, replaced.parent);
    assert!(save.has_object(&replaced.id));
}

#[test]
fn test_combine_since_last_tag_scenario() {
    let (save, snapshots) = TestSave::with_history(&[("A", None), ("B", None)]);
    save.write("slot1.sav", "boss door");
    let c = save.tag("before-boss", "C");

    save.write("slot1.sav", "fighting");
    save.backup("attempt 1");
    save.write("slot1.sav", "won");
    let request = CheckpointRequest::tagged("after-boss", "D")
        .combine(CombineMode::CombineSinceLastTag);
    let d = save.repo().checkpoint(&request).unwrap().snapshot;

    assert_eq!(save.messages(), vec![INITIAL_MESSAGE, "A", "B", "C", "D"]);
    assert_eq!(d.parent.as_ref(), Some(&c.id));

    save.write("slot1.sav", "won with more loot");
    let request = CheckpointRequest::tagged("after-boss", "D again")
        .combine(CombineMode::CombineSinceLastTag);
    let d2 = save.repo().checkpoint(&request).unwrap().snapshot;

    assert_eq!(save.messages(), vec![INITIAL_MESSAGE, "A", "B", "C", "D again"]);
    assert_eq!(d2.parent.as_ref(), Some(&c.id));
    assert_eq!(save.git(&["rev-parse", "after-boss^{commit}"]), d2.id);
    assert_eq!(save.git(&["tag", "--list"]), "after-boss\nbefore-boss");
    assert!(save.has_object(&d.id));
    assert_eq!(snapshots.len(), 2);
}

#[test]
fn test_duplicate_tag_is_rejected() {
    let save = TestSave::new();
    save.tag("checkpoint", "First");
    save.write("slot1.sav", "later");

    let result = save
        .repo()
        .checkpoint(&CheckpointRequest::tagged("checkpoint", "Second"));
    assert!(matches!(result, Err(HistoryError::InvalidRequest(_))));
    assert_eq!(save.messages(), vec![INITIAL_MESSAGE, "First"]);
}

#[test]
fn test_lock_file_makes_save_busy() {
    let save = TestSave::new();
    let lock = save.path.join(".git").join(LOCK_FILE_NAME);
    std::fs::write(&lock, "12345").unwrap();

    let result = save.repo().checkpoint(&CheckpointRequest::default());
    assert!(matches!(result, Err(HistoryError::Busy(_))));
    assert_eq!(save.messages(), vec![INITIAL_MESSAGE]);

    std::fs::remove_file(&lock).unwrap();
    save.backup("Now it works");
    assert!(!lock.exists());
}

#[test]
fn test_tag_on_another_branch_is_not_clobbered() {
    let save = TestSave::new();
    let main = save.git(&["rev-parse", "gsb"]);
    git_in(&save.path, &["branch", "side", main.as_str()]);
    git_in(&save.path, &["checkout", "--quiet", "side"]);
    save.write("notes.txt", "side work");
    git_in(&save.path, &["add", "notes.txt"]);
    git_in(&save.path, &["commit", "--quiet", "--no-gpg-sign", "-m", "Side work"]);
    git_in(&save.path, &["tag", "-a", "-m", "Release", "v1"]);
    let side = save.git(&["rev-parse", "v1^{commit}"]);
    git_in(&save.path, &["checkout", "--quiet", "gsb"]);

    save.write("slot1.sav", "later");
    let result = save
        .repo()
        .checkpoint(&CheckpointRequest::tagged("v1", "Steal the tag"));

    assert!(matches!(result, Err(HistoryError::InvalidRequest(_))));
    assert_eq!(save.git(&["rev-parse", "v1^{commit}"]), side);
    assert_eq!(save.messages(), vec![INITIAL_MESSAGE]);
}

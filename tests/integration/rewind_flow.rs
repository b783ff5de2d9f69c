//! Rewinding against a real git repository

use super::common::save_fixtures::TestSave;
use gsb::repo::{INITIAL_MESSAGE, UNSAVED_BEFORE_REWIND};
use gsb::{HistoryError, RewindRequest};

#[test]
fn test_rewind_scenario() {
    let (save, s) = TestSave::with_history(&[("A", None), ("B", None), ("C", None)]);

    let a_prime = save
        .repo()
        .rewind(&RewindRequest::new(s[0].id.clone()))
        .unwrap()
        .snapshot;
    assert_eq!(save.read("slot1.sav"), "state: A");
    assert_eq!(a_prime.parent.as_ref(), Some(&s[2].id));
    assert_eq!(a_prime.tree, s[0].tree);

    let c_prime = save
        .repo()
        .rewind(&RewindRequest::new(s[2].id[..10].to_string()))
        .unwrap()
        .snapshot;
    assert_eq!(save.read("slot1.sav"), "state: C");
    assert_eq!(c_prime.parent.as_ref(), Some(&a_prime.id));
    assert_eq!(c_prime.tree, s[2].tree);

    let messages = save.messages();
    assert_eq!(messages.len(), 6);
    assert_eq!(&messages[..4], &[INITIAL_MESSAGE, "A", "B", "C"]);
    assert!(messages[4].starts_with("Restored from "));
    assert_eq!(save.git(&["branch", "--format=%(refname:short)"]), "gsb");
    assert_eq!(save.git(&["status", "--porcelain"]), "");
}

#[test]
fn test_rewind_backs_up_unsaved_changes() {
    let (save, s) = TestSave::with_history(&[("A", None), ("B", None)]);
    save.write("slot1.sav", "not backed up yet");
    save.write("new.sav", "brand new");

    save.repo()
        .rewind(&RewindRequest::new(s[0].id.clone()))
        .unwrap();

    let messages = save.messages();
    assert_eq!(messages[3], UNSAVED_BEFORE_REWIND);
    assert_eq!(save.read("slot1.sav"), "state: A");
    assert!(!save.exists("new.sav"));

    // The safety backup holds what was on disk
    let safety = save.git(&["show", "gsb~1:new.sav"]);
    assert_eq!(safety, "brand new");
}

#[test]
fn test_rewind_to_tag_with_new_tag() {
    let (save, _) = TestSave::with_history(&[("A", Some("first-area")), ("B", None)]);

    let outcome = save
        .repo()
        .rewind(&RewindRequest::new("first-area").tagged("retry", "Trying again"))
        .unwrap();

    assert_eq!(outcome.snapshot.tag.as_deref(), Some("retry"));
    assert_eq!(outcome.snapshot.message, "Trying again");
    assert_eq!(save.read("slot1.sav"), "state: A");
    assert_eq!(save.git(&["rev-parse", "retry^{commit}"]), outcome.snapshot.id);
}

#[test]
fn test_rewind_relative() {
    let (save, _) = TestSave::with_history(&[("A", None), ("B", None)]);

    save.repo().rewind(&RewindRequest::new("~2")).unwrap();
    assert_eq!(save.read("slot1.sav"), "level 1");
}

#[test]
fn test_rewind_unknown_backup() {
    let (save, _) = TestSave::with_history(&[("A", None)]);

    let result = save.repo().rewind(&RewindRequest::new("no-such-tag"));
    match result {
        Err(HistoryError::NotFound(name)) => assert_eq!(name, "no-such-tag"),
        other => panic!("expected NotFound, got {:?}", other),
    }
    assert_eq!(save.messages().len(), 2);
}

#[test]
fn test_relative_rewind_counts_from_the_visible_head() {
    let (save, s) = TestSave::with_history(&[("A", None), ("B", None)]);
    save.write("slot1.sav", "not backed up yet");

    let outcome = save.repo().rewind(&RewindRequest::new("~1")).unwrap();

    assert_eq!(outcome.snapshot.tree, s[0].tree);
    assert_eq!(save.read("slot1.sav"), "state: A");
    let messages = save.messages();
    assert_eq!(&messages[..4], &[INITIAL_MESSAGE, "A", "B", UNSAVED_BEFORE_REWIND]);
    assert!(messages[4].starts_with("Restored from "));
    assert!(messages[4].ends_with(": A"));
}

#[test]
fn test_failed_restore_leaves_files_and_history_alone() {
    let (save, s) = TestSave::with_history(&[("A", None), ("B", None)]);
    let before = save.messages();

    // Without A's tree object git cannot write A's files
    let (dir, file) = s[0].tree.split_at(2);
    let object = save.path.join(".git").join("objects").join(dir).join(file);
    std::fs::remove_file(&object).unwrap();

    let result = save.repo().rewind(&RewindRequest::new(s[0].id.clone()));

    assert!(
        matches!(result, Err(HistoryError::RestoreFailed(_))),
        "expected RestoreFailed, got {:?}",
        result
    );
    assert_eq!(save.messages(), before);
    assert_eq!(save.read("slot1.sav"), "state: B");
    assert_eq!(save.read("settings.ini"), "volume=5");
    assert_eq!(save.git(&["status", "--porcelain"]), "");
}

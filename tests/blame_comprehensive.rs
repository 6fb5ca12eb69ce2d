//! Blame classification over real repositories: committed lines against
//! notes, uncommitted lines against the local trace log.

mod repos;

use pi_trace::git::snapshots::capture_tree;
use pi_trace::git::test_utils::TmpRepo;
use pi_trace::trace::blame::{BlameLabel, blame_committed, blame_uncommitted};
use pi_trace::trace::diff::DiffService;
use pi_trace::trace::finalize::{finalize_commit, write_raw_note};
use repos::{SESSION, store_for, trace_record};

#[test]
fn committed_file_without_note_is_all_human() {
    let repo = TmpRepo::new().expect("tmp repo");
    repo.write_file("a.txt", "one\ntwo\nthree\n").expect("write");
    repo.commit_all("human work").expect("commit");

    let lines = blame_committed(repo.repo(), "a.txt", None).expect("blame");
    assert_eq!(lines.len(), 3);
    for line in &lines {
        assert_eq!(line.label, BlameLabel::Human);
    }
    assert_eq!(lines[0].content, "one");
}

#[test]
fn committed_blame_attributes_ai_lines_and_leaves_rest() {
    let repo = TmpRepo::new().expect("tmp repo");
    repo.write_file("a.txt", "human\n").expect("write");
    repo.commit_all("human base").expect("commit");

    // The agent appends a line, which gets committed and finalized.
    let s0 = capture_tree(repo.repo()).expect("capture");
    repo.write_file("a.txt", "human\nai line\n").expect("write");
    let s1 = capture_tree(repo.repo()).expect("capture");

    let store = store_for(&repo);
    store
        .append(&trace_record("T1", "2026-01-10T12:00:00Z", &s0, &s1, &["a.txt"], "append a line"))
        .expect("append");
    repo.commit_all("ai work").expect("commit");

    let mut diffs = DiffService::new();
    finalize_commit(repo.repo(), &store, &mut diffs, None, SESSION, None, None)
        .expect("finalize");

    let lines = blame_committed(repo.repo(), "a.txt", None).expect("blame");
    assert_eq!(lines.len(), 2);

    // Line 1 comes from the note-less human commit.
    assert_eq!(lines[0].label, BlameLabel::Human);

    // Line 2 comes from the finalized AI commit.
    match &lines[1].label {
        BlameLabel::Prompt(attribution) => {
            assert_eq!(attribution.trace_id, "T1");
            assert_eq!(attribution.user_message, "append a line");
            assert_eq!(attribution.session_id, SESSION);
            assert!(attribution.commit_sha.is_some());
        }
        other => panic!("expected prompt attribution, got {:?}", other),
    }
}

#[test]
fn human_lines_inside_traced_commit_are_untraced() {
    let repo = TmpRepo::new().expect("tmp repo");
    repo.write_file("a.txt", "").expect("write");
    repo.commit_all("seed").expect("commit");

    let s0 = capture_tree(repo.repo()).expect("capture");
    repo.write_file("a.txt", "ai\n").expect("write");
    let s1 = capture_tree(repo.repo()).expect("capture");

    // A manual line lands in the same commit, after the trace.
    repo.write_file("a.txt", "ai\nmanual\n").expect("write");

    let store = store_for(&repo);
    store
        .append(&trace_record("T1", "2026-01-10T12:00:00Z", &s0, &s1, &["a.txt"], "write ai line"))
        .expect("append");
    repo.commit_all("mixed commit").expect("commit");

    let mut diffs = DiffService::new();
    finalize_commit(repo.repo(), &store, &mut diffs, None, SESSION, None, None)
        .expect("finalize");

    let lines = blame_committed(repo.repo(), "a.txt", None).expect("blame");
    assert_eq!(lines.len(), 2);
    assert!(matches!(lines[0].label, BlameLabel::Prompt(_)));
    assert_eq!(lines[1].label, BlameLabel::Untraced);
}

#[test]
fn raw_note_classifies_as_unresolved() {
    let repo = TmpRepo::new().expect("tmp repo");
    repo.write_file("a.txt", "").expect("write");
    repo.commit_all("seed").expect("commit");

    let s0 = capture_tree(repo.repo()).expect("capture");
    repo.write_file("a.txt", "ai\n").expect("write");
    let s1 = capture_tree(repo.repo()).expect("capture");

    let store = store_for(&repo);
    store
        .append(&trace_record("T1", "2026-01-10T12:00:00Z", &s0, &s1, &["a.txt"], "write"))
        .expect("append");
    repo.commit_all("commit with raw note").expect("commit");
    write_raw_note(repo.repo(), &store).expect("raw note");

    let lines = blame_committed(repo.repo(), "a.txt", None).expect("blame");
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].label, BlameLabel::Unresolved);
}

#[test]
fn committed_blame_respects_line_range() {
    let repo = TmpRepo::new().expect("tmp repo");
    repo.write_file("a.txt", "one\ntwo\nthree\nfour\n").expect("write");
    repo.commit_all("base").expect("commit");

    let lines = blame_committed(repo.repo(), "a.txt", Some((2, 3))).expect("blame");
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0].line, 2);
    assert_eq!(lines[0].content, "two");
    assert_eq!(lines[1].line, 3);
}

#[test]
fn uncommitted_file_without_traces_is_pre_session() {
    let repo = TmpRepo::new().expect("tmp repo");
    repo.write_file("dirty.txt", "a\nb\n").expect("write");

    let store = store_for(&repo);
    let mut diffs = DiffService::new();
    let lines =
        blame_uncommitted(repo.repo(), &store, &mut diffs, "dirty.txt", None).expect("blame");
    assert_eq!(lines.len(), 2);
    for line in &lines {
        assert_eq!(line.label, BlameLabel::PreSession);
    }
}

#[test]
fn uncommitted_blame_attributes_traced_lines() {
    let repo = TmpRepo::new().expect("tmp repo");
    repo.write_file("dirty.txt", "base\n").expect("write");
    repo.commit_all("seed").expect("commit");

    let s0 = capture_tree(repo.repo()).expect("capture");
    repo.write_file("dirty.txt", "base\nai one\nai two\n").expect("write");
    let s1 = capture_tree(repo.repo()).expect("capture");

    let store = store_for(&repo);
    store
        .append(&trace_record("T1", "2026-01-10T12:00:00Z", &s0, &s1, &["dirty.txt"], "add two lines"))
        .expect("append");

    let mut diffs = DiffService::new();
    let lines =
        blame_uncommitted(repo.repo(), &store, &mut diffs, "dirty.txt", None).expect("blame");
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0].label, BlameLabel::PreSession);
    for line in &lines[1..] {
        match &line.label {
            BlameLabel::Prompt(attribution) => {
                assert_eq!(attribution.trace_id, "T1");
                assert_eq!(attribution.user_message, "add two lines");
                assert!(attribution.commit_sha.is_none());
            }
            other => panic!("expected prompt attribution, got {:?}", other),
        }
    }
}

#[test]
fn uncommitted_blame_nullifies_manual_edits_after_trace() {
    let repo = TmpRepo::new().expect("tmp repo");
    repo.write_file("dirty.txt", "").expect("write");

    let s0 = capture_tree(repo.repo()).expect("capture");
    repo.write_file("dirty.txt", "ai\n").expect("write");
    let s1 = capture_tree(repo.repo()).expect("capture");

    let store = store_for(&repo);
    store
        .append(&trace_record("T1", "2026-01-10T12:00:00Z", &s0, &s1, &["dirty.txt"], "write"))
        .expect("append");

    // Manual edit after the trace, still uncommitted.
    repo.write_file("dirty.txt", "ai\nmanual\n").expect("write");

    let mut diffs = DiffService::new();
    let lines =
        blame_uncommitted(repo.repo(), &store, &mut diffs, "dirty.txt", None).expect("blame");
    assert_eq!(lines.len(), 2);
    assert!(matches!(lines[0].label, BlameLabel::Prompt(_)));
    assert_eq!(lines[1].label, BlameLabel::PreSession);
}

#[test]
fn uncommitted_blame_slices_requested_range() {
    let repo = TmpRepo::new().expect("tmp repo");
    repo.write_file("dirty.txt", "a\nb\nc\nd\n").expect("write");

    let store = store_for(&repo);
    let mut diffs = DiffService::new();
    let lines = blame_uncommitted(repo.repo(), &store, &mut diffs, "dirty.txt", Some((2, 3)))
        .expect("blame");
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0].line, 2);
    assert_eq!(lines[0].content, "b");
}

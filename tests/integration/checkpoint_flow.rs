//! End-to-end checkpoint create/rollback/cleanup flows against real
//! repositories.

use std::fs;

use backstitch::{CheckpointKind, Error};

use crate::helpers::{
    commit_file, git_stdout, head_revision, init_test_repo, manager_for, status_porcelain,
};

#[test]
fn test_create_is_transparent_on_dirty_tree() {
    let repo = init_test_repo();
    let root = repo.path();
    let mut manager = manager_for(root);

    fs::write(root.join("README.md"), "# Test Repository\nedited\n").unwrap();
    fs::write(root.join("scratch.txt"), "untracked notes").unwrap();
    let status_before = status_porcelain(root);

    let checkpoint = manager
        .create_checkpoint(
            "implement",
            CheckpointKind::PrePhase,
            None,
            None,
            Some("before agent edits"),
        )
        .unwrap();

    assert!(checkpoint.has_uncommitted);
    assert!(checkpoint.stash_ref.is_some());

    // The working tree is byte-for-byte what it was before the call.
    assert_eq!(
        fs::read_to_string(root.join("README.md")).unwrap(),
        "# Test Repository\nedited\n"
    );
    assert_eq!(
        fs::read_to_string(root.join("scratch.txt")).unwrap(),
        "untracked notes"
    );
    assert_eq!(status_porcelain(root), status_before);
}

#[test]
fn test_rollback_restores_clean_checkpoint() {
    let repo = init_test_repo();
    let root = repo.path();
    let mut manager = manager_for(root);

    let checkpoint = manager
        .create_checkpoint("plan", CheckpointKind::Manual, None, None, None)
        .unwrap();
    assert!(!checkpoint.has_uncommitted);
    assert_eq!(checkpoint.commit_hash, head_revision(root));

    commit_file(root, "feature.rs", "fn main() {}\n", "Add feature");
    assert_ne!(head_revision(root), checkpoint.commit_hash);

    let restored = manager.rollback_to_checkpoint(&checkpoint.id, true).unwrap();
    assert!(restored);
    assert_eq!(head_revision(root), checkpoint.commit_hash);
    assert_eq!(status_porcelain(root), "");
}

#[test]
fn test_rollback_restores_dirty_tree_byte_for_byte() {
    let repo = init_test_repo();
    let root = repo.path();
    commit_file(root, "x.txt", "0", "Add x");
    commit_file(root, "y.txt", "keep", "Add y");
    let mut manager = manager_for(root);

    // Capture with x.txt dirty at "1".
    fs::write(root.join("x.txt"), "1").unwrap();
    let checkpoint = manager
        .create_checkpoint("modify", CheckpointKind::PrePhase, None, None, None)
        .unwrap();
    assert!(checkpoint.has_uncommitted);

    // Unrelated mutation after the checkpoint.
    fs::write(root.join("x.txt"), "2").unwrap();
    fs::remove_file(root.join("y.txt")).unwrap();

    let restored = manager.rollback_to_checkpoint(&checkpoint.id, true).unwrap();
    assert!(restored);
    assert_eq!(head_revision(root), checkpoint.commit_hash);
    assert_eq!(fs::read_to_string(root.join("x.txt")).unwrap(), "1");
    assert_eq!(fs::read_to_string(root.join("y.txt")).unwrap(), "keep");
}

#[test]
fn test_second_rollback_to_consumed_stash_restores_commit_only() {
    let repo = init_test_repo();
    let root = repo.path();
    commit_file(root, "x.txt", "0", "Add x");
    let mut manager = manager_for(root);

    fs::write(root.join("x.txt"), "1").unwrap();
    let checkpoint = manager
        .create_checkpoint("modify", CheckpointKind::PrePhase, None, None, None)
        .unwrap();

    assert!(manager.rollback_to_checkpoint(&checkpoint.id, true).unwrap());
    assert_eq!(fs::read_to_string(root.join("x.txt")).unwrap(), "1");

    // Mutate again; the stash was consumed by the first rollback, so the
    // second restores the commit state and reports partial success.
    fs::write(root.join("x.txt"), "3").unwrap();
    let restored = manager.rollback_to_checkpoint(&checkpoint.id, true).unwrap();
    assert!(!restored);
    assert_eq!(head_revision(root), checkpoint.commit_hash);
    assert_eq!(fs::read_to_string(root.join("x.txt")).unwrap(), "0");
}

#[test]
fn test_identical_creates_are_independent_checkpoints() {
    let repo = init_test_repo();
    let root = repo.path();
    let mut manager = manager_for(root);

    let first = manager
        .create_checkpoint("build", CheckpointKind::Manual, Some("task-1"), None, None)
        .unwrap();
    let second = manager
        .create_checkpoint("build", CheckpointKind::Manual, Some("task-1"), None, None)
        .unwrap();
    assert_ne!(first.id, second.id);

    let listed = manager.list_checkpoints(None, None, 10).unwrap();
    assert_eq!(listed.len(), 2);

    assert!(manager.rollback_to_checkpoint(&first.id, true).unwrap());
    assert!(manager.rollback_to_checkpoint(&second.id, true).unwrap());
}

#[test]
fn test_rollback_unknown_id_leaves_repository_untouched() {
    let repo = init_test_repo();
    let root = repo.path();
    let mut manager = manager_for(root);

    fs::write(root.join("draft.txt"), "do not lose this").unwrap();
    let head_before = head_revision(root);

    let err = manager
        .rollback_to_checkpoint("nonexistent-id", true)
        .expect_err("unknown id must fail");
    assert!(matches!(err, Error::NotFound(_)));

    assert_eq!(head_revision(root), head_before);
    assert_eq!(
        fs::read_to_string(root.join("draft.txt")).unwrap(),
        "do not lose this"
    );
}

#[test]
fn test_list_filters_by_task_newest_first() {
    let repo = init_test_repo();
    let root = repo.path();
    let mut manager = manager_for(root);

    let a1 = manager
        .create_checkpoint("plan", CheckpointKind::Auto, Some("task-a"), None, None)
        .unwrap();
    manager
        .create_checkpoint("plan", CheckpointKind::Auto, Some("task-b"), None, None)
        .unwrap();
    let a2 = manager
        .create_checkpoint("implement", CheckpointKind::Auto, Some("task-a"), None, None)
        .unwrap();

    let for_a = manager.list_checkpoints(Some("task-a"), None, 10).unwrap();
    let ids: Vec<&str> = for_a.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec![a2.id.as_str(), a1.id.as_str()]);
}

#[test]
fn test_cleanup_keeps_most_recent_and_deletes_markers() {
    let repo = init_test_repo();
    let root = repo.path();
    let mut manager = manager_for(root);

    let mut ids = Vec::new();
    for n in 0..5 {
        let checkpoint = manager
            .create_checkpoint(&format!("phase-{n}"), CheckpointKind::Auto, None, None, None)
            .unwrap();
        ids.push(checkpoint.id);
    }

    let outcome = manager.cleanup_old_checkpoints(2).unwrap();
    assert_eq!(outcome.removed, 3);
    assert_eq!(outcome.failed, 0);

    let remaining = manager.list_checkpoints(None, None, 10).unwrap();
    let remaining_ids: Vec<&str> = remaining.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(remaining_ids, vec![ids[4].as_str(), ids[3].as_str()]);

    let tags = git_stdout(&["tag", "--list", "backstitch/*"], root);
    assert_eq!(tags.lines().count(), 2);
}

#[test]
fn test_corrupt_registry_blocks_writes_without_rebuilding() {
    let repo = init_test_repo();
    let root = repo.path();
    let mut manager = manager_for(root);

    manager
        .create_checkpoint("build", CheckpointKind::Manual, None, None, None)
        .unwrap();

    let registry_path = root.join(".backstitch").join("registry.json");
    fs::write(&registry_path, "not json{").unwrap();

    let err = manager
        .create_checkpoint("build", CheckpointKind::Manual, None, None, None)
        .expect_err("corrupt registry must abort creation");
    assert!(matches!(err, Error::CorruptRegistry { .. }));

    // The corrupted document was left exactly as found.
    assert_eq!(fs::read_to_string(&registry_path).unwrap(), "not json{");
}

#[test]
fn test_registry_document_and_marker_payload_agree() {
    let repo = init_test_repo();
    let root = repo.path();
    let mut manager = manager_for(root);

    let checkpoint = manager
        .create_checkpoint(
            "implement",
            CheckpointKind::PrePhase,
            Some("task-9"),
            Some("in_progress"),
            Some("pre-agent snapshot"),
        )
        .unwrap();

    let raw = fs::read_to_string(root.join(".backstitch").join("registry.json")).unwrap();
    let document: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(document["current_checkpoint_id"], checkpoint.id.as_str());
    let entry = &document["checkpoints"][0];
    assert_eq!(entry["task_id"], "task-9");
    assert_eq!(entry["checkpoint_type"], "pre_phase");
    assert_eq!(entry["branch"], "main");
    assert_eq!(entry["workflow_state"], "in_progress");

    // The marker anchors the same record inside the repository itself.
    let payload = git_stdout(
        &[
            "tag",
            "--list",
            &checkpoint.marker_name(),
            "--format=%(contents)",
        ],
        root,
    );
    let anchored: serde_json::Value = serde_json::from_str(&payload).unwrap();
    assert_eq!(anchored["id"], checkpoint.id.as_str());
    assert_eq!(anchored["commit_hash"], checkpoint.commit_hash.as_str());
}

#[test]
fn test_recover_from_markers_after_registry_loss() {
    let repo = init_test_repo();
    let root = repo.path();
    let mut manager = manager_for(root);

    let first = manager
        .create_checkpoint("plan", CheckpointKind::Manual, None, None, None)
        .unwrap();
    let second = manager
        .create_checkpoint("implement", CheckpointKind::Manual, None, None, None)
        .unwrap();

    fs::remove_file(root.join(".backstitch").join("registry.json")).unwrap();

    let recovered = manager.recover_from_markers().unwrap();
    let ids: Vec<&str> = recovered.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec![first.id.as_str(), second.id.as_str()]);
}

#[test]
fn test_diff_since_describes_working_tree_drift() {
    let repo = init_test_repo();
    let root = repo.path();
    let mut manager = manager_for(root);

    let checkpoint = manager
        .create_checkpoint("plan", CheckpointKind::Manual, None, None, None)
        .unwrap();

    fs::write(root.join("README.md"), "# Test Repository\nedited\n").unwrap();
    let summary = manager.diff_since(&checkpoint.id).unwrap();
    assert!(summary.contains("README.md"));
}

use crate::checkpoints::delete_all_checkpoints;
use crate::error::PiTraceError;
use crate::git::refs::sync_protection_refs;
use crate::git::repository::find_repository;
use crate::trace::store::TraceStore;
use std::collections::HashSet;
use std::fs;

/// `pi-trace reset`: drop all checkpoints, protection refs, traces, and
/// session state for this working tree. Notes on commits are kept; they
/// are part of history, not session state.
pub fn run_reset() -> Result<(), PiTraceError> {
    let repo = find_repository()?;

    delete_all_checkpoints(&repo)?;
    sync_protection_refs(&repo, &HashSet::new())?;

    let store = TraceStore::for_worktree(repo.workdir());
    if store.dir().exists() {
        fs::remove_dir_all(store.dir())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoints::CheckpointManager;
    use crate::git::refs::{CHECKPOINTS_PREFIX, TRACE_SHAS_PREFIX, list_refs};
    use crate::git::snapshots::capture_tree;
    use crate::git::test_utils::TmpRepo;

    #[test]
    fn test_reset_clears_refs_and_store() {
        let tmp_repo = TmpRepo::new().expect("tmp repo");
        tmp_repo.write_file("a.txt", "v1\n").expect("write");
        let snapshot = capture_tree(tmp_repo.repo()).expect("capture");

        let mut manager = CheckpointManager::new("6f9619ff-8b86-4011-b42d-00c04fc964ff");
        manager
            .materialize(tmp_repo.repo(), &snapshot, "e1", 1736500000000)
            .expect("materialize");

        let mut live = HashSet::new();
        live.insert(snapshot.clone());
        sync_protection_refs(tmp_repo.repo(), &live).expect("protect");

        let store = TraceStore::for_worktree(tmp_repo.path());
        store.init().expect("init");

        // run_reset discovers via cwd; exercise the pieces directly instead.
        delete_all_checkpoints(tmp_repo.repo()).expect("delete checkpoints");
        sync_protection_refs(tmp_repo.repo(), &HashSet::new()).expect("unprotect");
        fs::remove_dir_all(store.dir()).expect("remove store");

        assert!(
            list_refs(tmp_repo.repo(), CHECKPOINTS_PREFIX)
                .expect("list")
                .is_empty()
        );
        assert!(
            list_refs(tmp_repo.repo(), TRACE_SHAS_PREFIX)
                .expect("list")
                .is_empty()
        );
        assert!(!store.dir().exists());
    }
}

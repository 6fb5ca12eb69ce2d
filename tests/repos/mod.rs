//! Shared helpers for the integration suite: disposable repos plus
//! hand-built trace records over real snapshots.
#![allow(dead_code)]

use pi_trace::git::test_utils::TmpRepo;
use pi_trace::trace::record::{
    Contributor, TraceFile, TraceMetadata, TraceRecord,
};
use pi_trace::trace::store::TraceStore;
use std::collections::BTreeMap;

pub const SESSION: &str = "6f9619ff-8b86-4011-b42d-00c04fc964ff";

/// Build a trace record over two captured snapshots, touching `paths`.
pub fn trace_record(
    id: &str,
    timestamp: &str,
    before: &str,
    after: &str,
    paths: &[&str],
    user_message: &str,
) -> TraceRecord {
    TraceRecord {
        id: id.to_string(),
        timestamp: timestamp.to_string(),
        files: paths
            .iter()
            .map(|path| TraceFile {
                path: path.to_string(),
                contributor: Contributor::Ai {
                    model_id: Some("model-1".to_string()),
                },
                ranges: Vec::new(),
            })
            .collect(),
        metadata: TraceMetadata {
            before_sha: before.to_string(),
            after_sha: after.to_string(),
            session_id: SESSION.to_string(),
            entry_id: format!("entry-{}", id),
            user_message: user_message.to_string(),
            assistant_message: None,
            file_stats: BTreeMap::new(),
        },
        vcs: None,
        tool: None,
    }
}

pub fn store_for(repo: &TmpRepo) -> TraceStore {
    let store = TraceStore::for_worktree(repo.path());
    store.init().expect("init trace store");
    store
}

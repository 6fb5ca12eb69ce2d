use crate::error::PiTraceError;
use crate::git::refs;
use crate::git::repository::Repository;
use crate::git::snapshots;
use crate::trace::attribution::{build_attribution, resolve_ranges, sort_for_composition};
use crate::trace::diff::DiffService;
use crate::trace::record::{
    Contributor, FileStat, ResolvedRange, TraceFile, TraceMetadata, TraceNote, TraceRecord,
};
use crate::trace::store::TraceStore;
use crate::utils::debug_log;
use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use uuid::Uuid;

pub struct FinalizeOutcome {
    /// The open before-snapshot after finalization: the mid-loop capture
    /// when a trace was open going in, otherwise whatever the caller held.
    pub trace_before: Option<String>,
    pub note_written: bool,
}

/// Build a trace record from a snapshot pair and its per-path stats.
#[allow(clippy::too_many_arguments)]
pub(crate) fn trace_from_snapshots(
    before: &str,
    after: &str,
    stats: &[(String, u32, u32)],
    session_id: &str,
    entry_id: &str,
    user_message: &str,
    assistant_message: Option<&str>,
    model_id: Option<&str>,
    revision: Option<String>,
) -> TraceRecord {
    let files = stats
        .iter()
        .map(|(path, _, _)| TraceFile {
            path: path.clone(),
            contributor: Contributor::Ai {
                model_id: model_id.map(|m| m.to_string()),
            },
            ranges: Vec::new(),
        })
        .collect();

    let mut file_stats = BTreeMap::new();
    for (path, additions, deletions) in stats {
        file_stats.insert(
            path.clone(),
            FileStat {
                additions: *additions,
                deletions: *deletions,
            },
        );
    }

    TraceRecord {
        id: Uuid::new_v4().to_string(),
        timestamp: Utc::now().to_rfc3339(),
        files,
        metadata: TraceMetadata {
            before_sha: before.to_string(),
            after_sha: after.to_string(),
            session_id: session_id.to_string(),
            entry_id: entry_id.to_string(),
            user_message: user_message.to_string(),
            assistant_message: assistant_message.map(|m| m.to_string()),
            file_stats,
        },
        vcs: revision.map(|r| crate::trace::record::VcsInfo { revision: r }),
        tool: Some(crate::trace::record::ToolInfo {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
    }
}

/// Finalize the commit at head: pair any open before-snapshot, resolve
/// attribution across the committed files, attach the note, and collect
/// traces the working tree no longer needs.
pub fn finalize_commit(
    repo: &Repository,
    store: &TraceStore,
    diffs: &mut DiffService,
    trace_before: Option<String>,
    session_id: &str,
    entry_id: Option<&str>,
    user_message: Option<&str>,
) -> Result<FinalizeOutcome, PiTraceError> {
    // Close mid-loop edits first so the note reflects agent changes made
    // between turn start and this commit. Must happen before the log read.
    let mut new_trace_before = trace_before.clone();
    if let Some(open_before) = trace_before {
        let mid = snapshots::capture_tree(repo)?;
        let stats = snapshots::diff_numstat(repo, &open_before, &mid)?;
        if !stats.is_empty() {
            let record = trace_from_snapshots(
                &open_before,
                &mid,
                &stats,
                session_id,
                entry_id.unwrap_or_default(),
                user_message.unwrap_or_default(),
                None,
                None,
                repo.head_commit()?,
            );
            store.append(&record)?;
        }
        new_trace_before = Some(mid);
    }

    let Some(head) = repo.head_commit()? else {
        return Ok(FinalizeOutcome {
            trace_before: new_trace_before,
            note_written: false,
        });
    };
    let committed_files = repo.list_commit_files(&head)?;

    let all_traces = store.read_all()?;
    let mut retained: Vec<&TraceRecord> = all_traces
        .iter()
        .filter(|trace| trace.files.iter().any(|f| committed_files.contains(&f.path)))
        .collect();
    sort_for_composition(&mut retained);

    let mut note_written = false;
    if !retained.is_empty() {
        let terminal = repo.rev_parse(&format!("{}^{{tree}}", head))?;

        // Deterministic path order keeps the serialized note byte-stable
        // across repeated finalizations of the same commit.
        let touched_paths: BTreeSet<&str> = retained
            .iter()
            .flat_map(|trace| trace.files.iter().map(|f| f.path.as_str()))
            .filter(|path| committed_files.contains(*path))
            .collect();

        let mut resolved: BTreeMap<String, Vec<ResolvedRange>> = BTreeMap::new();
        let mut contributing: HashSet<String> = HashSet::new();

        for path in touched_paths {
            let path_traces: Vec<&TraceRecord> = retained
                .iter()
                .copied()
                .filter(|trace| trace.touches_path(path))
                .collect();

            let attr =
                match build_attribution(repo, diffs, &path_traces, Some(&terminal), path) {
                    Ok(attr) => attr,
                    Err(e) => {
                        // One broken file must not abort the rest of the note.
                        debug_log(&format!("attribution failed for {}: {}", path, e));
                        continue;
                    }
                };

            let ranges = resolve_ranges(&attr);
            if !ranges.is_empty() {
                for range in &ranges {
                    contributing.insert(range.trace_id.clone());
                }
                resolved.insert(path.to_string(), ranges);
            }
        }

        if !contributing.is_empty() {
            let traces = retained
                .iter()
                .filter(|trace| contributing.contains(&trace.id))
                .map(|trace| project_to_committed(trace, &committed_files, &resolved))
                .collect();

            let note = TraceNote {
                traces,
                resolved: Some(resolved),
            };
            refs::notes_add(repo, &head, &note.serialize_to_string()?)?;
            note_written = true;
        }
    }

    // Traces whose files are all clean have been fully absorbed by history;
    // the in-session log stays bounded by outstanding dirtiness.
    let dirty = repo.dirty_paths()?;
    let absorbed: HashSet<String> = all_traces
        .iter()
        .filter(|trace| trace.files.iter().all(|f| !dirty.contains(&f.path)))
        .map(|trace| trace.id.clone())
        .collect();
    store.remove_ids(&absorbed)?;

    let mut live = store.snapshot_ids()?;
    if let Some(open) = &new_trace_before {
        live.insert(open.clone());
    }
    refs::sync_protection_refs(repo, &live)?;

    Ok(FinalizeOutcome {
        trace_before: new_trace_before,
        note_written,
    })
}

/// Copy of a trace for note inclusion: file list projected to the commit's
/// paths, each file carrying the ranges this trace contributed there.
fn project_to_committed(
    trace: &TraceRecord,
    committed_files: &HashSet<String>,
    resolved: &BTreeMap<String, Vec<ResolvedRange>>,
) -> TraceRecord {
    let mut projected = trace.clone();
    projected.files.retain(|f| committed_files.contains(&f.path));
    for file in &mut projected.files {
        file.ranges = resolved
            .get(&file.path)
            .map(|ranges| {
                ranges
                    .iter()
                    .filter(|range| range.trace_id == trace.id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
    }
    projected
        .metadata
        .file_stats
        .retain(|path, _| committed_files.contains(path));
    projected
}

/// Attach a raw, unresolved note to head: the local traces touching the
/// committed files, with no per-line resolution. Used by the post-commit
/// hook so a dying agent process still leaves provenance behind; the next
/// finalization overwrites it with a resolved note.
pub fn write_raw_note(repo: &Repository, store: &TraceStore) -> Result<bool, PiTraceError> {
    let Some(head) = repo.head_commit()? else {
        return Ok(false);
    };
    let committed_files = repo.list_commit_files(&head)?;

    let all_traces = store.read_all()?;
    let mut retained: Vec<&TraceRecord> = all_traces
        .iter()
        .filter(|trace| trace.files.iter().any(|f| committed_files.contains(&f.path)))
        .collect();
    sort_for_composition(&mut retained);

    if retained.is_empty() {
        return Ok(false);
    }

    let note = TraceNote {
        traces: retained
            .iter()
            .map(|trace| {
                let mut projected = (*trace).clone();
                projected.files.retain(|f| committed_files.contains(&f.path));
                projected
            })
            .collect(),
        resolved: None,
    };
    refs::notes_add(repo, &head, &note.serialize_to_string()?)?;
    Ok(true)
}

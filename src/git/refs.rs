use crate::error::PiTraceError;
use crate::git::repository::{Repository, exec_git, exec_git_stdin};
use crate::trace::record::TraceNote;
use crate::utils::debug_log;
use std::collections::HashSet;

/// Notes ref carrying one JSON TraceNote per commit.
pub const TRACE_NOTES_REFNAME: &str = "pi-trace";

/// Namespace for working-tree snapshot checkpoints.
pub const CHECKPOINTS_PREFIX: &str = "refs/pi-checkpoints/";

/// Namespace for protection-only refs, one per live trace snapshot id.
pub const TRACE_SHAS_PREFIX: &str = "refs/pi-trace-shas/";

pub fn notes_add(
    repo: &Repository,
    commit_sha: &str,
    note_content: &str,
) -> Result<(), PiTraceError> {
    let mut args = repo.global_args_for_exec();
    args.push("notes".to_string());
    args.push(format!("--ref={}", TRACE_NOTES_REFNAME));
    args.push("add".to_string());
    args.push("-f".to_string()); // Always force overwrite
    args.push("-F".to_string());
    args.push("-".to_string()); // Read note content from stdin
    args.push(commit_sha.to_string());

    // Use stdin to provide the note content to avoid command line length limits
    exec_git_stdin(&args, note_content.as_bytes())?;
    Ok(())
}

/// Show a trace note and return its JSON content if found, or None if it doesn't exist.
pub fn show_trace_note(repo: &Repository, commit_sha: &str) -> Option<String> {
    let mut args = repo.global_args_for_exec();
    args.push("notes".to_string());
    args.push(format!("--ref={}", TRACE_NOTES_REFNAME));
    args.push("show".to_string());
    args.push(commit_sha.to_string());

    match exec_git(&args) {
        Ok(output) => String::from_utf8(output.stdout)
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty()),
        Err(_) => None,
    }
}

/// Fetch and parse the trace note attached to a commit. Malformed notes are
/// treated as absent after a debug log; blame classification must not crash
/// on hand-edited notes.
pub fn get_trace_note(repo: &Repository, commit_sha: &str) -> Option<TraceNote> {
    let content = show_trace_note(repo, commit_sha)?;
    match TraceNote::deserialize_from_string(&content) {
        Ok(note) => Some(note),
        Err(e) => {
            debug_log(&format!("malformed trace note on {}: {}", commit_sha, e));
            None
        }
    }
}

/// Check if a ref exists in the repository
pub fn ref_exists(repo: &Repository, ref_name: &str) -> bool {
    let mut args = repo.global_args_for_exec();
    args.push("show-ref".to_string());
    args.push("--verify".to_string());
    args.push("--quiet".to_string());
    args.push(ref_name.to_string());

    exec_git(&args).is_ok()
}

pub fn update_ref(repo: &Repository, ref_name: &str, target: &str) -> Result<(), PiTraceError> {
    let mut args = repo.global_args_for_exec();
    args.push("update-ref".to_string());
    args.push(ref_name.to_string());
    args.push(target.to_string());
    exec_git(&args)?;
    Ok(())
}

pub fn delete_ref(repo: &Repository, ref_name: &str) -> Result<(), PiTraceError> {
    let mut args = repo.global_args_for_exec();
    args.push("update-ref".to_string());
    args.push("-d".to_string());
    args.push(ref_name.to_string());
    exec_git(&args)?;
    Ok(())
}

/// Resolve a ref to the object it points at, or None when it does not exist.
pub fn resolve_ref(repo: &Repository, ref_name: &str) -> Option<String> {
    repo.rev_parse(ref_name).ok()
}

/// List ref names under a prefix, with the prefix stripped.
///
/// Checkpoint refs point at bare trees, which carry no committer date, so
/// callers needing chronological order sort on the timestamp embedded in
/// the name rather than on creatordate.
pub fn list_refs(repo: &Repository, prefix: &str) -> Result<Vec<String>, PiTraceError> {
    let mut args = repo.global_args_for_exec();
    args.push("for-each-ref".to_string());
    args.push("--format=%(refname)".to_string());
    args.push(prefix.trim_end_matches('/').to_string());

    let output = exec_git(&args)?;
    let stdout = String::from_utf8(output.stdout)?;
    Ok(stdout
        .lines()
        .filter_map(|line| line.strip_prefix(prefix))
        .map(|s| s.to_string())
        .collect())
}

/// Reconcile the protection-ref namespace with the live snapshot inventory:
/// one ref per id in `live`, nothing else.
pub fn sync_protection_refs(
    repo: &Repository,
    live: &HashSet<String>,
) -> Result<(), PiTraceError> {
    let existing: HashSet<String> = list_refs(repo, TRACE_SHAS_PREFIX)?.into_iter().collect();

    for stale in existing.difference(live) {
        delete_ref(repo, &format!("{}{}", TRACE_SHAS_PREFIX, stale))?;
    }
    for missing in live.difference(&existing) {
        update_ref(repo, &format!("{}{}", TRACE_SHAS_PREFIX, missing), missing)?;
    }
    Ok(())
}

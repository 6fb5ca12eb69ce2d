use crate::error::PiTraceError;
use crate::git::refs;
use crate::git::repository::Repository;
use crate::git::snapshots;
use crate::trace::attribution::{build_attribution, sort_for_composition};
use crate::trace::diff::{DiffService, unquote_git_path};
use crate::trace::record::{TraceNote, TraceRecord};
use crate::trace::store::TraceStore;
use std::collections::HashMap;
use std::fs;

/// Where a line came from, as far as the trace system can tell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlameLabel {
    /// Commit carries no trace note at all.
    Human,
    /// Commit carries a raw note that was never resolved.
    Unresolved,
    /// Commit was traced but this line is not covered by any range.
    Untraced,
    /// Uncommitted line not produced by any current-session trace.
    PreSession,
    /// Line authored by a recorded prompt.
    Prompt(PromptAttribution),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptAttribution {
    pub trace_id: String,
    pub user_message: String,
    pub assistant_message: Option<String>,
    pub model_id: Option<String>,
    pub timestamp: String,
    pub commit_sha: Option<String>,
    pub session_id: String,
    pub entry_id: String,
}

impl PromptAttribution {
    fn from_trace(trace: &TraceRecord, path: &str, commit_sha: Option<String>) -> Self {
        PromptAttribution {
            trace_id: trace.id.clone(),
            user_message: trace.metadata.user_message.clone(),
            assistant_message: trace.metadata.assistant_message.clone(),
            model_id: trace.model_id_for_path(path).map(|m| m.to_string()),
            timestamp: trace.timestamp.clone(),
            commit_sha,
            session_id: trace.metadata.session_id.clone(),
            entry_id: trace.metadata.entry_id.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlameLine {
    /// 1-based line number in the current version of the file.
    pub line: u32,
    pub content: String,
    pub label: BlameLabel,
}

/// One parsed record of `git blame --line-porcelain` output.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PorcelainRecord {
    commit_sha: String,
    orig_line: u32,
    final_line: u32,
    filename: Option<String>,
    content: String,
}

fn is_porcelain_header(line: &str) -> Option<(String, u32, u32)> {
    let mut parts = line.split(' ');
    let sha = parts.next()?;
    let valid_sha = (sha.len() == 40 || sha.len() == 64)
        && sha.bytes().all(|b| b.is_ascii_hexdigit());
    if !valid_sha {
        return None;
    }
    let orig_line = parts.next()?.parse::<u32>().ok()?;
    let final_line = parts.next()?.parse::<u32>().ok()?;
    Some((sha.to_string(), orig_line, final_line))
}

/// Parse `--line-porcelain` output. Each record starts with a
/// `<sha> <orig> <final> ...` header, may carry a `filename` line, and is
/// terminated by its tab-prefixed content line.
fn parse_line_porcelain(output: &str) -> Vec<PorcelainRecord> {
    let mut records = Vec::new();
    let mut current: Option<PorcelainRecord> = None;

    for line in output.lines() {
        if current.is_some() {
            if let Some(content) = line.strip_prefix('\t') {
                let mut record = current.take().expect("checked above");
                record.content = content.to_string();
                records.push(record);
            } else if let Some(name) = line.strip_prefix("filename ") {
                if let Some(record) = current.as_mut() {
                    record.filename = Some(unquote_git_path(name));
                }
            }
            // author/committer/summary headers are not needed here.
            continue;
        }

        if let Some((sha, orig_line, final_line)) = is_porcelain_header(line) {
            current = Some(PorcelainRecord {
                commit_sha: sha,
                orig_line,
                final_line,
                filename: None,
                content: String::new(),
            });
        }
    }

    records
}

/// Per-commit note lookups, cached for the duration of one blame call.
struct NoteCache<'a> {
    repo: &'a Repository,
    notes: HashMap<String, Option<TraceNote>>,
}

impl<'a> NoteCache<'a> {
    fn new(repo: &'a Repository) -> Self {
        NoteCache {
            repo,
            notes: HashMap::new(),
        }
    }

    fn get(&mut self, commit_sha: &str) -> &Option<TraceNote> {
        if !self.notes.contains_key(commit_sha) {
            let note = refs::get_trace_note(self.repo, commit_sha);
            self.notes.insert(commit_sha.to_string(), note);
        }
        &self.notes[commit_sha]
    }
}

/// Classify one committed line against its commit's note.
fn classify_committed(
    note: &Option<TraceNote>,
    path: &str,
    orig_line: u32,
    commit_sha: &str,
) -> BlameLabel {
    let Some(note) = note else {
        return BlameLabel::Human;
    };
    let Some(resolved) = &note.resolved else {
        return BlameLabel::Unresolved;
    };
    let Some(ranges) = resolved.get(path) else {
        return BlameLabel::Untraced;
    };
    let Some(range) = ranges.iter().find(|r| r.contains(orig_line)) else {
        return BlameLabel::Untraced;
    };
    let Some(trace) = note.trace(&range.trace_id) else {
        return BlameLabel::Untraced;
    };
    BlameLabel::Prompt(PromptAttribution::from_trace(
        trace,
        path,
        Some(commit_sha.to_string()),
    ))
}

/// Blame for a committed (clean) file: native line-level blame overlaid
/// with note lookups.
pub fn blame_committed(
    repo: &Repository,
    path: &str,
    range: Option<(u32, u32)>,
) -> Result<Vec<BlameLine>, PiTraceError> {
    let raw = snapshots::blame_line_porcelain(repo, path, range)?;
    let records = parse_line_porcelain(&raw);

    let mut cache = NoteCache::new(repo);
    let mut lines = Vec::with_capacity(records.len());
    for record in records {
        // Attribution was recorded against the path as committed; follow
        // the filename the blame record reports when present.
        let note_path = record.filename.as_deref().unwrap_or(path);
        let note = cache.get(&record.commit_sha).clone();
        let label = classify_committed(&note, note_path, record.orig_line, &record.commit_sha);
        lines.push(BlameLine {
            line: record.final_line,
            content: record.content,
            label,
        });
    }
    Ok(lines)
}

/// Blame for a dirty file: compose the local traces touching it and read
/// attribution off the resulting vector. Lines no trace covers are
/// pre-session (committed history or foreign edits).
pub fn blame_uncommitted(
    repo: &Repository,
    store: &TraceStore,
    diffs: &mut DiffService,
    path: &str,
    range: Option<(u32, u32)>,
) -> Result<Vec<BlameLine>, PiTraceError> {
    let content = fs::read_to_string(repo.workdir().join(path))?;
    let file_lines: Vec<&str> = content.lines().collect();
    let total = file_lines.len() as u32;

    let (start, end) = match range {
        Some((start, end)) => (start.max(1), end.min(total)),
        None => (1, total),
    };

    let all_traces = store.read_all()?;
    let mut traces: Vec<&TraceRecord> = all_traces
        .iter()
        .filter(|trace| trace.touches_path(path))
        .collect();
    sort_for_composition(&mut traces);

    let attr = if traces.is_empty() {
        Vec::new()
    } else {
        let working_tree = snapshots::capture_tree(repo)?;
        build_attribution(repo, diffs, &traces, Some(&working_tree), path)?
    };

    let mut lines = Vec::new();
    for line_number in start..=end {
        let entry = attr.get((line_number - 1) as usize).cloned().flatten();
        let label = match entry {
            Some(trace_id) => match traces.iter().find(|t| t.id == trace_id) {
                Some(trace) => {
                    BlameLabel::Prompt(PromptAttribution::from_trace(trace, path, None))
                }
                None => BlameLabel::PreSession,
            },
            None => BlameLabel::PreSession,
        };
        lines.push(BlameLine {
            line: line_number,
            content: file_lines
                .get((line_number - 1) as usize)
                .unwrap_or(&"")
                .to_string(),
            label,
        });
    }
    Ok(lines)
}

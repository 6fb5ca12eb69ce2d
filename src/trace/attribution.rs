//! Forward projection of per-line attribution through ordered trace diffs.
//!
//! The engine never inspects file content. It walks full-context diffs
//! between snapshots and carries a vector of per-line tags along: equal
//! lines keep their tag, deleted lines drop out, added lines take the tag
//! of whoever produced the diff. Changes between traces (the gaps) are
//! projected with a null tag, which is how manual edits end up untraced
//! without ever being detected directly.

use crate::error::PiTraceError;
use crate::git::repository::Repository;
use crate::trace::diff::{DiffHunk, DiffService, HunkKind};
use crate::trace::record::{ResolvedRange, TraceRecord};

/// One entry per line of the file at the current projection point: the id
/// of the trace that authored the line, or None.
pub type AttributionVector = Vec<Option<String>>;

/// Project `attr` through `hunks`, attributing added lines to `tag`.
///
/// The result has exactly one entry per equal or add line, i.e. the line
/// count of the after-version. An empty hunk sequence is the identity: the
/// diff service returns no hunks both for identical snapshots and for
/// files a snapshot pair never touched.
pub fn apply_hunks(
    attr: &AttributionVector,
    hunks: &[DiffHunk],
    tag: Option<&str>,
) -> AttributionVector {
    if hunks.is_empty() {
        return attr.clone();
    }

    let mut result = Vec::new();
    let mut source = 0usize;
    for hunk in hunks {
        match hunk.kind {
            HunkKind::Equal => {
                for _ in &hunk.lines {
                    // Shorter source vectors happen on the first trace of a
                    // file; everything before it is unattributed.
                    result.push(attr.get(source).cloned().flatten());
                    source += 1;
                }
            }
            HunkKind::Delete => {
                source += hunk.lines.len();
            }
            HunkKind::Add => {
                for _ in &hunk.lines {
                    result.push(tag.map(|t| t.to_string()));
                }
            }
        }
    }
    result
}

/// Order traces for composition: strictly by timestamp, which for RFC 3339
/// UTC strings is plain lexicographic order. The sort is stable so records
/// carrying identical timestamps keep their log order.
pub fn sort_for_composition(traces: &mut Vec<&TraceRecord>) {
    traces.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
}

/// Compose the attribution vector for `path` across an ordered trace
/// sequence, optionally ending at a terminal snapshot.
///
/// Gap diffs (previous after → current before) are projected with a null
/// tag before each trace's own diff; a trailing gap against `terminal`
/// nullifies whatever changed after the last trace.
pub fn build_attribution(
    repo: &Repository,
    diffs: &mut DiffService,
    traces: &[&TraceRecord],
    terminal: Option<&str>,
    path: &str,
) -> Result<AttributionVector, PiTraceError> {
    let mut attr: AttributionVector = Vec::new();
    if traces.is_empty() {
        return Ok(attr);
    }

    let mut prev_after: Option<&str> = None;
    for trace in traces {
        let before = trace.metadata.before_sha.as_str();
        let after = trace.metadata.after_sha.as_str();

        if let Some(prev) = prev_after {
            if prev != before {
                let gap = diffs.hunks_for_file(repo, prev, before, path)?;
                attr = apply_hunks(&attr, &gap, None);
            }
        }

        let hunks = diffs.hunks_for_file(repo, before, after, path)?;
        attr = apply_hunks(&attr, &hunks, Some(&trace.id));
        prev_after = Some(after);
    }

    if let (Some(terminal_sha), Some(last_after)) = (terminal, prev_after) {
        if terminal_sha != last_after {
            let gap = diffs.hunks_for_file(repo, last_after, terminal_sha, path)?;
            attr = apply_hunks(&attr, &gap, None);
        }
    }

    Ok(attr)
}

/// Collapse an attribution vector into maximal runs of identical non-null
/// trace ids, as 1-based inclusive ranges. Null runs are dropped.
pub fn resolve_ranges(attr: &AttributionVector) -> Vec<ResolvedRange> {
    let mut ranges: Vec<ResolvedRange> = Vec::new();

    for (index, entry) in attr.iter().enumerate() {
        let line = (index + 1) as u32;
        let Some(trace_id) = entry else {
            continue;
        };

        match ranges.last_mut() {
            Some(last) if last.trace_id == *trace_id && last.end + 1 == line => {
                last.end = line;
            }
            _ => ranges.push(ResolvedRange {
                start: line,
                end: line,
                trace_id: trace_id.clone(),
            }),
        }
    }

    ranges
}

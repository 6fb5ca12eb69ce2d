use crate::error::PiTraceError;
use crate::git::refs::{
    CHECKPOINTS_PREFIX, delete_ref, list_refs, resolve_ref, update_ref,
};
use crate::git::repository::Repository;
use crate::git::snapshots::{capture_tree, restore_tree};
use crate::utils::debug_log;
use chrono::Utc;
use std::collections::HashMap;

/// Per-session cap on regular checkpoints.
pub const CHECKPOINT_CAP: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointKind {
    Regular,
    Resume,
    BeforeRestore,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCheckpointName {
    pub kind: CheckpointKind,
    /// None for the legacy pre-session-scoped format.
    pub session_id: Option<String>,
    pub timestamp_ms: u64,
    pub entry_id: Option<String>,
}

/// Entry ids land in ref names, so anything outside [A-Za-z0-9-] maps to _.
pub fn sanitize_entry_id(entry_id: &str) -> String {
    entry_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn is_session_uuid(candidate: &str) -> bool {
    if candidate.len() != 36 {
        return false;
    }
    candidate.char_indices().all(|(i, c)| match i {
        8 | 13 | 18 | 23 => c == '-',
        _ => c.is_ascii_hexdigit(),
    })
}

fn is_millis(candidate: &str) -> bool {
    candidate.len() == 13 && candidate.bytes().all(|b| b.is_ascii_digit())
}

/// Split `<session_id>-<timestamp_ms>[-<entry_id>]` out of a name tail.
fn parse_scoped_tail(tail: &str) -> Option<(String, u64, Option<String>)> {
    if tail.len() < 36 + 1 + 13 {
        return None;
    }
    let session_id = tail.get(..36)?;
    if !is_session_uuid(session_id) || tail.as_bytes()[36] != b'-' {
        return None;
    }
    let rest = tail.get(37..)?;
    let millis = rest.get(..13)?;
    if !is_millis(millis) {
        return None;
    }
    let timestamp_ms = millis.parse::<u64>().ok()?;
    let entry_id = match rest.get(13..) {
        Some("") | None => None,
        Some(entry_tail) => Some(entry_tail.strip_prefix('-')?.to_string()),
    };
    Some((session_id.to_string(), timestamp_ms, entry_id))
}

pub fn parse_checkpoint_name(name: &str) -> Option<ParsedCheckpointName> {
    if let Some(tail) = name.strip_prefix("checkpoint-resume-") {
        let (session_id, timestamp_ms, entry_id) = parse_scoped_tail(tail)?;
        if entry_id.is_some() {
            return None;
        }
        return Some(ParsedCheckpointName {
            kind: CheckpointKind::Resume,
            session_id: Some(session_id),
            timestamp_ms,
            entry_id: None,
        });
    }

    if let Some(tail) = name.strip_prefix("before-restore-") {
        let (session_id, timestamp_ms, entry_id) = parse_scoped_tail(tail)?;
        if entry_id.is_some() {
            return None;
        }
        return Some(ParsedCheckpointName {
            kind: CheckpointKind::BeforeRestore,
            session_id: Some(session_id),
            timestamp_ms,
            entry_id: None,
        });
    }

    let tail = name.strip_prefix("checkpoint-")?;

    if let Some((session_id, timestamp_ms, entry_id)) = parse_scoped_tail(tail) {
        return Some(ParsedCheckpointName {
            kind: CheckpointKind::Regular,
            session_id: Some(session_id),
            timestamp_ms,
            entry_id: Some(entry_id?),
        });
    }

    // Legacy format: checkpoint-<timestamp_ms>-<entry_id>. Read-only; new
    // checkpoints are always session-scoped.
    let millis = tail.get(..13)?;
    if !is_millis(millis) {
        return None;
    }
    let entry_id = tail.get(13..)?.strip_prefix('-')?;
    if entry_id.is_empty() {
        return None;
    }
    Some(ParsedCheckpointName {
        kind: CheckpointKind::Regular,
        session_id: None,
        timestamp_ms: millis.parse::<u64>().ok()?,
        entry_id: Some(entry_id.to_string()),
    })
}

fn now_ms() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}

fn full_ref(name: &str) -> String {
    format!("{}{}", CHECKPOINTS_PREFIX, name)
}

/// Working-tree checkpoints for one session.
///
/// The entry-id map is a derived cache; ground truth is the ref namespace,
/// which `rebuild_from_refs` re-derives on session initialization.
pub struct CheckpointManager {
    session_id: String,
    entry_to_checkpoint: HashMap<String, String>,
}

impl CheckpointManager {
    pub fn new(session_id: &str) -> CheckpointManager {
        CheckpointManager {
            session_id: session_id.to_string(),
            entry_to_checkpoint: HashMap::new(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn checkpoint_for_entry(&self, entry_id: &str) -> Option<&String> {
        self.entry_to_checkpoint.get(&sanitize_entry_id(entry_id))
    }

    /// Rebuild the entry map from the ref namespace: newest first, keeping
    /// the first checkpoint seen per entry. Current-session refs only,
    /// except legacy refs which predate session scoping and are all loaded.
    pub fn rebuild_from_refs(&mut self, repo: &Repository) -> Result<(), PiTraceError> {
        self.entry_to_checkpoint.clear();

        let mut parsed: Vec<(ParsedCheckpointName, String)> = list_refs(repo, CHECKPOINTS_PREFIX)?
            .into_iter()
            .filter_map(|name| parse_checkpoint_name(&name).map(|p| (p, name)))
            .collect();
        parsed.sort_by(|a, b| b.0.timestamp_ms.cmp(&a.0.timestamp_ms));

        for (info, name) in parsed {
            if info.kind != CheckpointKind::Regular {
                continue;
            }
            let in_scope = match &info.session_id {
                Some(session_id) => session_id == &self.session_id,
                None => true,
            };
            if !in_scope {
                continue;
            }
            if let Some(entry_id) = info.entry_id {
                self.entry_to_checkpoint.entry(entry_id).or_insert(name);
            }
        }
        Ok(())
    }

    /// Snapshot the tree and record it as this session's resume point.
    pub fn capture_resume(&self, repo: &Repository) -> Result<String, PiTraceError> {
        let snapshot = capture_tree(repo)?;
        let name = format!("checkpoint-resume-{}-{:013}", self.session_id, now_ms());
        update_ref(repo, &full_ref(&name), &snapshot)?;
        Ok(name)
    }

    /// Name a previously captured snapshot under the entry id that became
    /// known at turn end, then prune.
    pub fn materialize(
        &mut self,
        repo: &Repository,
        snapshot: &str,
        entry_id: &str,
        timestamp_ms: u64,
    ) -> Result<String, PiTraceError> {
        let sanitized = sanitize_entry_id(entry_id);
        let name = format!(
            "checkpoint-{}-{:013}-{}",
            self.session_id, timestamp_ms, sanitized
        );
        update_ref(repo, &full_ref(&name), snapshot)?;
        self.entry_to_checkpoint.insert(sanitized, name.clone());
        self.prune(repo)?;
        Ok(name)
    }

    /// FIFO-prune this session's regular checkpoints down to the cap.
    fn prune(&mut self, repo: &Repository) -> Result<(), PiTraceError> {
        let mut own: Vec<(ParsedCheckpointName, String)> = list_refs(repo, CHECKPOINTS_PREFIX)?
            .into_iter()
            .filter_map(|name| parse_checkpoint_name(&name).map(|p| (p, name)))
            .filter(|(info, _)| {
                info.kind == CheckpointKind::Regular
                    && info.session_id.as_deref() == Some(self.session_id.as_str())
            })
            .collect();
        own.sort_by(|a, b| a.0.timestamp_ms.cmp(&b.0.timestamp_ms));

        if own.len() <= CHECKPOINT_CAP {
            return Ok(());
        }

        let excess = own.len() - CHECKPOINT_CAP;
        for (info, name) in own.into_iter().take(excess) {
            delete_ref(repo, &full_ref(&name))?;
            if let Some(entry_id) = info.entry_id {
                // The entry may already point at a newer checkpoint; only
                // drop the mapping when it still names the deleted ref.
                if self.entry_to_checkpoint.get(&entry_id) == Some(&name) {
                    self.entry_to_checkpoint.remove(&entry_id);
                }
            }
        }
        Ok(())
    }

    /// This session's before-restore refs, newest first.
    fn before_restore_refs(
        &self,
        repo: &Repository,
    ) -> Result<Vec<String>, PiTraceError> {
        let mut refs: Vec<(u64, String)> = list_refs(repo, CHECKPOINTS_PREFIX)?
            .into_iter()
            .filter_map(|name| parse_checkpoint_name(&name).map(|p| (p, name)))
            .filter(|(info, _)| {
                info.kind == CheckpointKind::BeforeRestore
                    && info.session_id.as_deref() == Some(self.session_id.as_str())
            })
            .map(|(info, name)| (info.timestamp_ms, name))
            .collect();
        refs.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(refs.into_iter().map(|(_, name)| name).collect())
    }

    /// Newest resume checkpoint for this session, used as the restore
    /// fallback when an entry has no checkpoint of its own.
    pub fn latest_resume(&self, repo: &Repository) -> Result<Option<String>, PiTraceError> {
        let mut refs: Vec<(u64, String)> = list_refs(repo, CHECKPOINTS_PREFIX)?
            .into_iter()
            .filter_map(|name| parse_checkpoint_name(&name).map(|p| (p, name)))
            .filter(|(info, _)| {
                info.kind == CheckpointKind::Resume
                    && info.session_id.as_deref() == Some(self.session_id.as_str())
            })
            .map(|(info, name)| (info.timestamp_ms, name))
            .collect();
        refs.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(refs.into_iter().map(|(_, name)| name).next())
    }

    /// Restore the named checkpoint into the working tree, first recording
    /// the current tree under a fresh before-restore ref. At most one
    /// before-restore ref exists per session afterwards. Failures are
    /// propagated; the caller cancels any navigation that triggered this.
    pub fn restore_with_backup(
        &mut self,
        repo: &Repository,
        checkpoint_name: &str,
    ) -> Result<(), PiTraceError> {
        let target = resolve_ref(repo, &full_ref(checkpoint_name)).ok_or_else(|| {
            PiTraceError::Generic(format!("checkpoint not found: {}", checkpoint_name))
        })?;

        let current = capture_tree(repo)?;
        let backup_name = format!("before-restore-{}-{:013}", self.session_id, now_ms());
        update_ref(repo, &full_ref(&backup_name), &current)?;

        for stale in self.before_restore_refs(repo)? {
            if stale != backup_name {
                delete_ref(repo, &full_ref(&stale))?;
            }
        }

        restore_tree(repo, &target, &current)?;
        debug_log(&format!("restored working tree to {}", checkpoint_name));
        Ok(())
    }

    /// One-step undo: restore the session's before-restore snapshot. The
    /// restore primitive records a new before-restore pointing at the tree
    /// as it was just now, so a second undo toggles back.
    pub fn undo(&mut self, repo: &Repository) -> Result<(), PiTraceError> {
        let Some(backup) = self.before_restore_refs(repo)?.into_iter().next() else {
            return Err(PiTraceError::Generic(
                "nothing to undo: no before-restore checkpoint for this session".to_string(),
            ));
        };
        self.restore_with_backup(repo, &backup)
    }
}

/// Drop every checkpoint ref. Used by explicit reset only.
pub fn delete_all_checkpoints(repo: &Repository) -> Result<(), PiTraceError> {
    for name in list_refs(repo, CHECKPOINTS_PREFIX)? {
        delete_ref(repo, &full_ref(&name))?;
    }
    Ok(())
}

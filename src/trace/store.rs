use crate::error::PiTraceError;
use crate::trace::record::TraceRecord;
use crate::utils::debug_log;
use std::collections::HashSet;
use std::fs;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Retention cap on the session-local trace log.
pub const TRACE_LOG_CAP: usize = 100;

const STATE_DIR: &str = ".pi-trace";
const LOG_FILE: &str = "traces.jsonl";

/// Append-only record-per-line trace log inside the working tree.
///
/// The directory is self-gitignoring: an ignore-everything .gitignore is
/// written on init so snapshots and commits never pick the log up.
pub struct TraceStore {
    dir: PathBuf,
}

impl TraceStore {
    pub fn for_worktree(worktree_root: &Path) -> TraceStore {
        TraceStore {
            dir: worktree_root.join(STATE_DIR),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn init(&self) -> Result<(), PiTraceError> {
        fs::create_dir_all(&self.dir)?;
        let gitignore = self.dir.join(".gitignore");
        if !gitignore.exists() {
            fs::write(&gitignore, "*\n")?;
        }
        Ok(())
    }

    fn log_path(&self) -> PathBuf {
        self.dir.join(LOG_FILE)
    }

    /// All records in file order. Malformed lines are logged and skipped;
    /// a hand-edited log must never take the tool down.
    pub fn read_all(&self) -> Result<Vec<TraceRecord>, PiTraceError> {
        let path = self.log_path();
        if !path.exists() {
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&path)?;
        let mut records = Vec::new();
        for line in content.lines() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<TraceRecord>(line) {
                Ok(record) => records.push(record),
                Err(e) => debug_log(&format!("skipping malformed trace line: {}", e)),
            }
        }
        Ok(records)
    }

    /// Append a record, discarding oldest entries so the post-write length
    /// never exceeds the cap.
    pub fn append(&self, record: &TraceRecord) -> Result<(), PiTraceError> {
        self.init()?;
        let existing = self.read_all()?;

        if existing.len() >= TRACE_LOG_CAP {
            let keep_from = existing.len() + 1 - TRACE_LOG_CAP;
            let mut retained: Vec<&TraceRecord> = existing.iter().skip(keep_from).collect();
            let mut lines = Vec::with_capacity(TRACE_LOG_CAP);
            for kept in retained.drain(..) {
                lines.push(serde_json::to_string(kept)?);
            }
            lines.push(serde_json::to_string(record)?);
            fs::write(self.log_path(), format!("{}\n", lines.join("\n")))?;
            return Ok(());
        }

        let json_line = serde_json::to_string(record)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_path())?;
        writeln!(file, "{}", json_line)?;
        Ok(())
    }

    /// Drop the records whose ids are in `ids`, rewriting the log.
    pub fn remove_ids(&self, ids: &HashSet<String>) -> Result<(), PiTraceError> {
        if ids.is_empty() {
            return Ok(());
        }
        let retained: Vec<TraceRecord> = self
            .read_all()?
            .into_iter()
            .filter(|record| !ids.contains(&record.id))
            .collect();

        let mut lines = Vec::with_capacity(retained.len());
        for record in &retained {
            lines.push(serde_json::to_string(record)?);
        }
        let body = if lines.is_empty() {
            String::new()
        } else {
            format!("{}\n", lines.join("\n"))
        };
        self.init()?;
        fs::write(self.log_path(), body)?;
        Ok(())
    }

    /// Every snapshot id referenced from any record's before/after pair.
    /// This is the live inventory that protection refs are reconciled to.
    pub fn snapshot_ids(&self) -> Result<HashSet<String>, PiTraceError> {
        let mut ids = HashSet::new();
        for record in self.read_all()? {
            ids.insert(record.metadata.before_sha.clone());
            ids.insert(record.metadata.after_sha.clone());
        }
        Ok(ids)
    }
}

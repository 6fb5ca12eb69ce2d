use crate::error::PiTraceError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Who produced the lines a trace file entry covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Contributor {
    Ai {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        model_id: Option<String>,
    },
    Human,
}

/// An inclusive 1-based line interval authored entirely by one trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedRange {
    pub start: u32,
    pub end: u32,
    pub trace_id: String,
}

impl ResolvedRange {
    pub fn contains(&self, line: u32) -> bool {
        line >= self.start && line <= self.end
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceFile {
    pub path: String,
    pub contributor: Contributor,
    /// Empty until commit finalization fills it with the ranges this trace
    /// authored in the committed file.
    #[serde(default)]
    pub ranges: Vec<ResolvedRange>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStat {
    pub additions: u32,
    pub deletions: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceMetadata {
    pub before_sha: String,
    pub after_sha: String,
    pub session_id: String,
    pub entry_id: String,
    pub user_message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assistant_message: Option<String>,
    #[serde(default)]
    pub file_stats: BTreeMap<String, FileStat>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VcsInfo {
    pub revision: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    pub version: String,
}

/// The atomic unit of attribution: a before/after snapshot pair plus the
/// prompt that produced the change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceRecord {
    pub id: String,
    /// RFC 3339 UTC. Lexicographic order on this field is the canonical
    /// trace order; notes written by other tool versions depend on it.
    pub timestamp: String,
    pub files: Vec<TraceFile>,
    pub metadata: TraceMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vcs: Option<VcsInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<ToolInfo>,
}

impl TraceRecord {
    pub fn touches_path(&self, path: &str) -> bool {
        self.files.iter().any(|f| f.path == path)
    }

    pub fn file(&self, path: &str) -> Option<&TraceFile> {
        self.files.iter().find(|f| f.path == path)
    }

    /// Model id recorded for the given path, if the contributor was an AI.
    pub fn model_id_for_path(&self, path: &str) -> Option<&str> {
        match self.file(path).map(|f| &f.contributor) {
            Some(Contributor::Ai { model_id }) => model_id.as_deref(),
            _ => None,
        }
    }
}

/// Sidecar object attached to a commit: the contributing traces plus the
/// per-file resolution. `resolved` absent means the note was written raw
/// (e.g. by the post-commit hook) and never resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceNote {
    pub traces: Vec<TraceRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved: Option<BTreeMap<String, Vec<ResolvedRange>>>,
}

impl TraceNote {
    pub fn trace(&self, trace_id: &str) -> Option<&TraceRecord> {
        self.traces.iter().find(|t| t.id == trace_id)
    }

    /// Deterministic serialization: struct fields in declaration order, the
    /// resolved map in BTreeMap key order. Re-finalizing the same commit
    /// must produce a byte-identical note.
    pub fn serialize_to_string(&self) -> Result<String, PiTraceError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn deserialize_from_string(content: &str) -> Result<TraceNote, PiTraceError> {
        Ok(serde_json::from_str(content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_trace(id: &str) -> TraceRecord {
        TraceRecord {
            id: id.to_string(),
            timestamp: "2026-01-10T12:00:00Z".to_string(),
            files: vec![TraceFile {
                path: "src/lib.rs".to_string(),
                contributor: Contributor::Ai {
                    model_id: Some("model-1".to_string()),
                },
                ranges: Vec::new(),
            }],
            metadata: TraceMetadata {
                before_sha: "b".repeat(40),
                after_sha: "a".repeat(40),
                session_id: "6f9619ff-8b86-d011-b42d-00c04fc964ff".to_string(),
                entry_id: "entry-1".to_string(),
                user_message: "add a function".to_string(),
                assistant_message: None,
                file_stats: BTreeMap::new(),
            },
            vcs: None,
            tool: None,
        }
    }

    #[test]
    fn test_contributor_serialization_shape() {
        let ai = Contributor::Ai {
            model_id: Some("model-1".to_string()),
        };
        let json = serde_json::to_string(&ai).unwrap();
        assert_eq!(json, r#"{"type":"ai","model_id":"model-1"}"#);

        let human = Contributor::Human;
        assert_eq!(serde_json::to_string(&human).unwrap(), r#"{"type":"human"}"#);

        let anonymous: Contributor = serde_json::from_str(r#"{"type":"ai"}"#).unwrap();
        assert_eq!(anonymous, Contributor::Ai { model_id: None });
    }

    #[test]
    fn test_trace_record_round_trip() {
        let trace = sample_trace("t1");
        let json = serde_json::to_string(&trace).unwrap();
        let back: TraceRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, trace);
        // Optional sections are omitted, not serialized as null.
        assert!(!json.contains("assistant_message"));
        assert!(!json.contains("vcs"));
    }

    #[test]
    fn test_note_serialization_is_deterministic() {
        let mut resolved = BTreeMap::new();
        resolved.insert(
            "z.rs".to_string(),
            vec![ResolvedRange {
                start: 1,
                end: 2,
                trace_id: "t1".to_string(),
            }],
        );
        resolved.insert(
            "a.rs".to_string(),
            vec![ResolvedRange {
                start: 4,
                end: 4,
                trace_id: "t1".to_string(),
            }],
        );
        let note = TraceNote {
            traces: vec![sample_trace("t1")],
            resolved: Some(resolved),
        };

        let first = note.serialize_to_string().unwrap();
        let second = note.serialize_to_string().unwrap();
        assert_eq!(first, second);
        // BTreeMap keys serialize sorted.
        assert!(first.find("\"a.rs\"").unwrap() < first.find("\"z.rs\"").unwrap());
    }

    #[test]
    fn test_note_without_resolved_map() {
        let note = TraceNote {
            traces: vec![sample_trace("t1")],
            resolved: None,
        };
        let json = note.serialize_to_string().unwrap();
        assert!(!json.contains("resolved"));

        let back = TraceNote::deserialize_from_string(&json).unwrap();
        assert!(back.resolved.is_none());
    }

    #[test]
    fn test_resolved_range_contains() {
        let range = ResolvedRange {
            start: 3,
            end: 5,
            trace_id: "t1".to_string(),
        };
        assert!(!range.contains(2));
        assert!(range.contains(3));
        assert!(range.contains(5));
        assert!(!range.contains(6));
    }

    #[test]
    fn test_model_id_for_path() {
        let trace = sample_trace("t1");
        assert_eq!(trace.model_id_for_path("src/lib.rs"), Some("model-1"));
        assert_eq!(trace.model_id_for_path("other.rs"), None);
    }
}

use crate::checkpoints::CheckpointManager;
use crate::config::Config;
use crate::error::PiTraceError;
use crate::git::cli_parser::{is_commit_invocation, parse_git_cli_args};
use crate::git::refs::sync_protection_refs;
use crate::git::repository::{Repository, find_repository};
use crate::git::snapshots;
use crate::trace::diff::DiffService;
use crate::trace::finalize::{finalize_commit, trace_from_snapshots};
use crate::trace::store::TraceStore;
use crate::utils::debug_log;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

const SESSION_STATE_FILE: &str = "session.json";

/// A turn-start snapshot waiting for its entry id. The ref cannot be
/// created at capture time because the user-message id only becomes known
/// at turn end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingCheckpoint {
    pub snapshot: String,
    pub timestamp_ms: u64,
}

/// The slice of router state that must survive across host hook
/// invocations. Everything else (diff cache, note cache, checkpoint map)
/// is an in-memory derivation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    #[serde(default)]
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_before: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_checkpoint: Option<PendingCheckpoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_entry_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_user_message: Option<String>,
}

/// Events delivered by the hosting agent runtime, one JSON object per
/// hook invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum HostEvent {
    SessionStart {
        session_id: String,
    },
    TurnStart {
        turn_index: u32,
    },
    TurnEnd {
        turn_index: u32,
        entry_id: String,
        #[serde(default)]
        user_message: Option<String>,
    },
    AgentEnd {
        #[serde(default)]
        assistant_message: Option<String>,
        #[serde(default)]
        model_id: Option<String>,
    },
    ToolResult {
        command: Vec<String>,
    },
    /// Confirmed restore request ahead of branch or tree navigation. The
    /// selection UI lives in the host; by the time this event arrives the
    /// user has already picked a target.
    BeforeBranch {
        #[serde(default)]
        target_entry_id: Option<String>,
    },
    Undo,
}

fn now_ms() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}

/// Translates host events into trace, checkpoint, and finalizer calls.
///
/// Outside a git repository the router is inert: every dispatch is a
/// logged no-op, queries come back empty, nothing is written.
pub struct EventRouter {
    repo: Option<Repository>,
    store: Option<TraceStore>,
    diffs: DiffService,
    state: SessionState,
}

impl EventRouter {
    /// Router for the repository containing the current directory, state
    /// loaded from disk. Degrades to an inert router outside a repo.
    pub fn load() -> EventRouter {
        match find_repository() {
            Ok(repo) => EventRouter::for_repo(repo),
            Err(e) => {
                debug_log(&format!("event router inert: {}", e));
                EventRouter {
                    repo: None,
                    store: None,
                    diffs: DiffService::new(),
                    state: SessionState::default(),
                }
            }
        }
    }

    pub fn for_repo(repo: Repository) -> EventRouter {
        let store = TraceStore::for_worktree(repo.workdir());
        let state = read_session_state(&store);
        EventRouter {
            repo: Some(repo),
            store: Some(store),
            diffs: DiffService::new(),
            state,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Handle one event and persist the surviving state. Finalizer errors
    /// are swallowed after logging (a commit must never be blocked);
    /// restore errors are surfaced so the host can cancel navigation.
    pub fn dispatch(&mut self, event: HostEvent) -> Result<(), PiTraceError> {
        if self.repo.is_none() {
            debug_log("ignoring event outside a git repository");
            return Ok(());
        }

        let result = match event {
            HostEvent::SessionStart { session_id } => self.on_session_start(session_id),
            HostEvent::TurnStart { turn_index } => self.on_turn_start(turn_index),
            HostEvent::TurnEnd {
                turn_index,
                entry_id,
                user_message,
            } => self.on_turn_end(turn_index, entry_id, user_message),
            HostEvent::AgentEnd {
                assistant_message,
                model_id,
            } => self.on_agent_end(assistant_message, model_id),
            HostEvent::ToolResult { command } => self.on_tool_result(command),
            HostEvent::BeforeBranch { target_entry_id } => {
                self.on_before_branch(target_entry_id)
            }
            HostEvent::Undo => self.on_undo(),
        };

        if result.is_ok() {
            self.save()?;
        }
        result
    }

    fn repo(&self) -> &Repository {
        self.repo.as_ref().expect("checked by dispatch")
    }

    fn store(&self) -> &TraceStore {
        self.store.as_ref().expect("checked by dispatch")
    }

    fn checkpoint_manager(&self) -> CheckpointManager {
        CheckpointManager::new(&self.state.session_id)
    }

    fn status_line(&self, message: &str) {
        if !Config::get().silent_checkpoints() {
            eprintln!("pi-trace: {}", message);
        }
    }

    fn on_session_start(&mut self, session_id: String) -> Result<(), PiTraceError> {
        self.state = SessionState {
            session_id,
            ..SessionState::default()
        };
        self.diffs = DiffService::new();

        let store = self.store();
        store.init()?;

        // Drop protections for snapshots no surviving trace references.
        let live = store.snapshot_ids()?;
        sync_protection_refs(self.repo(), &live)?;

        let mut manager = self.checkpoint_manager();
        manager.rebuild_from_refs(self.repo())?;
        manager.capture_resume(self.repo())?;
        self.status_line("resume checkpoint saved");

        if Config::get().trace_hook() {
            crate::commands::hook_installer::install_post_commit_hook(self.repo())?;
        }
        Ok(())
    }

    fn on_turn_start(&mut self, turn_index: u32) -> Result<(), PiTraceError> {
        if turn_index != 0 {
            return Ok(());
        }
        let snapshot = snapshots::capture_tree(self.repo())?;
        self.state.pending_checkpoint = Some(PendingCheckpoint {
            snapshot: snapshot.clone(),
            timestamp_ms: now_ms(),
        });
        self.state.trace_before = Some(snapshot);
        Ok(())
    }

    fn on_turn_end(
        &mut self,
        turn_index: u32,
        entry_id: String,
        user_message: Option<String>,
    ) -> Result<(), PiTraceError> {
        if turn_index != 0 {
            return Ok(());
        }
        self.state.current_entry_id = Some(entry_id.clone());
        if user_message.is_some() {
            self.state.current_user_message = user_message;
        }

        // Without a pending snapshot there is nothing to name; the event
        // is a no-op rather than a late re-capture.
        let Some(pending) = self.state.pending_checkpoint.take() else {
            return Ok(());
        };

        let mut manager = self.checkpoint_manager();
        manager.rebuild_from_refs(self.repo())?;
        manager.materialize(
            self.repo(),
            &pending.snapshot,
            &entry_id,
            pending.timestamp_ms,
        )?;
        self.status_line("checkpoint saved");
        Ok(())
    }

    fn on_agent_end(
        &mut self,
        assistant_message: Option<String>,
        model_id: Option<String>,
    ) -> Result<(), PiTraceError> {
        let Some(before) = self.state.trace_before.clone() else {
            return Ok(());
        };

        let after = snapshots::capture_tree(self.repo())?;
        let stats = snapshots::diff_numstat(self.repo(), &before, &after)?;
        if !stats.is_empty() {
            let record = trace_from_snapshots(
                &before,
                &after,
                &stats,
                &self.state.session_id,
                self.state.current_entry_id.as_deref().unwrap_or_default(),
                self.state.current_user_message.as_deref().unwrap_or_default(),
                assistant_message.as_deref(),
                model_id.as_deref(),
                self.repo().head_commit()?,
            );
            self.store().append(&record)?;

            let live = self.store().snapshot_ids()?;
            sync_protection_refs(self.repo(), &live)?;
        }
        self.state.trace_before = None;
        Ok(())
    }

    fn on_tool_result(&mut self, command: Vec<String>) -> Result<(), PiTraceError> {
        let parsed = parse_git_cli_args(&command);
        if !is_commit_invocation(&parsed) {
            return Ok(());
        }

        let trace_before = self.state.trace_before.clone();
        let session_id = self.state.session_id.clone();
        let entry_id = self.state.current_entry_id.clone();
        let user_message = self.state.current_user_message.clone();

        let repo = self.repo().clone();
        let store = self.store.as_ref().expect("checked by dispatch");
        match finalize_commit(
            &repo,
            store,
            &mut self.diffs,
            trace_before,
            &session_id,
            entry_id.as_deref(),
            user_message.as_deref(),
        ) {
            Ok(outcome) => {
                self.state.trace_before = outcome.trace_before;
            }
            Err(e) => {
                debug_log(&format!("commit finalization failed: {}", e));
            }
        }
        Ok(())
    }

    fn on_before_branch(
        &mut self,
        target_entry_id: Option<String>,
    ) -> Result<(), PiTraceError> {
        let mut manager = self.checkpoint_manager();
        manager.rebuild_from_refs(self.repo())?;

        let checkpoint = match target_entry_id {
            Some(entry_id) => manager.checkpoint_for_entry(&entry_id).cloned(),
            None => None,
        };
        let checkpoint = match checkpoint {
            Some(name) => name,
            None => manager.latest_resume(self.repo())?.ok_or_else(|| {
                PiTraceError::Generic("no checkpoint available for restore".to_string())
            })?,
        };

        manager.restore_with_backup(self.repo(), &checkpoint)
    }

    fn on_undo(&mut self) -> Result<(), PiTraceError> {
        let mut manager = self.checkpoint_manager();
        manager.rebuild_from_refs(self.repo())?;
        manager.undo(self.repo())
    }

    fn save(&self) -> Result<(), PiTraceError> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        store.init()?;
        let path = session_state_path(store);
        fs::write(path, serde_json::to_string(&self.state)?)?;
        Ok(())
    }
}

fn session_state_path(store: &TraceStore) -> PathBuf {
    store.dir().join(SESSION_STATE_FILE)
}

fn read_session_state(store: &TraceStore) -> SessionState {
    let path = session_state_path(store);
    match fs::read_to_string(&path) {
        Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
            debug_log(&format!("resetting malformed session state: {}", e));
            SessionState::default()
        }),
        Err(_) => SessionState::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_event_json_shapes() {
        let event: HostEvent =
            serde_json::from_str(r#"{"event":"session-start","session_id":"abc"}"#).unwrap();
        assert_eq!(
            event,
            HostEvent::SessionStart {
                session_id: "abc".to_string()
            }
        );

        let event: HostEvent = serde_json::from_str(
            r#"{"event":"turn-end","turn_index":0,"entry_id":"e1","user_message":"do it"}"#,
        )
        .unwrap();
        assert_eq!(
            event,
            HostEvent::TurnEnd {
                turn_index: 0,
                entry_id: "e1".to_string(),
                user_message: Some("do it".to_string())
            }
        );

        let event: HostEvent = serde_json::from_str(r#"{"event":"agent-end"}"#).unwrap();
        assert_eq!(
            event,
            HostEvent::AgentEnd {
                assistant_message: None,
                model_id: None
            }
        );

        let event: HostEvent = serde_json::from_str(
            r#"{"event":"tool-result","command":["git","commit","-m","x"]}"#,
        )
        .unwrap();
        assert!(matches!(event, HostEvent::ToolResult { .. }));
    }

    #[test]
    fn test_session_state_round_trip() {
        let state = SessionState {
            session_id: "6f9619ff-8b86-4011-b42d-00c04fc964ff".to_string(),
            trace_before: Some("t".repeat(40)),
            pending_checkpoint: Some(PendingCheckpoint {
                snapshot: "s".repeat(40),
                timestamp_ms: 1736500000000,
            }),
            current_entry_id: Some("e1".to_string()),
            current_user_message: Some("msg".to_string()),
        };
        let json = serde_json::to_string(&state).unwrap();
        let back: SessionState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
    }

    #[test]
    fn test_session_state_defaults_on_missing_fields() {
        let state: SessionState = serde_json::from_str(r#"{"session_id":"x"}"#).unwrap();
        assert_eq!(state.session_id, "x");
        assert!(state.trace_before.is_none());
        assert!(state.pending_checkpoint.is_none());
    }
}

use crate::error::PiTraceError;
use crate::events::{EventRouter, HostEvent};
use crate::git::repository::find_repository;
use crate::trace::finalize::write_raw_note;
use crate::trace::store::TraceStore;
use crate::utils::{Timer, debug_log};
use std::io::Read;

/// `pi-trace hook`: read one JSON host event from stdin and dispatch it.
pub fn run_hook() -> Result<(), PiTraceError> {
    let mut input = String::new();
    std::io::stdin().read_to_string(&mut input)?;

    let event: HostEvent = serde_json::from_str(input.trim())
        .map_err(|e| PiTraceError::Generic(format!("unrecognized event payload: {}", e)))?;

    let mut router = EventRouter::load();
    let mut timer = Timer::new();
    timer.start("dispatch");
    let result = router.dispatch(event);
    timer.end("dispatch");
    result
}

/// `pi-trace raw-note`: attach a raw, unresolved note to head. Invoked by
/// the installed post-commit hook; quiet no-op when there is nothing to
/// record so arbitrary commits stay unaffected.
pub fn run_raw_note() -> Result<(), PiTraceError> {
    let repo = find_repository()?;
    let store = TraceStore::for_worktree(repo.workdir());
    let written = write_raw_note(&repo, &store)?;
    if written {
        debug_log("raw trace note attached to head");
    }
    Ok(())
}

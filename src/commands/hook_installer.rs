use crate::error::PiTraceError;
use crate::git::repository::Repository;
use crate::utils::debug_log;
use std::fs;

const HOOK_BODY: &str = "#!/bin/sh\n# installed by pi-trace (trace_hook)\npi-trace raw-note >/dev/null 2>&1 || true\n";

/// Install the post-commit hook that attaches raw, unresolved notes.
///
/// A foreign post-commit hook is never touched; installation is skipped
/// with a debug log so user tooling keeps working.
pub fn install_post_commit_hook(repo: &Repository) -> Result<(), PiTraceError> {
    let hooks_dir = repo.git_dir().join("hooks");
    fs::create_dir_all(&hooks_dir)?;

    let hook_path = hooks_dir.join("post-commit");
    if hook_path.exists() {
        let existing = fs::read_to_string(&hook_path).unwrap_or_default();
        if existing == HOOK_BODY {
            return Ok(());
        }
        debug_log("post-commit hook exists and is not ours; skipping install");
        return Ok(());
    }

    fs::write(&hook_path, HOOK_BODY)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut permissions = fs::metadata(&hook_path)?.permissions();
        permissions.set_mode(0o755);
        fs::set_permissions(&hook_path, permissions)?;
    }

    Ok(())
}

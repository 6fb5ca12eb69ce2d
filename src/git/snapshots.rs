use crate::error::PiTraceError;
use crate::git::repository::{Repository, exec_git, exec_git_with_env};
use crate::utils::debug_log;
use std::fs;
use std::path::PathBuf;

/// Context width passed to `git diff` when capturing snapshot pairs.
/// Attribution projects vectors line-for-line through the diff, so every
/// unchanged line must be present as a context line.
const UNLIMITED_CONTEXT: u32 = 100_000_000;

/// Temporary index used to capture the working tree without touching the
/// real index or head. Removed on drop, covering every exit path.
struct ScratchIndex {
    path: PathBuf,
}

impl ScratchIndex {
    fn create(repo: &Repository) -> ScratchIndex {
        let path = repo
            .git_dir()
            .join(format!("pi-trace-index-{}", std::process::id()));
        ScratchIndex { path }
    }

    fn env(&self) -> Vec<(String, String)> {
        vec![(
            "GIT_INDEX_FILE".to_string(),
            self.path.display().to_string(),
        )]
    }
}

impl Drop for ScratchIndex {
    fn drop(&mut self) {
        if self.path.exists() {
            if let Err(e) = fs::remove_file(&self.path) {
                debug_log(&format!("failed to remove scratch index: {}", e));
            }
        }
    }
}

/// Capture the current working tree as a parentless tree-only snapshot.
///
/// Adds all tracked and untracked files (gitignore still applies) to an
/// isolated index and writes a tree. The returned id is the tree OID; the
/// caller is responsible for protecting it with a ref if it must outlive
/// garbage collection.
pub fn capture_tree(repo: &Repository) -> Result<String, PiTraceError> {
    let scratch = ScratchIndex::create(repo);
    let env = scratch.env();

    let mut add_args = repo.global_args_for_exec();
    add_args.push("add".to_string());
    add_args.push("-A".to_string());
    exec_git_with_env(&add_args, &env)?;

    let mut write_args = repo.global_args_for_exec();
    write_args.push("write-tree".to_string());
    let output = exec_git_with_env(&write_args, &env)?;

    Ok(String::from_utf8(output.stdout)?.trim().to_string())
}

/// Restore a captured snapshot into the working tree.
///
/// `current` is a snapshot of the tree as it is right now (callers have
/// always just captured one for backup purposes); it is used to remove
/// files that exist now but are absent from the target snapshot. Head and
/// the real index are left untouched.
pub fn restore_tree(
    repo: &Repository,
    target: &str,
    current: &str,
) -> Result<(), PiTraceError> {
    let scratch = ScratchIndex::create(repo);
    let env = scratch.env();

    let mut read_args = repo.global_args_for_exec();
    read_args.push("read-tree".to_string());
    read_args.push(target.to_string());
    exec_git_with_env(&read_args, &env)?;

    let mut checkout_args = repo.global_args_for_exec();
    checkout_args.push("checkout-index".to_string());
    checkout_args.push("-a".to_string());
    checkout_args.push("-f".to_string());
    exec_git_with_env(&checkout_args, &env)?;

    // Files added relative to the target snapshot must be deleted by hand;
    // checkout-index only writes files, it never removes them.
    for path in diff_tree_names(repo, target, current)? {
        let absolute = repo.workdir().join(&path);
        if absolute.is_file() {
            fs::remove_file(&absolute)?;
        }
    }

    Ok(())
}

/// Paths added in `after` relative to `before`.
fn diff_tree_names(
    repo: &Repository,
    before: &str,
    after: &str,
) -> Result<Vec<String>, PiTraceError> {
    let mut args = repo.global_args_for_exec();
    args.push("diff-tree".to_string());
    args.push("-r".to_string());
    args.push("--name-only".to_string());
    args.push("--diff-filter=A".to_string());
    args.push("--no-renames".to_string());
    args.push("-z".to_string());
    args.push(before.to_string());
    args.push(after.to_string());

    let output = exec_git(&args)?;
    let stdout = String::from_utf8(output.stdout)?;
    Ok(stdout
        .split('\0')
        .filter(|p| !p.is_empty())
        .map(|p| p.to_string())
        .collect())
}

/// Full-context unified diff between two snapshots, all files.
pub fn diff_snapshots(
    repo: &Repository,
    before: &str,
    after: &str,
) -> Result<String, PiTraceError> {
    let mut args = repo.global_args_for_exec();
    args.push("diff".to_string());
    args.push("--no-color".to_string());
    args.push("--no-ext-diff".to_string());
    args.push("--no-renames".to_string());
    args.push(format!("-U{}", UNLIMITED_CONTEXT));
    args.push(before.to_string());
    args.push(after.to_string());

    let output = exec_git(&args)?;
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

/// Per-path (additions, deletions) counts between two snapshots. Binary
/// files report zero on both sides.
pub fn diff_numstat(
    repo: &Repository,
    before: &str,
    after: &str,
) -> Result<Vec<(String, u32, u32)>, PiTraceError> {
    let mut args = repo.global_args_for_exec();
    args.push("diff".to_string());
    args.push("--numstat".to_string());
    args.push("--no-renames".to_string());
    args.push("-z".to_string());
    args.push(before.to_string());
    args.push(after.to_string());

    let output = exec_git(&args)?;
    let stdout = String::from_utf8_lossy(&output.stdout).to_string();

    let mut result = Vec::new();
    // -z output: "<added>\t<deleted>\t<path>\0" per entry.
    for entry in stdout.split('\0').filter(|e| !e.is_empty()) {
        let mut parts = entry.splitn(3, '\t');
        let added = parts.next().unwrap_or_default();
        let deleted = parts.next().unwrap_or_default();
        let Some(path) = parts.next() else {
            debug_log(&format!("skipping malformed numstat entry: {:?}", entry));
            continue;
        };
        let additions = added.parse::<u32>().unwrap_or(0);
        let deletions = deleted.parse::<u32>().unwrap_or(0);
        result.push((path.to_string(), additions, deletions));
    }
    Ok(result)
}

/// Raw `git blame --line-porcelain` output for a committed file.
pub fn blame_line_porcelain(
    repo: &Repository,
    path: &str,
    range: Option<(u32, u32)>,
) -> Result<String, PiTraceError> {
    let mut args = repo.global_args_for_exec();
    args.push("blame".to_string());
    args.push("--line-porcelain".to_string());
    if let Some((start, end)) = range {
        args.push("-L".to_string());
        args.push(format!("{},{}", start, end));
    }
    args.push("--".to_string());
    args.push(path.to_string());

    let output = exec_git(&args)?;
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::test_utils::TmpRepo;

    #[test]
    fn test_capture_tree_is_stable_for_identical_trees() {
        let tmp_repo = TmpRepo::new().expect("tmp repo");
        tmp_repo.write_file("a.txt", "one\n").expect("write");

        let first = capture_tree(tmp_repo.repo()).expect("capture");
        let second = capture_tree(tmp_repo.repo()).expect("capture");
        assert_eq!(first, second, "identical trees hash to the same id");
    }

    #[test]
    fn test_capture_tree_includes_untracked_and_leaves_index_alone() {
        let tmp_repo = TmpRepo::new().expect("tmp repo");
        tmp_repo.write_file("tracked.txt", "t\n").expect("write");
        tmp_repo.commit_all("initial").expect("commit");
        tmp_repo.write_file("untracked.txt", "u\n").expect("write");

        let snapshot = capture_tree(tmp_repo.repo()).expect("capture");
        let blob = tmp_repo
            .repo()
            .show_blob(&snapshot, "untracked.txt")
            .expect("show");
        assert_eq!(blob.as_deref(), Some("u\n"));

        // The real index must not have picked up the untracked file.
        let dirty = tmp_repo.repo().dirty_paths().expect("dirty");
        assert!(dirty.contains("untracked.txt"));
    }

    #[test]
    fn test_restore_tree_round_trip_removes_new_files() {
        let tmp_repo = TmpRepo::new().expect("tmp repo");
        tmp_repo.write_file("keep.txt", "v1\n").expect("write");
        let before = capture_tree(tmp_repo.repo()).expect("capture");

        tmp_repo.write_file("keep.txt", "v2\n").expect("write");
        tmp_repo.write_file("extra.txt", "x\n").expect("write");
        let after = capture_tree(tmp_repo.repo()).expect("capture");

        restore_tree(tmp_repo.repo(), &before, &after).expect("restore");

        assert_eq!(tmp_repo.read_file("keep.txt").expect("read"), "v1\n");
        assert!(!tmp_repo.path().join("extra.txt").exists());
    }

    #[test]
    fn test_diff_snapshots_identity_is_empty() {
        let tmp_repo = TmpRepo::new().expect("tmp repo");
        tmp_repo.write_file("a.txt", "a\n").expect("write");
        let snap = capture_tree(tmp_repo.repo()).expect("capture");

        let diff = diff_snapshots(tmp_repo.repo(), &snap, &snap).expect("diff");
        assert!(diff.is_empty());
    }

    #[test]
    fn test_diff_numstat_counts() {
        let tmp_repo = TmpRepo::new().expect("tmp repo");
        tmp_repo.write_file("a.txt", "one\ntwo\n").expect("write");
        let before = capture_tree(tmp_repo.repo()).expect("capture");

        tmp_repo
            .write_file("a.txt", "one\nchanged\nthree\n")
            .expect("write");
        let after = capture_tree(tmp_repo.repo()).expect("capture");

        let stats = diff_numstat(tmp_repo.repo(), &before, &after).expect("numstat");
        assert_eq!(stats.len(), 1);
        let (path, additions, deletions) = &stats[0];
        assert_eq!(path, "a.txt");
        assert_eq!(*additions, 2);
        assert_eq!(*deletions, 1);
    }
}

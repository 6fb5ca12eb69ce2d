use crate::config::Config;
use crate::error::PiTraceError;
use crate::utils::debug_log;
use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

/// Handle to a git working tree.
///
/// All operations shell out to the git CLI; there is no libgit2 in the
/// production path. The handle carries the resolved toplevel and git dir so
/// every invocation can run from any cwd via `-C`.
#[derive(Debug, Clone)]
pub struct Repository {
    workdir: PathBuf,
    git_dir: PathBuf,
}

pub fn exec_git(args: &[String]) -> Result<Output, PiTraceError> {
    exec_git_with_env(args, &[])
}

pub fn exec_git_with_env(args: &[String], envs: &[(String, String)]) -> Result<Output, PiTraceError> {
    let mut command = Command::new(Config::get().git_cmd());
    command.args(args);
    for (key, value) in envs {
        command.env(key, value);
    }

    let output = command.output()?;
    if output.status.success() {
        Ok(output)
    } else {
        Err(PiTraceError::GitCliError {
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            args: args.to_vec(),
        })
    }
}

/// Run git with the given args, feeding `stdin_data` to its stdin.
pub fn exec_git_stdin(args: &[String], stdin_data: &[u8]) -> Result<Output, PiTraceError> {
    let mut child = Command::new(Config::get().git_cmd())
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(stdin_data)?;
    }

    let output = child.wait_with_output()?;
    if output.status.success() {
        Ok(output)
    } else {
        Err(PiTraceError::GitCliError {
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            args: args.to_vec(),
        })
    }
}

/// Discover the repository containing the current working directory.
pub fn find_repository() -> Result<Repository, PiTraceError> {
    Repository::discover(&std::env::current_dir()?)
}

impl Repository {
    pub fn discover(start: &Path) -> Result<Repository, PiTraceError> {
        let base = vec![
            "-C".to_string(),
            start.display().to_string(),
            "rev-parse".to_string(),
            "--show-toplevel".to_string(),
            "--absolute-git-dir".to_string(),
        ];
        let output = exec_git(&base).map_err(|e| match e {
            PiTraceError::GitCliError { stderr, .. } => PiTraceError::NoRepository(stderr),
            other => other,
        })?;

        let stdout = String::from_utf8(output.stdout)?;
        let mut lines = stdout.lines();
        let workdir = lines
            .next()
            .ok_or_else(|| PiTraceError::NoRepository("no toplevel reported".to_string()))?;
        let git_dir = lines
            .next()
            .ok_or_else(|| PiTraceError::NoRepository("no git dir reported".to_string()))?;

        Ok(Repository {
            workdir: PathBuf::from(workdir),
            git_dir: PathBuf::from(git_dir),
        })
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    /// Arguments that pin every git invocation to this working tree.
    pub fn global_args_for_exec(&self) -> Vec<String> {
        vec!["-C".to_string(), self.workdir.display().to_string()]
    }

    /// Resolve an arbitrary revision spec to a full object id.
    pub fn rev_parse(&self, spec: &str) -> Result<String, PiTraceError> {
        let mut args = self.global_args_for_exec();
        args.push("rev-parse".to_string());
        args.push("--verify".to_string());
        args.push(spec.to_string());
        let output = exec_git(&args)?;
        Ok(String::from_utf8(output.stdout)?.trim().to_string())
    }

    /// Current head commit, or None for an unborn branch.
    pub fn head_commit(&self) -> Result<Option<String>, PiTraceError> {
        match self.rev_parse("HEAD") {
            Ok(sha) => Ok(Some(sha)),
            Err(PiTraceError::GitCliError { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Files changed by the given commit (against its first parent, or the
    /// empty tree for a root commit).
    pub fn list_commit_files(&self, commit_sha: &str) -> Result<HashSet<String>, PiTraceError> {
        let mut args = self.global_args_for_exec();
        args.push("diff-tree".to_string());
        args.push("--no-commit-id".to_string());
        args.push("--name-only".to_string());
        args.push("--root".to_string());
        args.push("-r".to_string());
        args.push("-z".to_string());
        args.push(commit_sha.to_string());

        let output = exec_git(&args)?;
        let stdout = String::from_utf8(output.stdout)?;
        Ok(stdout
            .split('\0')
            .filter(|p| !p.is_empty())
            .map(|p| p.to_string())
            .collect())
    }

    /// Paths with uncommitted changes (staged, unstaged, or untracked).
    pub fn dirty_paths(&self) -> Result<HashSet<String>, PiTraceError> {
        let mut args = self.global_args_for_exec();
        args.push("status".to_string());
        args.push("--porcelain".to_string());
        args.push("--untracked-files=all".to_string());
        args.push("-z".to_string());

        let output = exec_git(&args)?;
        let stdout = String::from_utf8(output.stdout)?;

        let mut paths = HashSet::new();
        let mut fields = stdout.split('\0').filter(|f| !f.is_empty());
        while let Some(entry) = fields.next() {
            if entry.len() < 4 {
                debug_log(&format!("skipping malformed status entry: {:?}", entry));
                continue;
            }
            let status = &entry[..2];
            paths.insert(entry[3..].to_string());
            // Renames carry the original path as a second NUL-separated field.
            if status.contains('R') || status.contains('C') {
                if let Some(original) = fields.next() {
                    paths.insert(original.to_string());
                }
            }
        }
        Ok(paths)
    }

    /// Read one file's content out of a snapshot (tree or commit). None when
    /// the path does not exist in that snapshot.
    pub fn show_blob(&self, snapshot: &str, path: &str) -> Result<Option<String>, PiTraceError> {
        let mut args = self.global_args_for_exec();
        args.push("cat-file".to_string());
        args.push("-p".to_string());
        args.push(format!("{}:{}", snapshot, path));

        match exec_git(&args) {
            Ok(output) => Ok(Some(String::from_utf8_lossy(&output.stdout).to_string())),
            Err(PiTraceError::GitCliError { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

//! Disposable git repositories for tests. Compiled only for unit tests and
//! the `test-support` feature used by the integration suite.

use crate::error::PiTraceError;
use crate::git::repository::{Repository, exec_git};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

pub struct TmpRepo {
    dir: TempDir,
    repo: Repository,
}

impl TmpRepo {
    pub fn new() -> Result<TmpRepo, PiTraceError> {
        let dir = TempDir::new()?;
        let root = dir.path().display().to_string();

        exec_git(&[
            "init".to_string(),
            "-q".to_string(),
            root.clone(),
        ])?;

        let repo = Repository::discover(dir.path())?;
        let config = |key: &str, value: &str| -> Result<(), PiTraceError> {
            let mut args = repo.global_args_for_exec();
            args.push("config".to_string());
            args.push(key.to_string());
            args.push(value.to_string());
            exec_git(&args)?;
            Ok(())
        };
        config("user.name", "pi-trace test")?;
        config("user.email", "test@pi-trace.invalid")?;
        config("commit.gpgsign", "false")?;

        Ok(TmpRepo { dir, repo })
    }

    pub fn repo(&self) -> &Repository {
        &self.repo
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write (or overwrite) a file relative to the repo root, creating
    /// parent directories as needed.
    pub fn write_file(&self, relative: &str, content: &str) -> Result<(), PiTraceError> {
        let path = self.dir.path().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        Ok(())
    }

    pub fn read_file(&self, relative: &str) -> Result<String, PiTraceError> {
        Ok(fs::read_to_string(self.dir.path().join(relative))?)
    }

    pub fn remove_file(&self, relative: &str) -> Result<(), PiTraceError> {
        fs::remove_file(self.dir.path().join(relative))?;
        Ok(())
    }

    /// Stage everything and commit; returns the new head sha.
    pub fn commit_all(&self, message: &str) -> Result<String, PiTraceError> {
        let mut add_args = self.repo.global_args_for_exec();
        add_args.push("add".to_string());
        add_args.push("-A".to_string());
        exec_git(&add_args)?;

        let mut commit_args = self.repo.global_args_for_exec();
        commit_args.push("commit".to_string());
        commit_args.push("-q".to_string());
        commit_args.push("--no-verify".to_string());
        commit_args.push("-m".to_string());
        commit_args.push(message.to_string());
        exec_git(&commit_args)?;

        self.repo.rev_parse("HEAD")
    }

    pub fn head_sha(&self) -> Result<String, PiTraceError> {
        self.repo.rev_parse("HEAD")
    }
}

use crate::error::PiTraceError;
use crate::git::repository::{Repository, find_repository};
use crate::trace::blame::{BlameLabel, BlameLine, blame_committed, blame_uncommitted};
use crate::trace::diff::DiffService;
use crate::trace::store::TraceStore;
use std::io::Write;

/// Parse the optional `start[-end]` line range argument.
fn parse_range(raw: &str) -> Result<(u32, u32), PiTraceError> {
    let invalid = || PiTraceError::Generic(format!("invalid line range: {}", raw));

    let (start, end) = match raw.split_once('-') {
        Some((start, end)) => (
            start.parse::<u32>().map_err(|_| invalid())?,
            end.parse::<u32>().map_err(|_| invalid())?,
        ),
        None => {
            let line = raw.parse::<u32>().map_err(|_| invalid())?;
            (line, line)
        }
    };

    if start == 0 || end < start {
        return Err(invalid());
    }
    Ok((start, end))
}

/// Repo-relative form of a user-supplied path.
fn relative_path(repo: &Repository, file: &str) -> Result<String, PiTraceError> {
    let absolute = std::path::Path::new(file)
        .canonicalize()
        .map_err(|_| PiTraceError::Generic(format!("no such file: {}", file)))?;
    let relative = absolute.strip_prefix(repo.workdir()).map_err(|_| {
        PiTraceError::Generic(format!(
            "file '{}' is not inside the repository at {}",
            file,
            repo.workdir().display()
        ))
    })?;
    Ok(relative.to_string_lossy().to_string())
}

fn snippet(message: &str) -> String {
    let trimmed = message.trim().replace('\n', " ");
    if trimmed.is_empty() {
        return "(empty prompt)".to_string();
    }
    let mut shortened: String = trimmed.chars().take(32).collect();
    if shortened.len() < trimmed.len() {
        shortened.push('…');
    }
    shortened
}

fn label_column(label: &BlameLabel) -> String {
    match label {
        BlameLabel::Human => "human".to_string(),
        BlameLabel::Unresolved => "unresolved".to_string(),
        BlameLabel::Untraced => "untraced".to_string(),
        BlameLabel::PreSession => "pre-session".to_string(),
        BlameLabel::Prompt(attribution) => format!("\"{}\"", snippet(&attribution.user_message)),
    }
}

fn print_lines(lines: &[BlameLine]) -> Result<(), PiTraceError> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let width = lines
        .iter()
        .map(|l| label_column(&l.label).chars().count())
        .max()
        .unwrap_or(0);

    for line in lines {
        writeln!(
            out,
            "{:>5} {:<width$}  {}",
            line.line,
            label_column(&line.label),
            line.content,
            width = width
        )?;
    }
    Ok(())
}

/// `pi-trace blame <file> [start[-end]]`: auto-detects whether the file is
/// clean or dirty and routes to committed or uncommitted blame.
pub fn run_blame(file: &str, range_arg: Option<&str>) -> Result<(), PiTraceError> {
    let range = range_arg.map(parse_range).transpose()?;
    let repo = find_repository()?;
    let path = relative_path(&repo, file)?;

    let dirty = repo.dirty_paths()?.contains(&path);
    let lines = if dirty {
        let store = TraceStore::for_worktree(repo.workdir());
        let mut diffs = DiffService::new();
        blame_uncommitted(&repo, &store, &mut diffs, &path, range)?
    } else {
        blame_committed(&repo, &path, range)?
    };

    print_lines(&lines)
}

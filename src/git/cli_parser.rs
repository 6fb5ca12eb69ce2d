/// Minimal parser for git-style command lines as reported by the host's
/// tool-result events. Splits global arguments from the subcommand so the
/// commit predicate can key on the exact subcommand token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedGitInvocation {
    pub global_args: Vec<String>,
    pub command: Option<String>,
    pub command_args: Vec<String>,
}

/// Global git flags that consume a following value.
const GLOBAL_FLAGS_WITH_VALUE: &[&str] = &["-C", "-c", "--git-dir", "--work-tree", "--namespace", "--exec-path"];

/// Global git flags that stand alone.
const GLOBAL_FLAGS_BARE: &[&str] = &[
    "-p",
    "--paginate",
    "-P",
    "--no-pager",
    "--no-replace-objects",
    "--bare",
    "--literal-pathspecs",
    "--no-optional-locks",
];

pub fn parse_git_cli_args(args: &[String]) -> ParsedGitInvocation {
    let mut global_args = Vec::new();
    let mut command = None;
    let mut command_args = Vec::new();

    let mut iter = args.iter().peekable();

    // Tolerate a leading "git" token; hosts report full command lines.
    if iter.peek().map(|a| a.as_str()) == Some("git") {
        iter.next();
    }

    while let Some(arg) = iter.next() {
        if command.is_some() {
            command_args.push(arg.clone());
            continue;
        }

        if GLOBAL_FLAGS_WITH_VALUE.contains(&arg.as_str()) {
            global_args.push(arg.clone());
            if let Some(value) = iter.next() {
                global_args.push(value.clone());
            }
        } else if GLOBAL_FLAGS_BARE.contains(&arg.as_str())
            || GLOBAL_FLAGS_WITH_VALUE
                .iter()
                .any(|flag| flag.len() > 2 && arg.starts_with(&format!("{}=", flag)))
        {
            global_args.push(arg.clone());
        } else if arg.starts_with('-') {
            // Unknown global flag; keep it on the global side so an odd
            // invocation never masquerades as a subcommand.
            global_args.push(arg.clone());
        } else {
            command = Some(arg.clone());
        }
    }

    ParsedGitInvocation {
        global_args,
        command,
        command_args,
    }
}

/// True when the invocation is a working-tree commit that will move head:
/// `git commit`, excluding `commit-tree`/`commit-graph` (different
/// subcommands), `--dry-run`, and `--amend` (history rewrite, finalized
/// traces would double-apply).
pub fn is_commit_invocation(parsed: &ParsedGitInvocation) -> bool {
    if parsed.command.as_deref() != Some("commit") {
        return false;
    }
    !parsed
        .command_args
        .iter()
        .any(|arg| arg == "--dry-run" || arg == "--amend")
}

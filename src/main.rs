use clap::{Parser, Subcommand};
use pi_trace::commands;
use pi_trace::error::PiTraceError;

#[derive(Parser)]
#[command(name = "pi-trace")]
#[command(about = "prompt-to-code attribution for AI coding sessions", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Browse recorded traces and their diffs
    Traces,
    /// Line-level prompt attribution for a file
    Blame {
        /// File to blame
        file: String,
        /// Line or inclusive line range, e.g. 12 or 3-40
        range: Option<String>,
    },
    /// Dispatch one host event read as JSON from stdin
    Hook,
    /// Delete all checkpoints, traces, and session state for this tree
    Reset,
    /// Attach a raw, unresolved note to head (post-commit hook entry point)
    #[command(hide = true)]
    RawNote,
}

fn main() {
    let cli = Cli::parse();

    let result = match &cli.command {
        Commands::Traces => commands::traces_cmd::run_traces(),
        Commands::Blame { file, range } => {
            commands::blame_cmd::run_blame(file, range.as_deref())
        }
        Commands::Hook => commands::hook_cmd::run_hook(),
        Commands::Reset => commands::reset_cmd::run_reset(),
        Commands::RawNote => commands::hook_cmd::run_raw_note(),
    };

    match result {
        Ok(()) => {}
        Err(PiTraceError::NoRepository(message)) => {
            eprintln!("pi-trace: not a git repository: {}", message.trim());
            std::process::exit(2);
        }
        Err(e) => {
            eprintln!("pi-trace: {}", e);
            std::process::exit(1);
        }
    }
}

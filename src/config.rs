use std::env;
use std::fs;
use std::path::PathBuf;
use std::sync::OnceLock;

use serde::Deserialize;

/// Centralized configuration for the application
pub struct Config {
    git_path: String,
    silent_checkpoints: bool,
    trace_hook: bool,
}

#[derive(Deserialize)]
struct FileConfig {
    #[serde(default)]
    git_path: Option<String>,
    #[serde(default)]
    silent_checkpoints: Option<bool>,
    #[serde(default)]
    trace_hook: Option<bool>,
}

static CONFIG: OnceLock<Config> = OnceLock::new();

impl Config {
    /// Initialize the global configuration exactly once.
    /// Safe to call multiple times; subsequent calls are no-ops.
    #[allow(dead_code)]
    pub fn init() {
        let _ = CONFIG.get_or_init(build_config);
    }

    /// Access the global configuration. Lazily initializes if not already initialized.
    pub fn get() -> &'static Config {
        CONFIG.get_or_init(build_config)
    }

    /// Returns the command to invoke git.
    pub fn git_cmd(&self) -> &str {
        &self.git_path
    }

    /// Returns true if per-checkpoint status updates should be suppressed.
    pub fn silent_checkpoints(&self) -> bool {
        self.silent_checkpoints
    }

    /// Returns true if the post-commit trace hook should be installed.
    pub fn trace_hook(&self) -> bool {
        self.trace_hook
    }
}

/// Path of the user-level config file: ~/.pi-trace/config.json
fn config_file_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".pi-trace").join("config.json"))
}

fn read_file_config() -> FileConfig {
    let empty = FileConfig {
        git_path: None,
        silent_checkpoints: None,
        trace_hook: None,
    };

    let Some(path) = config_file_path() else {
        return empty;
    };

    match fs::read_to_string(&path) {
        Ok(content) => serde_json::from_str(&content).unwrap_or(empty),
        Err(_) => empty,
    }
}

fn env_flag(name: &str) -> Option<bool> {
    match env::var(name) {
        Ok(value) => match value.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" => Some(true),
            "0" | "false" | "no" => Some(false),
            _ => None,
        },
        Err(_) => None,
    }
}

fn build_config() -> Config {
    let file_config = read_file_config();

    let git_path = env::var("PI_TRACE_GIT")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .or(file_config.git_path)
        .unwrap_or_else(|| "git".to_string());

    let silent_checkpoints = env_flag("PI_TRACE_SILENT_CHECKPOINTS")
        .or(file_config.silent_checkpoints)
        .unwrap_or(false);

    let trace_hook = env_flag("PI_TRACE_HOOK")
        .or(file_config.trace_hook)
        .unwrap_or(false);

    Config {
        git_path,
        silent_checkpoints,
        trace_hook,
    }
}

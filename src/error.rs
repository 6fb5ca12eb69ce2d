use std::fmt;

#[derive(Debug)]
pub enum PiTraceError {
    IoError(std::io::Error),
    /// Errors from invoking the git CLI that exited with a non-zero status
    GitCliError {
        code: Option<i32>,
        stderr: String,
        args: Vec<String>,
    },
    JsonError(serde_json::Error),
    Utf8Error(std::str::Utf8Error),
    FromUtf8Error(std::string::FromUtf8Error),
    /// The working tree is not inside a git repository (or git is missing)
    NoRepository(String),
    Generic(String),
}

impl fmt::Display for PiTraceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PiTraceError::IoError(e) => write!(f, "IO error: {}", e),
            PiTraceError::GitCliError { code, stderr, args } => match code {
                Some(c) => write!(
                    f,
                    "Git CLI ({}) failed with exit code {}: {}",
                    args.join(" "),
                    c,
                    stderr
                ),
                None => write!(f, "Git CLI ({}) failed: {}", args.join(" "), stderr),
            },
            PiTraceError::JsonError(e) => write!(f, "JSON error: {}", e),
            PiTraceError::Utf8Error(e) => write!(f, "UTF-8 error: {}", e),
            PiTraceError::FromUtf8Error(e) => write!(f, "From UTF-8 error: {}", e),
            PiTraceError::NoRepository(e) => write!(f, "Not a git repository: {}", e),
            PiTraceError::Generic(e) => write!(f, "Generic error: {}", e),
        }
    }
}

impl std::error::Error for PiTraceError {}

impl From<std::io::Error> for PiTraceError {
    fn from(err: std::io::Error) -> Self {
        PiTraceError::IoError(err)
    }
}

impl From<serde_json::Error> for PiTraceError {
    fn from(err: serde_json::Error) -> Self {
        PiTraceError::JsonError(err)
    }
}

impl From<std::str::Utf8Error> for PiTraceError {
    fn from(err: std::str::Utf8Error) -> Self {
        PiTraceError::Utf8Error(err)
    }
}

impl From<std::string::FromUtf8Error> for PiTraceError {
    fn from(err: std::string::FromUtf8Error) -> Self {
        PiTraceError::FromUtf8Error(err)
    }
}

impl Clone for PiTraceError {
    fn clone(&self) -> Self {
        match self {
            PiTraceError::IoError(e) => {
                PiTraceError::IoError(std::io::Error::new(e.kind(), e.to_string()))
            }
            PiTraceError::GitCliError { code, stderr, args } => PiTraceError::GitCliError {
                code: *code,
                stderr: stderr.clone(),
                args: args.clone(),
            },
            PiTraceError::JsonError(e) => PiTraceError::Generic(format!("JSON error: {}", e)),
            PiTraceError::Utf8Error(e) => PiTraceError::Utf8Error(*e),
            PiTraceError::FromUtf8Error(e) => PiTraceError::FromUtf8Error(e.clone()),
            PiTraceError::NoRepository(s) => PiTraceError::NoRepository(s.clone()),
            PiTraceError::Generic(s) => PiTraceError::Generic(s.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = PiTraceError::from(io_err);
        let display = format!("{}", err);
        assert!(display.contains("IO error"));
        assert!(display.contains("file not found"));
    }

    #[test]
    fn test_error_display_git_cli_error_with_code() {
        let err = PiTraceError::GitCliError {
            code: Some(128),
            stderr: "fatal: not a git repository".to_string(),
            args: vec!["git".to_string(), "status".to_string()],
        };
        let display = format!("{}", err);
        assert!(display.contains("128"));
        assert!(display.contains("fatal: not a git repository"));
        assert!(display.contains("git status"));
    }

    #[test]
    fn test_error_display_git_cli_error_without_code() {
        let err = PiTraceError::GitCliError {
            code: None,
            stderr: "command terminated".to_string(),
            args: vec!["git".to_string(), "diff".to_string()],
        };
        let display = format!("{}", err);
        assert!(display.contains("Git CLI"));
        assert!(display.contains("command terminated"));
    }

    #[test]
    fn test_error_display_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("{invalid json").unwrap_err();
        let err = PiTraceError::from(json_err);
        let display = format!("{}", err);
        assert!(display.contains("JSON error"));
    }

    #[test]
    fn test_error_clone_git_cli_error() {
        let err = PiTraceError::GitCliError {
            code: Some(1),
            stderr: "error message".to_string(),
            args: vec!["git".to_string(), "commit".to_string()],
        };
        let cloned = err.clone();
        match cloned {
            PiTraceError::GitCliError { code, stderr, args } => {
                assert_eq!(code, Some(1));
                assert_eq!(stderr, "error message");
                assert_eq!(args, vec!["git".to_string(), "commit".to_string()]);
            }
            _ => panic!("Expected GitCliError"),
        }
    }

    #[test]
    fn test_error_clone_json_converts_to_generic() {
        let json_err = serde_json::from_str::<serde_json::Value>("{bad}").unwrap_err();
        let err = PiTraceError::from(json_err);
        let cloned = err.clone();
        assert!(matches!(cloned, PiTraceError::Generic(_)));
        let display = format!("{}", cloned);
        assert!(display.contains("JSON error"));
    }

    #[test]
    fn test_error_is_std_error() {
        let err = PiTraceError::Generic("test".to_string());
        let _: &dyn std::error::Error = &err;
    }
}

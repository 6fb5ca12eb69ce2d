use std::time::Instant;

/// Print a debug line to stderr when PI_TRACE_DEBUG is set.
///
/// Kept deliberately dumb: the tool runs inside editor hooks and git hooks
/// where stdout belongs to the caller.
pub fn debug_log(message: &str) {
    if std::env::var("PI_TRACE_DEBUG").is_ok() {
        eprintln!("[pi-trace] {}", message);
    }
}

/// Coarse phase timer for hook handlers.
pub struct Timer {
    current: Option<(String, Instant)>,
}

impl Timer {
    pub fn new() -> Self {
        Timer { current: None }
    }

    pub fn start(&mut self, label: &str) {
        self.current = Some((label.to_string(), Instant::now()));
    }

    pub fn end(&mut self, label: &str) {
        if let Some((started_label, started_at)) = self.current.take() {
            if started_label == label {
                debug_log(&format!(
                    "{} took {}ms",
                    label,
                    started_at.elapsed().as_millis()
                ));
            }
        }
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

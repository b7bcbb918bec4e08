use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use db_testing::Logger;

/// Logger that keeps every line so tests can assert on diagnostics.
///
/// Clones share the same buffer: hand one to [`db_testing::Config::with_logger`]
/// and keep the other.
#[derive(Debug, Clone, Default)]
pub struct RecordingLogger {
    lines: Arc<Mutex<Vec<String>>>,
}

impl RecordingLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.guard().clone()
    }

    /// True if any recorded line starts with `prefix`.
    pub fn contains_prefix(&self, prefix: &str) -> bool {
        self.guard().iter().any(|line| line.starts_with(prefix))
    }

    pub fn is_empty(&self) -> bool {
        self.guard().is_empty()
    }

    fn guard(&self) -> MutexGuard<'_, Vec<String>> {
        // A test that panicked mid-push still leaves usable lines behind.
        self.lines.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Logger for RecordingLogger {
    fn log(&self, args: fmt::Arguments<'_>) {
        self.guard().push(args.to_string());
    }
}

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use tracing::info;

/// Result of one test invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Passed,
    Failed(String),
    Skipped,
}

impl Outcome {
    pub fn failed(message: impl Into<String>) -> Self {
        Outcome::Failed(message.into())
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failed(_))
    }
}

/// What a test body may return: `()` or `Result<(), E>`.
pub trait IntoOutcome {
    fn into_outcome(self) -> Outcome;
}

impl IntoOutcome for () {
    fn into_outcome(self) -> Outcome {
        Outcome::Passed
    }
}

impl<E> IntoOutcome for Result<(), E>
where
    E: fmt::Display,
{
    fn into_outcome(self) -> Outcome {
        match self {
            Ok(()) => Outcome::Passed,
            Err(e) => Outcome::Failed(e.to_string()),
        }
    }
}

/// Per-test reporting handle.
#[derive(Debug, Clone)]
pub struct Reporter {
    name: Arc<str>,
}

impl Reporter {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn log(&self, args: fmt::Arguments<'_>) {
        info!(test = %self.name, "{}", args);
    }
}

/// Best-effort rendering of a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<String>()
        .map(|s| s.as_str())
        .or_else(|| payload.downcast_ref::<&str>().copied())
        .unwrap_or("Unknown panic")
        .to_string()
}

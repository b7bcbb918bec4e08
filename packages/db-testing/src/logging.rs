//! Diagnostic sink used for every non-fatal warning the lifecycle produces
//! (connect/probe/setup/cleanup failures, rollback failures).
//!
//! The default sink forwards to `tracing` under the fixed `dbtesting` target
//! and installs the stderr subscriber from [`init`] when it is created, so
//! those events are never dropped for lack of a subscriber.

use std::fmt;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use tracing_subscriber::{fmt as tracing_fmt, EnvFilter};

/// Target every default diagnostic is emitted under.
pub const LOG_TARGET: &str = "dbtesting";

/// Accepts formatted diagnostic messages.
pub trait Logger: Send + Sync {
    fn log(&self, args: fmt::Arguments<'_>);
}

/// Closures make convenient sinks in tests.
impl<F> Logger for F
where
    F: Fn(fmt::Arguments<'_>) + Send + Sync,
{
    fn log(&self, args: fmt::Arguments<'_>) {
        self(args)
    }
}

/// Default sink: one `warn` event per message.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&self, args: fmt::Arguments<'_>) {
        tracing::warn!(target: "dbtesting", "{}", args);
    }
}

pub type SharedLogger = Arc<dyn Logger>;

/// [`TracingLogger`], after making sure a subscriber writes it to stderr.
pub fn default_logger() -> SharedLogger {
    init();
    Arc::new(TracingLogger)
}

static INITIALIZED: OnceCell<()> = OnceCell::new();

/// Install a stderr `fmt` subscriber once per process.
///
/// The filter is read in order: `DBTESTING_LOG` -> `RUST_LOG` -> `"warn"`.
/// Never panics if another subscriber is already installed.
pub fn init() {
    INITIALIZED.get_or_init(|| {
        let filter = std::env::var("DBTESTING_LOG")
            .or_else(|_| std::env::var("RUST_LOG"))
            .map(EnvFilter::new)
            .unwrap_or_else(|_| EnvFilter::new("warn"));

        tracing_fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .without_time()
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_file(false)
            .with_line_number(false)
            .try_init()
            .ok();
    });
}

//! Process-level database lifecycle and per-test transactional isolation for
//! Rust test binaries.
//!
//! A test binary (`harness = false`) hands its tests to [`run_tests`], which
//! connects once, runs one-time setup, runs every test, then cleans up and
//! closes the handle. Each test body wrapped with [`Suite::inject`] gets its
//! own transaction that is always rolled back, so tests never see each
//! other's writes.

pub mod config;
pub mod db;
pub mod error;
pub mod harness;
pub mod logging;
pub mod orchestrate;
pub mod runner;
pub mod suite;

#[cfg(test)]
mod testing;

pub use config::dsn::Dsn;
pub use config::flags::HarnessArgs;
pub use config::{Config, Settings};
pub use db::sql;
pub use db::txn::TestContext;
pub use error::DbTestError;
pub use harness::outcome::{IntoOutcome, Outcome, Reporter};
pub use harness::{Harness, Report, Trial};
pub use logging::{Logger, TracingLogger};
pub use orchestrate::run_tests;
pub use runner::{TestRunner, EXIT_FAILURE, EXIT_SUCCESS};
pub use suite::{Suite, SuiteState, TestCase};

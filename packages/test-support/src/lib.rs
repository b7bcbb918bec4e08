//! Helpers shared by the integration tests of the database testing crate.
//!
//! Kept out of `db-testing` itself so the library ships no test-only code.

pub mod recording;
pub mod unique;

pub use recording::RecordingLogger;
pub use unique::unique_code;

use db_testing::{Config, Dsn};

/// A config that runs against a private in-memory SQLite database unless
/// `DBTESTING_DSN` points somewhere else.
pub fn local_config() -> Config {
    Config::new().with_connect(|| async {
        let dsn = match db_testing::config::dsn::dsn_from_env() {
            Ok(dsn) => dsn,
            Err(_) => Dsn::parse("sqlite::memory:")?,
        };
        tracing::debug!(dsn = %dsn, "connecting test database");
        db_testing::config::dsn::connect(&dsn).await
    })
}

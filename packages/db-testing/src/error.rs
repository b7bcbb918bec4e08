use std::time::Duration;

use sea_orm::DbErr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbTestError {
    #[error("Configuration error: {message}")]
    Config { message: String },
    #[error("Database error: {0}")]
    Db(#[from] DbErr),
    #[error("timed out after {timeout:?}")]
    Timeout { op: &'static str, timeout: Duration },
    #[error("Setup error: {detail}")]
    Setup { detail: String },
}

impl DbTestError {
    pub fn config(message: impl Into<String>) -> Self {
        DbTestError::Config {
            message: message.into(),
        }
    }

    /// Wrap a failure from a caller-supplied setup or cleanup function that is
    /// not a database error.
    pub fn setup(detail: impl Into<String>) -> Self {
        DbTestError::Setup {
            detail: detail.into(),
        }
    }
}

pub mod dsn;
pub mod flags;

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{self, BoxFuture, FutureExt};
use sea_orm::DatabaseConnection;
use tokio_util::sync::CancellationToken;

use crate::error::DbTestError;
use crate::logging::{default_logger, Logger, SharedLogger};

pub const DEFAULT_SETUP_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_CLEANUP_TIMEOUT: Duration = Duration::from_secs(3);

/// Produces a live database handle.
pub type ConnectFn =
    Arc<dyn Fn() -> BoxFuture<'static, Result<DatabaseConnection, DbTestError>> + Send + Sync>;

/// Decides whether database tests are bypassed for this run.
pub type SkipFn = Arc<dyn Fn() -> bool + Send + Sync>;

/// One-time setup or cleanup. The token is cancelled when the deadline expires.
pub type LifecycleFn = Arc<
    dyn Fn(DatabaseConnection, CancellationToken) -> BoxFuture<'static, Result<(), DbTestError>>
        + Send
        + Sync,
>;

/// Behavior customization points for [`crate::run_tests`].
///
/// Every field is optional; [`Config::settings`] fills the gaps with defaults.
#[derive(Clone, Default)]
pub struct Config {
    connect: Option<ConnectFn>,
    skip: Option<SkipFn>,
    setup: Option<LifecycleFn>,
    cleanup: Option<LifecycleFn>,
    setup_timeout: Option<Duration>,
    cleanup_timeout: Option<Duration>,
    logger: Option<SharedLogger>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_connect<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<DatabaseConnection, DbTestError>> + Send + 'static,
    {
        self.connect = Some(Arc::new(move || f().boxed()));
        self
    }

    pub fn with_skip<F>(mut self, f: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        self.skip = Some(Arc::new(f));
        self
    }

    pub fn with_setup<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(DatabaseConnection, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), DbTestError>> + Send + 'static,
    {
        self.setup = Some(lifecycle_fn(f));
        self
    }

    pub fn with_cleanup<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(DatabaseConnection, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), DbTestError>> + Send + 'static,
    {
        self.cleanup = Some(lifecycle_fn(f));
        self
    }

    pub fn with_setup_timeout(mut self, timeout: Duration) -> Self {
        self.setup_timeout = Some(timeout);
        self
    }

    pub fn with_cleanup_timeout(mut self, timeout: Duration) -> Self {
        self.cleanup_timeout = Some(timeout);
        self
    }

    pub fn with_logger<L>(mut self, logger: L) -> Self
    where
        L: Logger + 'static,
    {
        self.logger = Some(Arc::new(logger));
        self
    }

    /// Resolve every unset field to its default.
    ///
    /// Borrows the config, so the caller's value is never modified and
    /// repeated calls resolve to the same behaviors. A zero timeout is treated
    /// as unset.
    pub fn settings(&self) -> Settings {
        Settings {
            connect: self
                .connect
                .clone()
                .unwrap_or_else(|| Arc::new(|| dsn::connect_from_env().boxed())),
            skip: self
                .skip
                .clone()
                .unwrap_or_else(|| Arc::new(|| flags::HarnessArgs::current().short_mode())),
            setup: self.setup.clone().unwrap_or_else(noop),
            cleanup: self.cleanup.clone().unwrap_or_else(noop),
            setup_timeout: non_zero_or(self.setup_timeout, DEFAULT_SETUP_TIMEOUT),
            cleanup_timeout: non_zero_or(self.cleanup_timeout, DEFAULT_CLEANUP_TIMEOUT),
            logger: self.logger.clone().unwrap_or_else(default_logger),
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("connect", &self.connect.is_some())
            .field("skip", &self.skip.is_some())
            .field("setup", &self.setup.is_some())
            .field("cleanup", &self.cleanup.is_some())
            .field("setup_timeout", &self.setup_timeout)
            .field("cleanup_timeout", &self.cleanup_timeout)
            .field("logger", &self.logger.is_some())
            .finish()
    }
}

/// A fully populated [`Config`]: no behavior is ever missing.
#[derive(Clone)]
pub struct Settings {
    pub connect: ConnectFn,
    pub skip: SkipFn,
    pub setup: LifecycleFn,
    pub cleanup: LifecycleFn,
    pub setup_timeout: Duration,
    pub cleanup_timeout: Duration,
    pub logger: SharedLogger,
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("setup_timeout", &self.setup_timeout)
            .field("cleanup_timeout", &self.cleanup_timeout)
            .finish_non_exhaustive()
    }
}

fn lifecycle_fn<F, Fut>(f: F) -> LifecycleFn
where
    F: Fn(DatabaseConnection, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), DbTestError>> + Send + 'static,
{
    Arc::new(move |db, cancel| f(db, cancel).boxed())
}

fn noop() -> LifecycleFn {
    Arc::new(|_db: DatabaseConnection, _cancel: CancellationToken| {
        future::ok::<(), DbTestError>(()).boxed()
    })
}

fn non_zero_or(value: Option<Duration>, default: Duration) -> Duration {
    value.filter(|d| !d.is_zero()).unwrap_or(default)
}

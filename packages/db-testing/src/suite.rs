//! Shared process state for one test run.
//!
//! A [`Suite`] is built by [`crate::run_tests`] before any test exists and is
//! never modified afterwards, so clones can be read from concurrently running
//! tests without locking.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use sea_orm::DatabaseConnection;

use crate::db::txn::{with_rollback, TestContext};
use crate::harness::outcome::{IntoOutcome, Outcome, Reporter};
use crate::logging::SharedLogger;

/// Whether database tests run, and against which handle.
pub enum SuiteState {
    Skipped,
    Ready(DatabaseConnection),
}

struct SuiteInner {
    state: SuiteState,
    logger: SharedLogger,
}

#[derive(Clone)]
pub struct Suite {
    inner: Arc<SuiteInner>,
}

impl Suite {
    pub fn skipped(logger: SharedLogger) -> Self {
        Self::with_state(SuiteState::Skipped, logger)
    }

    pub fn ready(db: DatabaseConnection, logger: SharedLogger) -> Self {
        Self::with_state(SuiteState::Ready(db), logger)
    }

    fn with_state(state: SuiteState, logger: SharedLogger) -> Self {
        Self {
            inner: Arc::new(SuiteInner { state, logger }),
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self.inner.state, SuiteState::Skipped)
    }

    /// The shared handle. Tests should use [`TestContext::txn`] instead:
    /// writes made here escape isolation.
    pub fn db(&self) -> Option<&DatabaseConnection> {
        match &self.inner.state {
            SuiteState::Ready(db) => Some(db),
            SuiteState::Skipped => None,
        }
    }

    /// Wrap `body` into a test case that runs inside its own transaction,
    /// rolled back when the body finishes, however it finishes.
    pub fn inject<F, Fut, R>(&self, body: F) -> TestCase
    where
        F: FnOnce(TestContext) -> Fut + Send + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoOutcome + 'static,
    {
        let suite = self.clone();
        TestCase::new(move |reporter| {
            async move {
                match &suite.inner.state {
                    SuiteState::Skipped => Outcome::Skipped,
                    SuiteState::Ready(db) => {
                        with_rollback(db, &suite.inner.logger, reporter, body).await
                    }
                }
            }
            .boxed()
        })
    }
}

impl fmt::Debug for Suite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Suite")
            .field("skipped", &self.is_skipped())
            .finish_non_exhaustive()
    }
}

type CaseFn = Box<dyn FnOnce(Reporter) -> BoxFuture<'static, Outcome> + Send>;

/// A runnable test produced by [`Suite::inject`].
pub struct TestCase {
    run: CaseFn,
}

impl TestCase {
    pub fn new<F>(run: F) -> Self
    where
        F: FnOnce(Reporter) -> BoxFuture<'static, Outcome> + Send + 'static,
    {
        Self { run: Box::new(run) }
    }

    pub async fn run(self, reporter: Reporter) -> Outcome {
        (self.run)(reporter).await
    }
}

impl fmt::Debug for TestCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestCase").finish_non_exhaustive()
    }
}

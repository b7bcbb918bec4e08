use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;

use futures::FutureExt;
use sea_orm::DatabaseConnection;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::{Config, Settings};
use crate::error::DbTestError;
use crate::logging::SharedLogger;
use crate::runner::{TestRunner, EXIT_FAILURE};
use crate::suite::Suite;

/// Run a test binary's tests against a shared database.
///
/// 1. resolve defaults for every unset [`Config`] field
/// 2. skip decision: when true, run the tests against a skipped [`Suite`]
///    and return their exit code; nothing touches the database
/// 3. connect, probe and set up, all under the setup deadline; any failure
///    is logged and returns [`EXIT_FAILURE`] without running a test
/// 4. run the tests against a ready [`Suite`]
/// 5. always clean up (own deadline) and close the handle afterwards, even if
///    the runner panics; failures here are logged and never change the code
pub async fn run_tests<R>(mut runner: R, config: Config) -> i32
where
    R: TestRunner,
{
    let settings = config.settings();
    let logger = settings.logger.clone();

    if (settings.skip)() {
        info!("database tests skipped");
        return runner.run(&Suite::skipped(logger)).await;
    }

    let db = match (settings.connect)().await {
        Ok(db) => db,
        Err(e) => {
            logger.log(format_args!("connect: {e}"));
            return EXIT_FAILURE;
        }
    };

    if let Err((op, e)) = prepare(&settings, &db).await {
        logger.log(format_args!("{op}: {e}"));
        close(db, &logger).await;
        return EXIT_FAILURE;
    }
    info!(setup_timeout = ?settings.setup_timeout, "database ready");

    let suite = Suite::ready(db.clone(), logger.clone());
    let result = AssertUnwindSafe(runner.run(&suite)).catch_unwind().await;
    drop(suite);

    if result.is_err() {
        warn!("test runner panicked, cleaning up before resuming");
    }
    cleanup(&settings, &db).await;
    close(db, &logger).await;

    match result {
        Ok(code) => code,
        Err(payload) => panic::resume_unwind(payload),
    }
}

/// Probe then set up, sharing one deadline.
async fn prepare(
    settings: &Settings,
    db: &DatabaseConnection,
) -> Result<(), (&'static str, DbTestError)> {
    let budget = settings.setup_timeout;
    let deadline = Instant::now() + budget;
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    bounded("db.ping", deadline, budget, &cancel, async {
        db.ping().await.map_err(DbTestError::from)
    })
    .await
    .map_err(|e| ("db.ping", e))?;

    bounded(
        "setup",
        deadline,
        budget,
        &cancel,
        (settings.setup)(db.clone(), cancel.clone()),
    )
    .await
    .map_err(|e| ("setup", e))
}

async fn cleanup(settings: &Settings, db: &DatabaseConnection) {
    let budget = settings.cleanup_timeout;
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let result = bounded(
        "cleanup",
        Instant::now() + budget,
        budget,
        &cancel,
        (settings.cleanup)(db.clone(), cancel.clone()),
    )
    .await;

    if let Err(e) = result {
        settings.logger.log(format_args!("cleanup: {e}"));
    }
}

async fn close(db: DatabaseConnection, logger: &SharedLogger) {
    if let Err(e) = db.close().await {
        logger.log(format_args!("db.close: {e}"));
    }
}

/// Drive `fut` until it finishes or `deadline` passes. On expiry the future is
/// dropped and `cancel` is cancelled.
async fn bounded<Fut>(
    op: &'static str,
    deadline: Instant,
    budget: Duration,
    cancel: &CancellationToken,
    fut: Fut,
) -> Result<(), DbTestError>
where
    Fut: Future<Output = Result<(), DbTestError>>,
{
    let start = Instant::now();

    tokio::select! {
        biased;

        result = fut => result,
        _ = tokio::time::sleep_until(deadline) => {
            cancel.cancel();
            warn!(op, elapsed_ms = start.elapsed().as_millis() as u64, "deadline exceeded, operation cancelled");
            Err(DbTestError::Timeout { op, timeout: budget })
        }
    }
}

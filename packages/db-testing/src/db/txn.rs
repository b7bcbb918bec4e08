use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use sea_orm::{DatabaseConnection, DatabaseTransaction, DbErr, TransactionTrait};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::harness::outcome::{IntoOutcome, Outcome, Reporter};
use crate::logging::SharedLogger;

/// How long the wrapper waits for a leaked transaction handle to be dropped.
pub const RELEASE_GRACE: Duration = Duration::from_secs(2);

/// A transaction shared between the isolation wrapper (owner) and a test body.
#[derive(Clone)]
pub(crate) struct SharedTxn(Arc<DatabaseTransaction>);

impl SharedTxn {
    pub(crate) async fn open(db: &DatabaseConnection) -> Result<Self, DbErr> {
        let txn = db.begin().await?;
        Ok(SharedTxn(Arc::new(txn)))
    }

    pub(crate) fn transaction(&self) -> &DatabaseTransaction {
        &self.0
    }

    pub(crate) fn strong_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }

    /// Roll back once every other handle is gone, waiting up to `grace`.
    ///
    /// If a handle is still held after `grace`, the transaction is left to be
    /// discarded by the driver when that handle drops.
    pub(crate) async fn rollback_eventually(self, grace: Duration) -> Result<(), DbErr> {
        let deadline = Instant::now() + grace;

        while self.strong_count() > 1 {
            if Instant::now() >= deadline {
                return Err(DbErr::Custom(
                    "transaction is still shared; it will be discarded when released".to_string(),
                ));
            }
            tokio::task::yield_now().await;
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let txn = Arc::try_unwrap(self.0).map_err(|_| {
            DbErr::Custom("Cannot rollback: transaction is still shared".to_string())
        })?;
        txn.rollback().await
    }
}

/// What a test body receives: its reporting handle and its transaction.
///
/// All database work for the test must go through [`TestContext::txn`];
/// the transaction is rolled back by the wrapper, never by the body.
pub struct TestContext {
    reporter: Reporter,
    txn: SharedTxn,
}

impl TestContext {
    pub fn txn(&self) -> &DatabaseTransaction {
        self.txn.transaction()
    }

    pub fn name(&self) -> &str {
        self.reporter.name()
    }

    pub fn log(&self, args: std::fmt::Arguments<'_>) {
        self.reporter.log(args)
    }
}

/// Run `body` inside a fresh transaction on `db` and always roll it back.
///
/// - begin fails: the test fails, the body never runs
/// - body returns: rollback, then the body's outcome
/// - body panics: rollback, then the original panic resumes unchanged
///
/// Rollback failures go to `logger` and never replace the body's result.
pub(crate) async fn with_rollback<F, Fut, R>(
    db: &DatabaseConnection,
    logger: &SharedLogger,
    reporter: Reporter,
    body: F,
) -> Outcome
where
    F: FnOnce(TestContext) -> Fut,
    Fut: Future<Output = R>,
    R: IntoOutcome,
{
    let shared = match SharedTxn::open(db).await {
        Ok(shared) => shared,
        Err(e) => return Outcome::failed(format!("db.begin: {e}")),
    };

    let cx = TestContext {
        reporter: reporter.clone(),
        txn: shared.clone(),
    };
    let result = AssertUnwindSafe(async move { body(cx).await })
        .catch_unwind()
        .await
        .map(IntoOutcome::into_outcome);

    if result.is_err() {
        warn!(test = reporter.name(), "test body panicked, rolling back");
    }

    match shared.rollback_eventually(RELEASE_GRACE).await {
        Ok(()) => debug!(test = reporter.name(), "transaction rolled back"),
        Err(e) => logger.log(format_args!("txn.rollback ({}): {e}", reporter.name())),
    }

    match result {
        Ok(outcome) => outcome,
        Err(payload) => panic::resume_unwind(payload),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use sea_orm::ConnectionTrait;

    use super::*;
    use crate::harness::outcome::panic_message;
    use crate::testing::{capture_logger, film_count, films_db, insert_film};

    #[tokio::test]
    async fn writes_are_rolled_back_after_the_body_returns() {
        let db = films_db().await;
        let (logger, lines) = capture_logger();

        let outcome = with_rollback(&db, &logger, Reporter::new("insert"), |cx| async move {
            insert_film(cx.txn(), "abcde", "random title").await;
            assert_eq!(film_count(cx.txn()).await, 1);
        })
        .await;

        assert_eq!(outcome, Outcome::Passed);
        assert_eq!(film_count(&db).await, 0);
        assert!(lines.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn panics_roll_back_then_resume_unchanged() {
        let db = films_db().await;
        let (logger, _lines) = capture_logger();

        let caught = AssertUnwindSafe(with_rollback::<_, _, ()>(
            &db,
            &logger,
            Reporter::new("panics"),
            |cx| async move {
                insert_film(cx.txn(), "abcde", "random title").await;
                panic!("didn't find the expected code");
            },
        ))
        .catch_unwind()
        .await;

        let payload = caught.expect_err("the panic must propagate");
        assert_eq!(panic_message(&*payload), "didn't find the expected code");
        assert_eq!(film_count(&db).await, 0);
    }

    #[tokio::test]
    async fn errors_fail_the_test_and_still_roll_back() {
        let db = films_db().await;
        let (logger, _lines) = capture_logger();

        let outcome = with_rollback(&db, &logger, Reporter::new("errs"), |cx| async move {
            insert_film(cx.txn(), "abcde", "random title").await;
            Err::<(), _>(DbErr::Custom("there should've been a row to read".into()))
        })
        .await;

        assert!(outcome.is_failure());
        assert_eq!(film_count(&db).await, 0);
    }

    #[tokio::test]
    async fn begin_failure_fails_only_the_test() {
        let db = films_db().await;
        db.clone().close().await.unwrap();
        let (logger, _lines) = capture_logger();
        let ran = Arc::new(AtomicBool::new(false));

        let flag = ran.clone();
        let outcome = with_rollback(&db, &logger, Reporter::new("closed"), |_cx| async move {
            flag.store(true, Ordering::SeqCst);
        })
        .await;

        match outcome {
            Outcome::Failed(message) => assert!(message.starts_with("db.begin: ")),
            other => panic!("expected a failure, got {other:?}"),
        }
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn leaked_handles_are_waited_for() {
        let db = films_db().await;
        let (logger, lines) = capture_logger();

        let outcome = with_rollback(&db, &logger, Reporter::new("leaks"), |cx| async move {
            insert_film(cx.txn(), "abcde", "random title").await;
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                drop(cx);
            });
        })
        .await;

        assert_eq!(outcome, Outcome::Passed);
        assert!(lines.lock().unwrap().is_empty());
        assert_eq!(film_count(&db).await, 0);
    }

    type Holder = Arc<std::sync::Mutex<Option<tokio::task::JoinHandle<()>>>>;

    /// Keep `cx` alive in a background task past the release grace period.
    fn leak_past_grace(cx: TestContext, holder: &Holder) {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(RELEASE_GRACE + Duration::from_millis(500)).await;
            drop(cx);
        });
        *holder.lock().unwrap() = Some(handle);
    }

    async fn wait_for_leak(holder: &Holder) {
        let handle = holder.lock().unwrap().take().expect("body spawned the leak");
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn rollback_failure_is_logged_not_escalated() {
        let db = films_db().await;
        let (logger, lines) = capture_logger();
        let holder = Holder::default();

        let leak = holder.clone();
        let outcome = with_rollback(&db, &logger, Reporter::new("leaks"), |cx| async move {
            insert_film(cx.txn(), "abcde", "random title").await;
            leak_past_grace(cx, &leak);
        })
        .await;

        assert_eq!(outcome, Outcome::Passed);
        {
            let lines = lines.lock().unwrap();
            assert_eq!(lines.len(), 1);
            assert!(lines[0].starts_with("txn.rollback (leaks): "), "{lines:?}");
        }

        wait_for_leak(&holder).await;
        assert_eq!(film_count(&db).await, 0);
    }

    #[tokio::test]
    async fn rollback_failure_never_hides_a_panic() {
        let db = films_db().await;
        let (logger, lines) = capture_logger();
        let holder = Holder::default();

        let leak = holder.clone();
        let caught = AssertUnwindSafe(with_rollback::<_, _, ()>(
            &db,
            &logger,
            Reporter::new("leaks_then_panics"),
            |cx| async move {
                insert_film(cx.txn(), "abcde", "random title").await;
                leak_past_grace(cx, &leak);
                panic!("row was never read back");
            },
        ))
        .catch_unwind()
        .await;

        let payload = caught.expect_err("the panic must propagate");
        assert_eq!(panic_message(&*payload), "row was never read back");
        assert!(lines.lock().unwrap()[0].starts_with("txn.rollback (leaks_then_panics): "));

        wait_for_leak(&holder).await;
        assert_eq!(film_count(&db).await, 0);
    }

    #[tokio::test]
    async fn the_body_sees_its_own_writes() {
        let db = films_db().await;
        let (logger, _lines) = capture_logger();

        let outcome = with_rollback(&db, &logger, Reporter::new("reads"), |cx| async move {
            insert_film(cx.txn(), "abcde", "random title").await;
            let row = cx
                .txn()
                .query_one(sea_orm::Statement::from_string(
                    cx.txn().get_database_backend(),
                    "SELECT code, title FROM films",
                ))
                .await?
                .expect("there should've been a row to read");
            let code: String = row.try_get("", "code")?;
            let title: String = row.try_get("", "title")?;
            assert_eq!((code.as_str(), title.as_str()), ("abcde", "random title"));
            Ok::<(), DbErr>(())
        })
        .await;

        assert_eq!(outcome, Outcome::Passed);
    }
}

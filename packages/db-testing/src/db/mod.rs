pub mod txn;

use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use sea_orm::{ConnectionTrait, DatabaseConnection};
use tokio_util::sync::CancellationToken;

use crate::error::DbTestError;

/// Turn a literal statement (or script) into a setup or cleanup function.
///
/// ```no_run
/// use db_testing::{sql, Config};
///
/// let config = Config::new()
///     .with_setup(sql("CREATE TABLE films (code char(5) PRIMARY KEY)"))
///     .with_cleanup(sql("DROP TABLE films"));
/// ```
pub fn sql(
    statement: impl Into<String>,
) -> impl Fn(DatabaseConnection, CancellationToken) -> BoxFuture<'static, Result<(), DbTestError>>
       + Clone
       + Send
       + Sync
       + 'static {
    let statement: Arc<str> = statement.into().into();
    move |db: DatabaseConnection, _cancel: CancellationToken| {
        let statement = statement.clone();
        async move {
            db.execute_unprepared(&statement).await?;
            Ok::<(), DbTestError>(())
        }
        .boxed()
    }
}

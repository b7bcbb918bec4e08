//! Helpers shared by this crate's unit tests.

use std::fmt;
use std::sync::{Arc, Mutex};

use sea_orm::{ConnectionTrait, DatabaseConnection, Statement};

use crate::config::dsn::{self, Dsn};
use crate::logging::SharedLogger;

pub const CREATE_FILMS: &str = "CREATE TABLE films (
    code        char(5) CONSTRAINT firstkey PRIMARY KEY,
    title       varchar(40) NOT NULL,
    did         integer NOT NULL,
    date_prod   date,
    kind        varchar(10)
)";

pub async fn memory_db() -> DatabaseConnection {
    let dsn = Dsn::parse("sqlite::memory:").unwrap();
    dsn::connect(&dsn).await.unwrap()
}

pub async fn films_db() -> DatabaseConnection {
    let db = memory_db().await;
    db.execute_unprepared(CREATE_FILMS).await.unwrap();
    db
}

pub async fn insert_film(conn: &impl ConnectionTrait, code: &str, title: &str) {
    conn.execute_unprepared(&format!(
        "INSERT INTO films (code, title, did) VALUES ('{code}', '{title}', 1)"
    ))
    .await
    .unwrap();
}

pub async fn film_count(conn: &impl ConnectionTrait) -> i64 {
    let row = conn
        .query_one(Statement::from_string(
            conn.get_database_backend(),
            "SELECT COUNT(*) AS n FROM films",
        ))
        .await
        .unwrap()
        .unwrap();
    row.try_get("", "n").unwrap()
}

pub fn capture_logger() -> (SharedLogger, Arc<Mutex<Vec<String>>>) {
    let lines = Arc::new(Mutex::new(Vec::new()));
    let sink = lines.clone();
    let logger: SharedLogger = Arc::new(move |args: fmt::Arguments<'_>| {
        sink.lock().unwrap().push(args.to_string())
    });
    (logger, lines)
}

//! Shared SQLite handle.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::task::spawn_blocking;
use tracing::info;

use analyst_common::{Computation, Error, Result};

use crate::entity::EntitySpec;

const LEDGER_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS dune_execution_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    query_id INTEGER NOT NULL,
    query_name TEXT NOT NULL,
    execution_id TEXT UNIQUE,
    execution_date TEXT NOT NULL,
    status TEXT NOT NULL CHECK (status IN ('PENDING', 'EXECUTING', 'COMPLETED', 'FAILED')),
    row_count INTEGER,
    error_message TEXT,
    started_at TEXT NOT NULL,
    completed_at TEXT,
    created_at TEXT NOT NULL,
    CHECK (execution_id IS NOT NULL OR status IN ('PENDING', 'FAILED'))
);
CREATE INDEX IF NOT EXISTS idx_dune_execution_log_status
    ON dune_execution_log (status, started_at);
CREATE INDEX IF NOT EXISTS idx_dune_execution_log_query_date
    ON dune_execution_log (query_id, execution_date);
";

/// Process-wide storage handle. Cheap to clone; all clones share one connection.
#[derive(Clone)]
pub struct SqliteDb {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteDb {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_owned();
        let path_display = path.display().to_string();
        let conn = spawn_blocking(move || Connection::open(path))
            .await
            .map_err(|e| Error::Persistence(format!("sqlite join error: {e}")))?
            .map_err(|e| {
                Error::Configuration(format!("cannot open database {path_display}: {e}"))
            })?;
        let db = Self::from_connection(conn);
        db.init_schema().await?;
        info!(path = %path_display, "database opened");
        Ok(db)
    }

    pub async fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Configuration(format!("cannot open in-memory database: {e}")))?;
        let db = Self::from_connection(conn);
        db.init_schema().await?;
        Ok(db)
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    async fn init_schema(&self) -> Result<()> {
        self.with_conn(|conn| {
            let mut ddl = String::from("BEGIN;\n");
            ddl.push_str(LEDGER_SCHEMA);
            for computation in Computation::ALL {
                ddl.push_str(&EntitySpec::for_computation(computation).create_table_sql());
            }
            ddl.push_str("COMMIT;");
            conn.execute_batch(&ddl)
        })
        .await
    }

    /// Runs `func` against the connection on the blocking pool.
    pub async fn with_conn<F, T>(&self, func: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        self.try_with_conn(move |conn| func(conn).map_err(persistence))
            .await
    }

    /// Like [`SqliteDb::with_conn`] for closures that produce their own [`Error`].
    pub async fn try_with_conn<F, T>(&self, func: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| Error::Persistence("sqlite connection poisoned".to_string()))?;
            func(&mut guard)
        })
        .await
        .map_err(|e| Error::Persistence(format!("sqlite join error: {e}")))?
    }

    /// Explicit teardown. Fails if other clones of the handle are still alive.
    pub async fn close(self) -> Result<()> {
        let mutex = Arc::try_unwrap(self.conn).map_err(|_| {
            Error::Persistence("database handle is still shared and cannot be closed".to_string())
        })?;
        let conn = mutex
            .into_inner()
            .map_err(|_| Error::Persistence("sqlite connection poisoned".to_string()))?;
        spawn_blocking(move || conn.close().map_err(|(_, e)| persistence(e)))
            .await
            .map_err(|e| Error::Persistence(format!("sqlite join error: {e}")))?
    }
}

pub(crate) fn persistence(err: rusqlite::Error) -> Error {
    Error::Persistence(format!("sqlite error: {err}"))
}

pub(crate) fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| conversion_error(Box::new(e)))
}

pub(crate) fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub(crate) fn parse_date(raw: &str) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|e| conversion_error(Box::new(e)))
}

fn conversion_error(e: Box<dyn std::error::Error + Send + Sync>) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, e)
}

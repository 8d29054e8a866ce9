//! Durable record of every remote execution.
//!
//! Each status change is a single conditional `UPDATE` keyed by the remote
//! execution id. An update whose pre-state no longer matches touches no rows
//! and is reported as `false`, so concurrent invocations can skip an update but
//! never move a record backwards.

use chrono::NaiveDate;
use rusqlite::{params, OptionalExtension};
use std::sync::Arc;
use tracing::debug;

use analyst_common::{Clock, ExecutionRecord, ExecutionStatus, Result};

use crate::db::{format_date, format_timestamp, parse_date, parse_timestamp, SqliteDb};

const SELECT_COLUMNS: &str = "id, query_id, query_name, execution_id, execution_date, status, \
     row_count, error_message, started_at, completed_at";

/// Upper bound for [`ExecutionLedger::list_recent`].
pub const MAX_RECENT: u32 = 500;

#[derive(Clone)]
pub struct ExecutionLedger {
    db: SqliteDb,
    clock: Arc<dyn Clock>,
}

impl ExecutionLedger {
    pub fn new(db: SqliteDb, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    /// Inserts a new PENDING or EXECUTING record and returns its id.
    pub async fn create(&self, record: &ExecutionRecord) -> Result<i64> {
        record.validate_new()?;
        let record = record.clone();
        let created_at = format_timestamp(self.clock.utc_now());
        let id = self
            .db
            .with_conn(move |conn| {
                conn.execute(
                    "INSERT INTO dune_execution_log
                        (query_id, query_name, execution_id, execution_date, status,
                         row_count, error_message, started_at, completed_at, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, NULL, NULL, ?6, NULL, ?7)",
                    params![
                        record.query_id,
                        record.query_name,
                        record.remote_execution_id,
                        format_date(record.target_date),
                        record.status.as_str(),
                        format_timestamp(record.started_at),
                        created_at,
                    ],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await?;
        debug!(record_id = id, "execution record created");
        Ok(id)
    }

    /// PENDING -> EXECUTING.
    pub async fn mark_executing(&self, remote_execution_id: &str) -> Result<bool> {
        let remote_id = remote_execution_id.to_string();
        self.update(move |conn| {
            conn.execute(
                "UPDATE dune_execution_log SET status = 'EXECUTING'
                 WHERE execution_id = ?1 AND status = 'PENDING'",
                params![remote_id],
            )
        })
        .await
    }

    /// EXECUTING -> COMPLETED with the merged row count.
    pub async fn mark_completed(&self, remote_execution_id: &str, row_count: u64) -> Result<bool> {
        let remote_id = remote_execution_id.to_string();
        let completed_at = format_timestamp(self.clock.utc_now());
        let row_count = i64::try_from(row_count).unwrap_or(i64::MAX);
        self.update(move |conn| {
            conn.execute(
                "UPDATE dune_execution_log
                 SET status = 'COMPLETED', row_count = ?2, error_message = NULL, completed_at = ?3
                 WHERE execution_id = ?1 AND status = 'EXECUTING'",
                params![remote_id, row_count, completed_at],
            )
        })
        .await
    }

    /// PENDING or EXECUTING -> FAILED with a reason.
    pub async fn mark_failed(&self, remote_execution_id: &str, reason: &str) -> Result<bool> {
        let remote_id = remote_execution_id.to_string();
        let reason = reason.to_string();
        let completed_at = format_timestamp(self.clock.utc_now());
        self.update(move |conn| {
            conn.execute(
                "UPDATE dune_execution_log
                 SET status = 'FAILED', row_count = NULL, error_message = ?2, completed_at = ?3
                 WHERE execution_id = ?1 AND status IN ('PENDING', 'EXECUTING')",
                params![remote_id, reason, completed_at],
            )
        })
        .await
    }

    /// Fails a PENDING record that never received a remote execution id.
    pub async fn abandon(&self, record_id: i64, reason: &str) -> Result<bool> {
        let reason = reason.to_string();
        let completed_at = format_timestamp(self.clock.utc_now());
        self.update(move |conn| {
            conn.execute(
                "UPDATE dune_execution_log
                 SET status = 'FAILED', error_message = ?2, completed_at = ?3
                 WHERE id = ?1 AND status = 'PENDING' AND execution_id IS NULL",
                params![record_id, reason, completed_at],
            )
        })
        .await
    }

    /// Every PENDING or EXECUTING record, oldest first.
    pub async fn list_outstanding(&self) -> Result<Vec<ExecutionRecord>> {
        self.db
            .with_conn(|conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {SELECT_COLUMNS} FROM dune_execution_log
                     WHERE status IN ('PENDING', 'EXECUTING')
                     ORDER BY started_at ASC, id ASC"
                ))?;
                let records = stmt
                    .query_map([], map_record)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(records)
            })
            .await
    }

    /// The newest outstanding record for one query and target date, if any.
    pub async fn find_outstanding(
        &self,
        query_id: i64,
        target_date: NaiveDate,
    ) -> Result<Option<ExecutionRecord>> {
        let date = format_date(target_date);
        self.db
            .with_conn(move |conn| {
                conn.query_row(
                    &format!(
                        "SELECT {SELECT_COLUMNS} FROM dune_execution_log
                         WHERE query_id = ?1 AND execution_date = ?2
                           AND status IN ('PENDING', 'EXECUTING')
                         ORDER BY started_at DESC, id DESC LIMIT 1"
                    ),
                    params![query_id, date],
                    map_record,
                )
                .optional()
            })
            .await
    }

    pub async fn get(&self, record_id: i64) -> Result<Option<ExecutionRecord>> {
        self.db
            .with_conn(move |conn| {
                conn.query_row(
                    &format!("SELECT {SELECT_COLUMNS} FROM dune_execution_log WHERE id = ?1"),
                    params![record_id],
                    map_record,
                )
                .optional()
            })
            .await
    }

    pub async fn find_by_remote_id(
        &self,
        remote_execution_id: &str,
    ) -> Result<Option<ExecutionRecord>> {
        let remote_id = remote_execution_id.to_string();
        self.db
            .with_conn(move |conn| {
                conn.query_row(
                    &format!(
                        "SELECT {SELECT_COLUMNS} FROM dune_execution_log WHERE execution_id = ?1"
                    ),
                    params![remote_id],
                    map_record,
                )
                .optional()
            })
            .await
    }

    /// Newest records first, at most `limit` (clamped to 1..=[`MAX_RECENT`]).
    pub async fn list_recent(&self, limit: u32) -> Result<Vec<ExecutionRecord>> {
        let limit = limit.clamp(1, MAX_RECENT);
        self.db
            .with_conn(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {SELECT_COLUMNS} FROM dune_execution_log
                     ORDER BY started_at DESC, id DESC LIMIT ?1"
                ))?;
                let records = stmt
                    .query_map(params![limit], map_record)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(records)
            })
            .await
    }

    async fn update<F>(&self, func: F) -> Result<bool>
    where
        F: FnOnce(&mut rusqlite::Connection) -> rusqlite::Result<usize> + Send + 'static,
    {
        let changed = self.db.with_conn(func).await?;
        Ok(changed > 0)
    }
}

fn map_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<ExecutionRecord> {
    let status: String = row.get(5)?;
    let status = status.parse::<ExecutionStatus>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let execution_date: String = row.get(4)?;
    let started_at: String = row.get(8)?;
    let completed_at: Option<String> = row.get(9)?;

    Ok(ExecutionRecord {
        id: Some(row.get(0)?),
        query_id: row.get(1)?,
        query_name: row.get(2)?,
        remote_execution_id: row.get(3)?,
        target_date: parse_date(&execution_date)?,
        status,
        row_count: row.get(6)?,
        error_message: row.get(7)?,
        started_at: parse_timestamp(&started_at)?,
        completed_at: completed_at.as_deref().map(parse_timestamp).transpose()?,
    })
}

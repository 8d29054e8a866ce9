use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::computation::Computation;
use crate::error::Error;

/// Lifecycle state of a ledger record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Pending,
    Executing,
    Completed,
    Failed,
}

impl ExecutionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionStatus::Pending => "PENDING",
            ExecutionStatus::Executing => "EXECUTING",
            ExecutionStatus::Completed => "COMPLETED",
            ExecutionStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ExecutionStatus::Completed | ExecutionStatus::Failed)
    }

    /// Forward-only lifecycle: PENDING -> EXECUTING -> COMPLETED, with FAILED
    /// reachable from either non-terminal state.
    pub fn can_transition_to(self, next: ExecutionStatus) -> bool {
        use ExecutionStatus::*;
        matches!(
            (self, next),
            (Pending, Executing) | (Pending, Failed) | (Executing, Completed) | (Executing, Failed)
        )
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(ExecutionStatus::Pending),
            "EXECUTING" => Ok(ExecutionStatus::Executing),
            "COMPLETED" => Ok(ExecutionStatus::Completed),
            "FAILED" => Ok(ExecutionStatus::Failed),
            other => Err(Error::InvalidData(format!("unknown execution status: {other}"))),
        }
    }
}

/// One submitted (or about to be submitted) remote computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    /// Ledger row id, assigned on insert.
    pub id: Option<i64>,
    pub query_id: i64,
    pub query_name: String,
    pub remote_execution_id: Option<String>,
    pub target_date: NaiveDate,
    pub status: ExecutionStatus,
    pub row_count: Option<i64>,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ExecutionRecord {
    /// A fresh record for `computation`, not yet inserted.
    pub fn new(
        computation: Computation,
        target_date: NaiveDate,
        status: ExecutionStatus,
        remote_execution_id: Option<String>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: None,
            query_id: computation.query_id(),
            query_name: computation.name().to_string(),
            remote_execution_id,
            target_date,
            status,
            row_count: None,
            error_message: None,
            started_at,
            completed_at: None,
        }
    }

    pub fn computation(&self) -> Option<Computation> {
        Computation::from_query_id(self.query_id)
    }

    /// Checks the invariants a record must satisfy before it is inserted.
    pub fn validate_new(&self) -> Result<(), Error> {
        if self.status.is_terminal() {
            return Err(Error::InvalidData(format!(
                "new ledger records must be PENDING or EXECUTING, got {}",
                self.status
            )));
        }
        if self.remote_execution_id.is_none() && self.status != ExecutionStatus::Pending {
            return Err(Error::InvalidData(
                "a record without a remote execution id can only be PENDING".to_string(),
            ));
        }
        Ok(())
    }
}

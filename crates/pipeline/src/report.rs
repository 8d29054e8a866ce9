//! Structured summaries returned by each process.

use chrono::NaiveDate;
use serde::Serialize;
use uuid::Uuid;

use analyst_common::Computation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitOutcome {
    Submitted,
    Failed,
    /// An execution for the same query and date was still outstanding.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmitResult {
    pub computation: Computation,
    pub query_id: i64,
    pub outcome: SubmitOutcome,
    pub execution_id: Option<String>,
    pub record_id: Option<i64>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmitReport {
    pub run_id: Uuid,
    pub target_date: NaiveDate,
    pub submitted: usize,
    pub failed: usize,
    pub skipped: usize,
    pub results: Vec<SubmitResult>,
}

impl SubmitReport {
    pub(crate) fn new(run_id: Uuid, target_date: NaiveDate, results: Vec<SubmitResult>) -> Self {
        let count = |outcome: SubmitOutcome| {
            results.iter().filter(|r| r.outcome == outcome).count()
        };
        Self {
            run_id,
            target_date,
            submitted: count(SubmitOutcome::Submitted),
            failed: count(SubmitOutcome::Failed),
            skipped: count(SubmitOutcome::Skipped),
            results,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordOutcome {
    Completed,
    Failed,
    StillPending,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordResult {
    pub record_id: Option<i64>,
    pub query_id: i64,
    pub query_name: String,
    pub execution_id: Option<String>,
    pub outcome: RecordOutcome,
    pub row_count: Option<u64>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconcileReport {
    pub run_id: Uuid,
    pub checked: usize,
    pub completed: usize,
    pub failed: usize,
    pub still_pending: usize,
    pub total_rows: u64,
    pub results: Vec<RecordResult>,
}

impl ReconcileReport {
    pub(crate) fn new(run_id: Uuid, results: Vec<RecordResult>) -> Self {
        let count = |outcome: RecordOutcome| {
            results.iter().filter(|r| r.outcome == outcome).count()
        };
        Self {
            run_id,
            checked: results.len(),
            completed: count(RecordOutcome::Completed),
            failed: count(RecordOutcome::Failed),
            still_pending: count(RecordOutcome::StillPending),
            total_rows: results.iter().filter_map(|r| r.row_count).sum(),
            results,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FetchResult {
    pub computation: Computation,
    pub query_id: i64,
    pub execution_id: Option<String>,
    pub success: bool,
    pub row_count: Option<u64>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FetchReport {
    pub run_id: Uuid,
    pub target_date: NaiveDate,
    pub succeeded: usize,
    pub failed: usize,
    pub total_rows: u64,
    pub results: Vec<FetchResult>,
}

impl FetchReport {
    pub(crate) fn new(run_id: Uuid, target_date: NaiveDate, results: Vec<FetchResult>) -> Self {
        let succeeded = results.iter().filter(|r| r.success).count();
        Self {
            run_id,
            target_date,
            succeeded,
            failed: results.len() - succeeded,
            total_rows: results.iter().filter_map(|r| r.row_count).sum(),
            results,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportedFile {
    pub path: String,
    /// `None` when the file was missing and skipped.
    pub rows_affected: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportReport {
    pub run_id: Uuid,
    pub computation: Computation,
    pub files: Vec<ImportedFile>,
    pub total_rows: u64,
}

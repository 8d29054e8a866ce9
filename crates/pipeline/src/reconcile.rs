//! Advance outstanding ledger records without ever waiting on the remote side.

use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use analyst_common::{Computation, Error, ExecutionRecord, ExecutionStatus, Result};
use analyst_dune::ExecutionState;

use crate::context::PipelineContext;
use crate::report::{ReconcileReport, RecordOutcome, RecordResult};

/// Reason recorded for a PENDING record that never obtained a remote id.
pub const NEVER_SUBMITTED: &str = "No remote execution id was recorded";

/// Polls every PENDING/EXECUTING record once, oldest first.
///
/// Completed executions are fetched, merged and marked COMPLETED; failed or
/// cancelled ones are marked FAILED; running ones are left untouched for the
/// next invocation. Any error while handling a record marks that record FAILED
/// and processing moves on.
#[instrument(skip_all, fields(run_id = tracing::field::Empty))]
pub async fn run_reconcile(ctx: &PipelineContext) -> Result<ReconcileReport> {
    let run_id = Uuid::new_v4();
    tracing::Span::current().record("run_id", tracing::field::display(run_id));

    let outstanding = ctx.ledger.list_outstanding().await?;
    info!(count = outstanding.len(), "outstanding executions");

    let mut results = Vec::with_capacity(outstanding.len());
    for record in &outstanding {
        results.push(reconcile_record(ctx, record).await);
    }

    let report = ReconcileReport::new(run_id, results);
    info!(
        checked = report.checked,
        completed = report.completed,
        failed = report.failed,
        still_pending = report.still_pending,
        total_rows = report.total_rows,
        "reconcile finished"
    );
    Ok(report)
}

async fn reconcile_record(ctx: &PipelineContext, record: &ExecutionRecord) -> RecordResult {
    let mut result = RecordResult {
        record_id: record.id,
        query_id: record.query_id,
        query_name: record.query_name.clone(),
        execution_id: record.remote_execution_id.clone(),
        outcome: RecordOutcome::Failed,
        row_count: None,
        error: None,
    };

    let Some(execution_id) = record.remote_execution_id.as_deref() else {
        warn!(
            record_id = record.id,
            query_id = record.query_id,
            "outstanding record has no remote id"
        );
        if let Some(record_id) = record.id {
            if let Err(e) = ctx.ledger.abandon(record_id, NEVER_SUBMITTED).await {
                error!(record_id, error = %e, "failed to abandon record");
            }
        }
        result.error = Some(NEVER_SUBMITTED.to_string());
        return result;
    };

    match advance(ctx, record, execution_id).await {
        Ok(Advanced::Running) => {
            info!(execution_id, "still executing, will check again later");
            result.outcome = RecordOutcome::StillPending;
        }
        Ok(Advanced::Completed(rows)) => {
            result.outcome = RecordOutcome::Completed;
            result.row_count = Some(rows);
        }
        Ok(Advanced::Failed(reason)) => {
            result.error = Some(reason);
        }
        Err(e) => {
            let reason = e.to_string();
            warn!(execution_id, error = %reason, "reconciling execution failed");
            if let Err(e) = ctx.ledger.mark_failed(execution_id, &reason).await {
                error!(execution_id, error = %e, "failed to record failure");
            }
            result.error = Some(reason);
        }
    }
    result
}

enum Advanced {
    Running,
    Completed(u64),
    Failed(String),
}

async fn advance(
    ctx: &PipelineContext,
    record: &ExecutionRecord,
    execution_id: &str,
) -> Result<Advanced> {
    let status = ctx.client.poll_status(execution_id).await?;

    // A record only leaves PENDING once the remote side has started it.
    if record.status == ExecutionStatus::Pending && status.state != ExecutionState::Pending {
        ctx.ledger.mark_executing(execution_id).await?;
    }

    match status.state {
        ExecutionState::Pending | ExecutionState::Executing => Ok(Advanced::Running),
        ExecutionState::Failed | ExecutionState::Cancelled => {
            let reason = if status.state == ExecutionState::Cancelled {
                "Query was cancelled"
            } else {
                "Query failed"
            };
            warn!(execution_id, state = status.state.as_str(), "remote execution failed");
            ctx.ledger.mark_failed(execution_id, reason).await?;
            Ok(Advanced::Failed(reason.to_string()))
        }
        ExecutionState::Completed => {
            let computation = Computation::from_query_id(record.query_id).ok_or_else(|| {
                Error::InvalidData(format!("no merge target for query id {}", record.query_id))
            })?;
            let results = ctx.client.fetch_results(execution_id).await?;
            let affected = ctx.merger.merge(computation, &results.rows).await?;
            let row_count = results.rows.len() as u64;
            if !ctx.ledger.mark_completed(execution_id, row_count).await? {
                warn!(execution_id, "record was no longer executing, completion not recorded");
            }
            info!(
                execution_id,
                row_count,
                affected,
                table = computation.table_name(),
                "execution completed"
            );
            Ok(Advanced::Completed(row_count))
        }
    }
}

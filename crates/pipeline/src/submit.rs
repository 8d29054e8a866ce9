//! Fire-and-forget daily submission.

use chrono::NaiveDate;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use analyst_common::{Computation, ExecutionRecord, ExecutionStatus, Result};

use crate::context::PipelineContext;
use crate::params::{previous_utc_date, query_parameters};
use crate::report::{SubmitOutcome, SubmitReport, SubmitResult};

/// Submits every computation for `target_date` (default: previous UTC day)
/// and records each accepted execution as EXECUTING.
///
/// Submissions are sequential with the configured delay between remote calls.
/// A failing computation is reported and never stops the rest; only a
/// configuration error aborts the run.
#[instrument(skip_all, fields(run_id = tracing::field::Empty))]
pub async fn run_submit(
    ctx: &PipelineContext,
    target_date: Option<NaiveDate>,
) -> Result<SubmitReport> {
    let run_id = Uuid::new_v4();
    tracing::Span::current().record("run_id", tracing::field::display(run_id));
    let target_date = target_date.unwrap_or_else(|| previous_utc_date(ctx.clock.as_ref()));
    info!(%target_date, "submitting queries");

    let mut results = Vec::with_capacity(Computation::ALL.len());
    let mut submitted_before = false;

    for computation in Computation::ALL {
        if ctx.settings.skip_outstanding {
            match ctx
                .ledger
                .find_outstanding(computation.query_id(), target_date)
                .await
            {
                Ok(Some(existing)) => {
                    info!(
                        query_id = computation.query_id(),
                        execution_id = existing.remote_execution_id.as_deref().unwrap_or(""),
                        "execution already outstanding, skipping"
                    );
                    results.push(SubmitResult {
                        computation,
                        query_id: computation.query_id(),
                        outcome: SubmitOutcome::Skipped,
                        execution_id: existing.remote_execution_id,
                        record_id: existing.id,
                        error: None,
                    });
                    continue;
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(query_id = computation.query_id(), error = %e, "ledger lookup failed");
                    results.push(SubmitResult {
                        computation,
                        query_id: computation.query_id(),
                        outcome: SubmitOutcome::Failed,
                        execution_id: None,
                        record_id: None,
                        error: Some(e.to_string()),
                    });
                    continue;
                }
            }
        }

        if submitted_before {
            ctx.clock.sleep(ctx.settings.submission_delay()).await;
        }
        submitted_before = true;

        results.push(submit_one(ctx, computation, target_date).await?);
    }

    let report = SubmitReport::new(run_id, target_date, results);
    info!(
        submitted = report.submitted,
        failed = report.failed,
        skipped = report.skipped,
        "submit finished"
    );
    Ok(report)
}

async fn submit_one(
    ctx: &PipelineContext,
    computation: Computation,
    target_date: NaiveDate,
) -> Result<SubmitResult> {
    let query_id = computation.query_id();
    let mut result = SubmitResult {
        computation,
        query_id,
        outcome: SubmitOutcome::Failed,
        execution_id: None,
        record_id: None,
        error: None,
    };

    let started_at = ctx.clock.utc_now();
    let execution_id = match ctx.client.submit(query_id, &query_parameters(target_date)).await {
        Ok(id) => id,
        Err(e) if e.is_fatal() => return Err(e),
        Err(e) => {
            warn!(query_id, error = %e, "submission failed");
            result.error = Some(e.to_string());
            return Ok(result);
        }
    };
    result.execution_id = Some(execution_id.clone());

    let record = ExecutionRecord::new(
        computation,
        target_date,
        ExecutionStatus::Executing,
        Some(execution_id.clone()),
        started_at,
    );
    match ctx.ledger.create(&record).await {
        Ok(record_id) => {
            info!(query_id, %execution_id, record_id, "execution recorded");
            result.outcome = SubmitOutcome::Submitted;
            result.record_id = Some(record_id);
        }
        Err(e) => {
            warn!(query_id, %execution_id, error = %e, "submitted but could not record execution");
            result.error = Some(e.to_string());
        }
    }
    Ok(result)
}

//! Synchronous submit-wait-merge, used for manual runs and backfills.

use chrono::NaiveDate;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use analyst_common::{Computation, ExecutionRecord, ExecutionStatus, Result};

use crate::context::PipelineContext;
use crate::params::{current_utc_date, query_parameters};
use crate::report::{FetchReport, FetchResult};

/// Runs every computation for `target_date` (default: current UTC day),
/// waiting on each execution before moving to the next.
#[instrument(skip_all, fields(run_id = tracing::field::Empty))]
pub async fn run_fetch(
    ctx: &PipelineContext,
    target_date: Option<NaiveDate>,
) -> Result<FetchReport> {
    let run_id = Uuid::new_v4();
    tracing::Span::current().record("run_id", tracing::field::display(run_id));
    let target_date = target_date.unwrap_or_else(|| current_utc_date(ctx.clock.as_ref()));
    info!(%target_date, "fetching queries synchronously");

    fetch_many(ctx, run_id, &Computation::ALL, target_date).await
}

/// Runs a single computation with an explicit start date, e.g. to load the
/// full price history from its first day.
#[instrument(skip_all, fields(run_id = tracing::field::Empty, computation = %computation))]
pub async fn run_backfill(
    ctx: &PipelineContext,
    computation: Computation,
    start_date: NaiveDate,
) -> Result<FetchReport> {
    let run_id = Uuid::new_v4();
    tracing::Span::current().record("run_id", tracing::field::display(run_id));
    info!(%start_date, "backfilling");

    fetch_many(ctx, run_id, &[computation], start_date).await
}

async fn fetch_many(
    ctx: &PipelineContext,
    run_id: Uuid,
    computations: &[Computation],
    target_date: NaiveDate,
) -> Result<FetchReport> {
    let mut results = Vec::with_capacity(computations.len());
    for (i, computation) in computations.iter().enumerate() {
        if i > 0 {
            ctx.clock.sleep(ctx.settings.submission_delay()).await;
        }
        results.push(fetch_one(ctx, *computation, target_date).await?);
    }

    let report = FetchReport::new(run_id, target_date, results);
    info!(
        succeeded = report.succeeded,
        failed = report.failed,
        total_rows = report.total_rows,
        "fetch finished"
    );
    Ok(report)
}

async fn fetch_one(
    ctx: &PipelineContext,
    computation: Computation,
    target_date: NaiveDate,
) -> Result<FetchResult> {
    let query_id = computation.query_id();
    let mut result = FetchResult {
        computation,
        query_id,
        execution_id: None,
        success: false,
        row_count: None,
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
        ExecutionStatus::Pending,
        Some(execution_id.clone()),
        started_at,
    );
    if let Err(e) = ctx.ledger.create(&record).await {
        warn!(query_id, %execution_id, error = %e, "could not record execution");
        result.error = Some(e.to_string());
        return Ok(result);
    }

    let outcome = match wait_and_merge(ctx, computation, &execution_id).await {
        Ok(outcome) => outcome,
        Err(e) => Err(e.to_string()),
    };
    match outcome {
        Ok(rows) => {
            result.success = true;
            result.row_count = Some(rows);
        }
        Err(reason) => {
            warn!(query_id, %execution_id, error = %reason, "fetch failed");
            if let Err(e) = ctx.ledger.mark_failed(&execution_id, &reason).await {
                error!(%execution_id, error = %e, "failed to record failure");
            }
            result.error = Some(reason);
        }
    }
    Ok(result)
}

/// Outer error: something broke. Inner error: the execution did not complete.
async fn wait_and_merge(
    ctx: &PipelineContext,
    computation: Computation,
    execution_id: &str,
) -> Result<std::result::Result<u64, String>> {
    ctx.ledger.mark_executing(execution_id).await?;

    let outcome = ctx
        .client
        .wait_for_terminal(
            execution_id,
            ctx.settings.wait_timeout(),
            ctx.settings.poll_interval(),
        )
        .await?;
    if let Some(reason) = outcome.failure_reason() {
        return Ok(Err(reason));
    }

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
    Ok(Ok(row_count))
}

use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use analyst_common::{Error, SystemClock};
use analyst_dune::RemoteQueryClient;
use analyst_pipeline::{
    run_backfill, run_fetch, run_import, run_reconcile, run_submit, PipelineContext,
};
use analyst_store::{ExecutionLedger, HistoryQuery, HistoryReader, ResultMerger, SqliteDb};

use crate::cli::Commands;
use crate::config::Settings;
use crate::error::AppError;

pub async fn execute(command: Commands, settings: &Settings) -> Result<(), AppError> {
    match command {
        Commands::Submit { date } => {
            let ctx = remote_context(settings).await?;
            let report = run_submit(&ctx, date).await;
            finish(ctx, report).await
        }
        Commands::Reconcile => {
            let ctx = remote_context(settings).await?;
            let report = run_reconcile(&ctx).await;
            finish(ctx, report).await
        }
        Commands::Fetch { date } => {
            let ctx = remote_context(settings).await?;
            let report = run_fetch(&ctx, date).await;
            finish(ctx, report).await
        }
        Commands::Backfill { query, from } => {
            let ctx = remote_context(settings).await?;
            let report = run_backfill(&ctx, query, from).await;
            finish(ctx, report).await
        }
        Commands::Import { query, files } => {
            let db = open_db(settings).await?;
            let merger = ResultMerger::new(db.clone(), Arc::new(SystemClock));
            let report = run_import(&merger, query, &files).await;
            drop(merger);
            db.close().await?;
            print_json(&report?)
        }
        Commands::History {
            query,
            from,
            to,
            limit,
            offset,
        } => {
            let db = open_db(settings).await?;
            let page = HistoryReader::new(db)
                .read(query, &HistoryQuery { from, to, limit, offset })
                .await?;
            print_json(&page)
        }
        Commands::Executions {
            outstanding,
            id,
            limit,
            abandon,
        } => {
            let db = open_db(settings).await?;
            let ledger = ExecutionLedger::new(db, Arc::new(SystemClock));
            match id {
                Some(id) => {
                    if abandon && ledger.abandon(id, "Abandoned manually").await? {
                        info!(record_id = id, "record abandoned");
                    }
                    print_json(&ledger.get(id).await?)
                }
                None if outstanding => print_json(&ledger.list_outstanding().await?),
                None => print_json(&ledger.list_recent(limit).await?),
            }
        }
    }
}

async fn open_db(settings: &Settings) -> Result<SqliteDb, AppError> {
    Ok(SqliteDb::open(&settings.database_path).await?)
}

/// Builds the client first so a missing API key fails before any storage work.
async fn remote_context(settings: &Settings) -> Result<PipelineContext, AppError> {
    let client = RemoteQueryClient::from_settings(&settings.dune)?;
    let db = open_db(settings).await?;
    Ok(PipelineContext::new(client, db, settings.pipeline.clone()))
}

async fn finish<T: Serialize>(
    ctx: PipelineContext,
    report: Result<T, Error>,
) -> Result<(), AppError> {
    let closed = ctx.close().await;
    let report = report?;
    closed?;
    print_json(&report)
}

fn print_json<T: Serialize>(value: &T) -> Result<(), AppError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

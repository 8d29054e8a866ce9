mod common;

use std::time::Duration;

use analyst_common::{Clock, Computation, ExecutionRecord, ExecutionStatus};
use analyst_dune::{ApiResponse, Method};
use analyst_pipeline::reconcile::NEVER_SUBMITTED;
use analyst_pipeline::{run_reconcile, run_submit, RecordOutcome, SubmitOutcome};
use serde_json::json;

use common::*;

#[tokio::test]
async fn test_submit_records_every_computation_as_executing() {
    let h = harness().await;
    accept_all(&h.transport);

    let report = run_submit(&h.ctx, None).await.unwrap();

    assert_eq!(report.target_date, date(2024, 1, 1));
    assert_eq!((report.submitted, report.failed, report.skipped), (5, 0, 0));
    let outstanding = h.ctx.ledger.list_outstanding().await.unwrap();
    assert_eq!(outstanding.len(), 5);
    for (record, computation) in outstanding.iter().zip(Computation::ALL) {
        assert_eq!(record.query_id, computation.query_id());
        assert_eq!(record.remote_execution_id, Some(remote_id(computation)));
        assert_eq!(record.status, ExecutionStatus::Executing);
        assert_eq!(record.target_date, date(2024, 1, 1));
    }

    // One pause between consecutive submissions, none after the last.
    assert_eq!(h.clock.sleeps(), vec![Duration::from_secs(1); 4]);
    let first = &h.transport.requests()[0];
    assert_eq!(first.path, "/query/5963629/execute");
    assert_eq!(first.body, Some(json!({"query_parameters": {"p_date": "2024-01-01"}})));
}

#[tokio::test]
async fn test_submit_failure_does_not_stop_other_computations() {
    let h = harness().await;
    for computation in Computation::ALL {
        if computation != Computation::Borrow {
            h.transport
                .accept_execution(computation.query_id(), &remote_id(computation));
        }
    }
    h.transport.set_default(
        Method::Post,
        "/query/5963670/execute",
        Ok(ApiResponse::error(500, "internal error")),
    );

    let report = run_submit(&h.ctx, Some(date(2024, 1, 1))).await.unwrap();

    assert_eq!((report.submitted, report.failed), (4, 1));
    let borrow = &report.results[1];
    assert_eq!(borrow.computation, Computation::Borrow);
    assert_eq!(borrow.outcome, SubmitOutcome::Failed);
    assert!(borrow.error.as_deref().unwrap().contains("HTTP 500"));
    assert!(borrow.record_id.is_none());
    assert_eq!(h.transport.calls(Method::Post, "/query/5963670/execute"), 4);
    assert_eq!(h.ctx.ledger.list_outstanding().await.unwrap().len(), 4);
}

#[tokio::test]
async fn test_submit_skips_outstanding_duplicates() {
    let h = harness().await;
    accept_all(&h.transport);
    run_submit(&h.ctx, None).await.unwrap();

    let again = run_submit(&h.ctx, None).await.unwrap();

    assert_eq!((again.submitted, again.skipped), (0, 5));
    assert_eq!(again.results[0].execution_id.as_deref(), Some("E1"));
    assert_eq!(h.transport.calls(Method::Post, "/query/5963629/execute"), 1);
    assert_eq!(h.ctx.ledger.list_recent(50).await.unwrap().len(), 5);
}

#[tokio::test]
async fn test_reconcile_completes_and_merges() {
    let h = harness().await;
    accept_all(&h.transport);
    run_submit(&h.ctx, None).await.unwrap();

    h.transport.report_state("E1", "QUERY_STATE_COMPLETED");
    h.transport.serve_rows("E1", collateral_rows());
    for id in ["E2", "E3", "E4", "E5"] {
        h.transport.report_state(id, "QUERY_STATE_EXECUTING");
    }

    let report = run_reconcile(&h.ctx).await.unwrap();

    assert_eq!(report.checked, 5);
    assert_eq!(report.completed, 1);
    assert_eq!(report.still_pending, 4);
    assert_eq!(report.total_rows, 3);

    let collateral = record(&h, Computation::Collateral).await;
    assert_eq!(collateral.status, ExecutionStatus::Completed);
    assert_eq!(collateral.row_count, Some(3));
    assert!(collateral.completed_at.is_some());
    assert_eq!(stored_rows(&h, Computation::Collateral).await, 3);

    let outstanding = h.ctx.ledger.list_outstanding().await.unwrap();
    assert_eq!(outstanding.len(), 4);
    assert!(outstanding.iter().all(|r| r.remote_execution_id.as_deref() != Some("E1")));
}

#[tokio::test]
async fn test_reconcile_leaves_running_executions_untouched() {
    let h = harness().await;
    accept_all(&h.transport);
    run_submit(&h.ctx, None).await.unwrap();
    let before = record(&h, Computation::Earn).await;
    for computation in Computation::ALL {
        h.transport
            .report_state(&remote_id(computation), "QUERY_STATE_EXECUTING");
    }

    let report = run_reconcile(&h.ctx).await.unwrap();

    assert_eq!(report.still_pending, 5);
    assert_eq!(record(&h, Computation::Earn).await, before);
    assert_eq!(h.transport.calls(Method::Get, "/execution/E4/results"), 0);
}

#[tokio::test]
async fn test_reconcile_records_remote_failure_and_cancellation() {
    let h = harness().await;
    accept_all(&h.transport);
    run_submit(&h.ctx, None).await.unwrap();
    h.transport.report_state("E1", "QUERY_STATE_FAILED");
    h.transport.report_state("E2", "QUERY_STATE_CANCELLED");
    for id in ["E3", "E4", "E5"] {
        h.transport.report_state(id, "QUERY_STATE_PENDING");
    }

    let report = run_reconcile(&h.ctx).await.unwrap();

    assert_eq!(report.failed, 2);
    let collateral = record(&h, Computation::Collateral).await;
    assert_eq!(collateral.status, ExecutionStatus::Failed);
    assert_eq!(collateral.error_message.as_deref(), Some("Query failed"));
    let borrow = record(&h, Computation::Borrow).await;
    assert_eq!(borrow.error_message.as_deref(), Some("Query was cancelled"));
    assert_eq!(stored_rows(&h, Computation::Collateral).await, 0);
    assert_eq!(h.transport.calls(Method::Get, "/execution/E1/results"), 0);
}

#[tokio::test]
async fn test_reconcile_per_record_errors_mark_failed_and_continue() {
    let h = harness().await;
    accept_all(&h.transport);
    run_submit(&h.ctx, None).await.unwrap();

    // E1 completes with a row the merger rejects.
    h.transport.report_state("E1", "QUERY_STATE_COMPLETED");
    h.transport.serve_rows(
        "E1",
        json!([{
            "day": "2024-01-01", "collateral_token": "0xa",
            "collateral_symbol": "WETH", "collateral_amount": "lots"
        }]),
    );
    // E2's status endpoint keeps failing through every retry.
    h.transport.set_default(
        Method::Get,
        "/execution/E2/status",
        Ok(ApiResponse::error(503, "unavailable")),
    );
    // E3 completes normally.
    h.transport.report_state("E3", "QUERY_STATE_COMPLETED");
    h.transport.serve_rows(
        "E3",
        json!([{
            "date": "2024-01-01", "blockchain": "worldchain",
            "chain_volume_wld": 10, "chain_volume_usd": 22, "chain_num_swaps": 3,
            "total_volume_wld": 10, "total_volume_usd": 22, "total_num_swaps": 3
        }]),
    );
    for id in ["E4", "E5"] {
        h.transport.report_state(id, "QUERY_STATE_EXECUTING");
    }

    let report = run_reconcile(&h.ctx).await.unwrap();

    assert_eq!((report.completed, report.failed, report.still_pending), (1, 2, 2));
    let collateral = record(&h, Computation::Collateral).await;
    assert_eq!(collateral.status, ExecutionStatus::Failed);
    assert!(collateral.error_message.unwrap().contains("collateral_amount"));
    let borrow = record(&h, Computation::Borrow).await;
    assert_eq!(borrow.status, ExecutionStatus::Failed);
    assert!(borrow.error_message.unwrap().contains("HTTP 503"));
    assert_eq!(record(&h, Computation::DexVolume).await.status, ExecutionStatus::Completed);
    assert_eq!(report.results[0].outcome, RecordOutcome::Failed);
}

#[tokio::test]
async fn test_reconcile_with_nothing_outstanding() {
    let h = harness().await;
    let report = run_reconcile(&h.ctx).await.unwrap();
    assert_eq!(report.checked, 0);
    assert!(h.transport.requests().is_empty());
}

#[tokio::test]
async fn test_reconcile_pending_records() {
    let h = harness().await;
    let started = h.clock.utc_now();
    let pending = |computation, remote_id: Option<&str>| {
        ExecutionRecord::new(
            computation,
            date(2024, 1, 1),
            ExecutionStatus::Pending,
            remote_id.map(str::to_string),
            started,
        )
    };
    h.ctx
        .ledger
        .create(&pending(Computation::PriceHistory, Some("E5")))
        .await
        .unwrap();
    let orphan = h
        .ctx
        .ledger
        .create(&pending(Computation::Borrow, None))
        .await
        .unwrap();

    // Remote still queued: the record stays PENDING, the orphan is abandoned.
    h.transport.report_state("E5", "QUERY_STATE_PENDING");
    let first = run_reconcile(&h.ctx).await.unwrap();

    assert_eq!((first.checked, first.failed, first.still_pending), (2, 1, 1));
    assert_eq!(
        record(&h, Computation::PriceHistory).await.status,
        ExecutionStatus::Pending
    );
    let abandoned = h.ctx.ledger.get(orphan).await.unwrap().unwrap();
    assert_eq!(abandoned.status, ExecutionStatus::Failed);
    assert_eq!(abandoned.error_message.as_deref(), Some(NEVER_SUBMITTED));
    assert_eq!(h.transport.requests().len(), 1);

    // Remote started: PENDING moves to EXECUTING.
    h.transport.report_state("E5", "QUERY_STATE_EXECUTING");
    let second = run_reconcile(&h.ctx).await.unwrap();

    assert_eq!((second.checked, second.still_pending), (1, 1));
    assert_eq!(
        record(&h, Computation::PriceHistory).await.status,
        ExecutionStatus::Executing
    );

    h.transport.report_state("E5", "QUERY_STATE_COMPLETED");
    h.transport.serve_rows(
        "E5",
        json!([{"date": "2024-01-01", "symbol": "WLD", "close_price": 2.3}]),
    );
    let third = run_reconcile(&h.ctx).await.unwrap();

    assert_eq!((third.checked, third.completed, third.total_rows), (1, 1, 1));
    let price = record(&h, Computation::PriceHistory).await;
    assert_eq!(price.status, ExecutionStatus::Completed);
    assert_eq!(price.row_count, Some(1));
    assert_eq!(stored_rows(&h, Computation::PriceHistory).await, 1);
    assert!(h.ctx.ledger.list_outstanding().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_reconcile_pending_record_completed_remotely() {
    let h = harness().await;
    h.ctx
        .ledger
        .create(&ExecutionRecord::new(
            Computation::PriceHistory,
            date(2024, 1, 1),
            ExecutionStatus::Pending,
            Some("E5".to_string()),
            h.clock.utc_now(),
        ))
        .await
        .unwrap();
    h.transport.report_state("E5", "QUERY_STATE_COMPLETED");
    h.transport.serve_rows(
        "E5",
        json!([{"date": "2024-01-01", "symbol": "WLD", "close_price": 2.3}]),
    );

    let report = run_reconcile(&h.ctx).await.unwrap();

    assert_eq!(report.completed, 1);
    assert_eq!(
        record(&h, Computation::PriceHistory).await.status,
        ExecutionStatus::Completed
    );
}

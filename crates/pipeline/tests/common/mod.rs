#![allow(dead_code)]

use chrono::{NaiveDate, TimeZone, Utc};
use serde_json::Value;
use std::sync::Arc;

use analyst_common::{Computation, ExecutionRecord, ManualClock};
use analyst_dune::testing::ScriptedTransport;
use analyst_dune::{RemoteQueryClient, RetryPolicy};
use analyst_pipeline::{PipelineContext, PipelineSettings};
use analyst_store::{HistoryQuery, SqliteDb};

pub struct Harness {
    pub ctx: PipelineContext,
    pub transport: Arc<ScriptedTransport>,
    pub clock: Arc<ManualClock>,
}

/// 2024-01-02 06:00 UTC, so the daily submit targets 2024-01-01.
pub async fn harness() -> Harness {
    harness_with(PipelineSettings::default()).await
}

pub async fn harness_with(settings: PipelineSettings) -> Harness {
    let transport = Arc::new(ScriptedTransport::new());
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2024, 1, 2, 6, 0, 0).unwrap(),
    ));
    let client =
        RemoteQueryClient::new(transport.clone(), RetryPolicy::default(), clock.clone());
    let db = SqliteDb::open_in_memory().await.unwrap();
    Harness {
        ctx: PipelineContext::new(client, db, settings),
        transport,
        clock,
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Remote execution id handed out for each computation, in submission order.
pub fn remote_id(computation: Computation) -> String {
    let index = Computation::ALL.iter().position(|c| *c == computation).unwrap();
    format!("E{}", index + 1)
}

pub fn accept_all(transport: &ScriptedTransport) {
    for computation in Computation::ALL {
        transport.accept_execution(computation.query_id(), &remote_id(computation));
    }
}

pub fn collateral_rows() -> Value {
    serde_json::json!([
        {
            "day": "2024-01-01 00:00:00.000 UTC",
            "collateral_token": "0xa",
            "collateral_symbol": "WETH",
            "collateral_amount": 10.0,
            "collateral_amount_usd": 24000.0
        },
        {
            "day": "2024-01-01 00:00:00.000 UTC",
            "collateral_token": "0xb",
            "collateral_symbol": "WBTC",
            "collateral_amount": "0.5",
            "collateral_amount_usd": null
        },
        {
            "day": "2024-01-01 00:00:00.000 UTC",
            "collateral_token": "0xc",
            "collateral_symbol": "WLD",
            "collateral_amount": 1200,
            "collateral_amount_usd": 2640.0
        },
    ])
}

pub async fn record(h: &Harness, computation: Computation) -> ExecutionRecord {
    h.ctx
        .ledger
        .find_by_remote_id(&remote_id(computation))
        .await
        .unwrap()
        .unwrap()
}

pub async fn stored_rows(h: &Harness, computation: Computation) -> u64 {
    h.ctx
        .history
        .read(computation, &HistoryQuery::default())
        .await
        .unwrap()
        .total
}

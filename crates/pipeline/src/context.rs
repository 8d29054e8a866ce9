use std::sync::Arc;

use analyst_common::{Clock, Result};
use analyst_dune::RemoteQueryClient;
use analyst_store::{ExecutionLedger, HistoryReader, ResultMerger, SqliteDb};

use crate::settings::PipelineSettings;

/// Everything one process invocation needs, built once and passed by reference.
pub struct PipelineContext {
    pub client: Arc<RemoteQueryClient>,
    pub ledger: ExecutionLedger,
    pub merger: ResultMerger,
    pub history: HistoryReader,
    pub clock: Arc<dyn Clock>,
    pub settings: PipelineSettings,
    db: SqliteDb,
}

impl PipelineContext {
    /// Wires the storage components to `db`. The client's clock drives every
    /// timestamp and sleep so tests can substitute a manual clock once.
    pub fn new(client: RemoteQueryClient, db: SqliteDb, settings: PipelineSettings) -> Self {
        let clock = client.clock();
        Self {
            client: Arc::new(client),
            ledger: ExecutionLedger::new(db.clone(), Arc::clone(&clock)),
            merger: ResultMerger::new(db.clone(), Arc::clone(&clock)),
            history: HistoryReader::new(db.clone()),
            clock,
            settings,
            db,
        }
    }

    /// Releases the storage handle.
    pub async fn close(self) -> Result<()> {
        let PipelineContext {
            client,
            ledger,
            merger,
            history,
            clock,
            settings: _,
            db,
        } = self;
        drop((client, ledger, merger, history, clock));
        db.close().await
    }
}

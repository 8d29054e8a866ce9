use rusqlite::params_from_iter;
use rusqlite::types::Value as SqlValue;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use analyst_common::{Clock, Computation, Error, Result};

use crate::db::{format_timestamp, persistence, SqliteDb};
use crate::entity::{EntitySpec, Row};

/// Rows per multi-row `INSERT` statement.
pub const BATCH_SIZE: usize = 1000;

/// Pre-rendered statement pieces for one entity.
#[derive(Debug, Clone)]
struct UpsertPlan {
    spec: EntitySpec,
    insert_prefix: String,
    value_group: String,
    conflict_clause: String,
}

impl UpsertPlan {
    fn new(spec: EntitySpec) -> Self {
        let columns = spec.data_columns();
        let insert_prefix = format!(
            "INSERT INTO {} ({}, created_at, updated_at) VALUES ",
            spec.table,
            columns.join(", ")
        );
        let value_group = format!("({})", vec!["?"; columns.len() + 2].join(", "));
        let updates: Vec<String> = spec
            .measures
            .iter()
            .map(|c| format!("{0} = excluded.{0}", c.name))
            .chain(std::iter::once("updated_at = excluded.updated_at".to_string()))
            .collect();
        let conflict_clause = format!(
            " ON CONFLICT ({}, {}) DO UPDATE SET {}",
            spec.date_column,
            spec.key_column,
            updates.join(", ")
        );
        Self {
            spec,
            insert_prefix,
            value_group,
            conflict_clause,
        }
    }

    fn statement(&self, rows: usize) -> String {
        let mut sql = self.insert_prefix.clone();
        sql.push_str(&vec![self.value_group.as_str(); rows].join(", "));
        sql.push_str(&self.conflict_clause);
        sql
    }
}

/// Writes remote result rows into the entity tables, upserting on each
/// entity's natural key.
#[derive(Clone)]
pub struct ResultMerger {
    db: SqliteDb,
    clock: Arc<dyn Clock>,
    plans: Arc<HashMap<Computation, UpsertPlan>>,
}

impl ResultMerger {
    pub fn new(db: SqliteDb, clock: Arc<dyn Clock>) -> Self {
        let plans = Computation::ALL
            .into_iter()
            .map(|c| (c, UpsertPlan::new(EntitySpec::for_computation(c))))
            .collect();
        Self {
            db,
            clock,
            plans: Arc::new(plans),
        }
    }

    /// Upserts `rows` and returns the number of rows inserted or updated.
    ///
    /// All batches run in one transaction: a malformed row or storage failure
    /// leaves the table untouched. Merging the same rows twice reports the same
    /// count both times.
    #[instrument(skip(self, rows), fields(computation = %computation, rows = rows.len()))]
    pub async fn merge(&self, computation: Computation, rows: &[Row]) -> Result<u64> {
        if rows.is_empty() {
            debug!("nothing to merge");
            return Ok(0);
        }
        let plan = self
            .plans
            .get(&computation)
            .cloned()
            .ok_or_else(|| Error::InvalidData(format!("no upsert plan for {computation}")))?;

        let decoded = rows
            .iter()
            .map(|row| plan.spec.decode_row(row))
            .collect::<Result<Vec<_>>>()?;
        let now = format_timestamp(self.clock.utc_now());
        let table = plan.spec.table;

        let affected = self
            .db
            .try_with_conn(move |conn| {
                let tx = conn.transaction().map_err(persistence)?;
                let mut affected = 0u64;
                for chunk in decoded.chunks(BATCH_SIZE) {
                    let sql = plan.statement(chunk.len());
                    let values = chunk.iter().flat_map(|row| {
                        row.iter()
                            .cloned()
                            .chain([SqlValue::Text(now.clone()), SqlValue::Text(now.clone())])
                    });
                    let changed = tx
                        .execute(&sql, params_from_iter(values))
                        .map_err(persistence)?;
                    affected += changed as u64;
                }
                tx.commit().map_err(persistence)?;
                Ok(affected)
            })
            .await?;

        info!(table, affected, "rows merged");
        Ok(affected)
    }
}

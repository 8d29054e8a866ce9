use chrono::NaiveDate;
use rusqlite::types::{Value as SqlValue, ValueRef};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use analyst_common::{Computation, Result};

use crate::db::{format_date, SqliteDb};
use crate::entity::{EntitySpec, Row};

pub const DEFAULT_LIMIT: u32 = 100;
pub const MAX_LIMIT: u32 = 1000;
pub const MAX_OFFSET: u64 = 1_000_000;

/// Date-range filter and pagination for one entity table.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct HistoryQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub limit: Option<u32>,
    pub offset: Option<u64>,
}

impl HistoryQuery {
    pub fn effective_limit(&self) -> u32 {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }

    pub fn effective_offset(&self) -> u64 {
        self.offset.unwrap_or(0).min(MAX_OFFSET)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryPage {
    pub data: Vec<Row>,
    /// Matching rows before pagination.
    pub total: u64,
    pub limit: u32,
    pub offset: u64,
}

#[derive(Clone)]
pub struct HistoryReader {
    db: SqliteDb,
}

impl HistoryReader {
    pub fn new(db: SqliteDb) -> Self {
        Self { db }
    }

    /// Newest dates first, ties broken by the dimension column.
    pub async fn read(
        &self,
        computation: Computation,
        query: &HistoryQuery,
    ) -> Result<HistoryPage> {
        let spec = EntitySpec::for_computation(computation);
        let limit = query.effective_limit();
        let offset = query.effective_offset();

        let mut conditions = Vec::new();
        let mut filter = Vec::new();
        if let Some(from) = query.from {
            conditions.push(format!("{} >= ?", spec.date_column));
            filter.push(SqlValue::Text(format_date(from)));
        }
        if let Some(to) = query.to {
            conditions.push(format!("{} <= ?", spec.date_column));
            filter.push(SqlValue::Text(format_date(to)));
        }
        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        };

        let mut columns = spec.data_columns();
        columns.extend(["created_at", "updated_at"]);
        let count_sql = format!("SELECT COUNT(*) FROM {}{where_clause}", spec.table);
        let data_sql = format!(
            "SELECT {} FROM {}{where_clause} \
             ORDER BY {} DESC, {} ASC LIMIT {limit} OFFSET {offset}",
            columns.join(", "),
            spec.table,
            spec.date_column,
            spec.key_column,
        );

        let (total, data) = self
            .db
            .with_conn(move |conn| {
                let total: i64 = conn.query_row(
                    &count_sql,
                    rusqlite::params_from_iter(filter.iter()),
                    |row| row.get(0),
                )?;
                let mut stmt = conn.prepare(&data_sql)?;
                let data = stmt
                    .query_map(rusqlite::params_from_iter(filter.iter()), |row| {
                        let mut object = Map::new();
                        for (i, name) in columns.iter().enumerate() {
                            object.insert(name.to_string(), to_json(row.get_ref(i)?));
                        }
                        Ok(object)
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok((total, data))
            })
            .await?;

        Ok(HistoryPage {
            data,
            total: u64::try_from(total).unwrap_or_default(),
            limit,
            offset,
        })
    }
}

fn to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(_) => Value::Null,
    }
}

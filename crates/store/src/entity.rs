//! Column mapping for each time-series table.

use chrono::NaiveDate;
use rusqlite::types::Value as SqlValue;
use serde_json::{Map, Value};

use analyst_common::{Computation, Error, Result};

pub type Row = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Text,
    Real,
    Integer,
}

impl ColumnKind {
    fn sql_type(self) -> &'static str {
        match self {
            ColumnKind::Text => "TEXT",
            ColumnKind::Real => "REAL",
            ColumnKind::Integer => "INTEGER",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub kind: ColumnKind,
    pub nullable: bool,
}

const fn text(name: &'static str) -> Column {
    Column {
        name,
        kind: ColumnKind::Text,
        nullable: false,
    }
}

const fn real(name: &'static str) -> Column {
    Column {
        name,
        kind: ColumnKind::Real,
        nullable: false,
    }
}

const fn real_opt(name: &'static str) -> Column {
    Column {
        name,
        kind: ColumnKind::Real,
        nullable: true,
    }
}

const fn integer(name: &'static str) -> Column {
    Column {
        name,
        kind: ColumnKind::Integer,
        nullable: false,
    }
}

/// Table layout of one computation's results: a `(date, dimension)` natural
/// key plus measure columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntitySpec {
    pub computation: Computation,
    pub table: &'static str,
    pub date_column: &'static str,
    pub key_column: &'static str,
    pub measures: &'static [Column],
}

const COLLATERAL_MEASURES: &[Column] = &[
    text("collateral_symbol"),
    real("collateral_amount"),
    real_opt("collateral_amount_usd"),
];

const BORROW_MEASURES: &[Column] = &[
    text("loan_symbol"),
    real("borrow_amount"),
    real_opt("borrow_amount_usd"),
];

const DEX_VOLUME_MEASURES: &[Column] = &[
    real("chain_volume_wld"),
    real("chain_volume_usd"),
    integer("chain_num_swaps"),
    real("total_volume_wld"),
    real("total_volume_usd"),
    integer("total_num_swaps"),
];

const EARN_MEASURES: &[Column] = &[
    text("vault_symbol"),
    text("vault_asset"),
    text("vault_asset_symbol"),
    real("conversion_rate"),
    real("delta_assets"),
    real("delta_shares"),
    real("total_shares"),
    real_opt("tvl_usd"),
];

const PRICE_MEASURES: &[Column] = &[real("close_price")];

impl EntitySpec {
    pub fn for_computation(computation: Computation) -> Self {
        let (date_column, key_column, measures) = match computation {
            Computation::Collateral => ("day", "collateral_token", COLLATERAL_MEASURES),
            Computation::Borrow => ("day", "loan_token", BORROW_MEASURES),
            Computation::DexVolume => ("date", "blockchain", DEX_VOLUME_MEASURES),
            Computation::Earn => ("day", "vault_address", EARN_MEASURES),
            Computation::PriceHistory => ("date", "symbol", PRICE_MEASURES),
        };
        Self {
            computation,
            table: computation.table_name(),
            date_column,
            key_column,
            measures,
        }
    }

    /// Natural key followed by measures, in insert order.
    pub fn data_columns(&self) -> Vec<&'static str> {
        let mut columns = vec![self.date_column, self.key_column];
        columns.extend(self.measures.iter().map(|c| c.name));
        columns
    }

    pub fn create_table_sql(&self) -> String {
        let mut sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    {} TEXT NOT NULL,\n    {} TEXT NOT NULL,\n",
            self.table, self.date_column, self.key_column
        );
        for column in self.measures {
            sql.push_str(&format!(
                "    {} {}{},\n",
                column.name,
                column.kind.sql_type(),
                if column.nullable { "" } else { " NOT NULL" }
            ));
        }
        sql.push_str(&format!(
            concat!(
                "    created_at TEXT NOT NULL,\n",
                "    updated_at TEXT NOT NULL,\n",
                "    UNIQUE ({}, {})\n",
                ");\n",
            ),
            self.date_column,
            self.key_column
        ));
        sql
    }

    /// Converts one remote row into SQL values ordered like [`EntitySpec::data_columns`].
    pub fn decode_row(&self, row: &Row) -> Result<Vec<SqlValue>> {
        let mut values = Vec::with_capacity(2 + self.measures.len());
        values.push(SqlValue::Text(self.decode_date(row)?));
        values.push(SqlValue::Text(self.decode_key(row)?));
        for column in self.measures {
            values.push(self.decode_measure(row, column)?);
        }
        Ok(values)
    }

    fn decode_date(&self, row: &Row) -> Result<String> {
        let raw = match row.get(self.date_column) {
            Some(Value::String(s)) => s.trim(),
            other => return Err(self.invalid(self.date_column, other)),
        };
        // Accepts plain dates and timestamps like "2024-01-01 00:00:00.000 UTC".
        let day = raw.get(..10).unwrap_or(raw);
        NaiveDate::parse_from_str(day, "%Y-%m-%d")
            .map(|d| d.format("%Y-%m-%d").to_string())
            .map_err(|_| self.invalid(self.date_column, row.get(self.date_column)))
    }

    fn decode_key(&self, row: &Row) -> Result<String> {
        match row.get(self.key_column) {
            Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.clone()),
            other => Err(self.invalid(self.key_column, other)),
        }
    }

    fn decode_measure(&self, row: &Row, column: &Column) -> Result<SqlValue> {
        let value = row.get(column.name).unwrap_or(&Value::Null);
        if value.is_null() {
            return if column.nullable {
                Ok(SqlValue::Null)
            } else {
                Err(self.invalid(column.name, row.get(column.name)))
            };
        }
        let decoded = match column.kind {
            ColumnKind::Text => match value {
                Value::String(s) => Some(SqlValue::Text(s.clone())),
                Value::Number(n) => Some(SqlValue::Text(n.to_string())),
                _ => None,
            },
            ColumnKind::Real => match value {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.trim().parse::<f64>().ok(),
                _ => None,
            }
            .filter(|f| f.is_finite())
            .map(SqlValue::Real),
            ColumnKind::Integer => match value {
                Value::Number(n) => n
                    .as_i64()
                    .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
                Value::String(s) => s.trim().parse::<i64>().ok(),
                _ => None,
            }
            .map(SqlValue::Integer),
        };
        decoded.ok_or_else(|| self.invalid(column.name, Some(value)))
    }

    fn invalid(&self, column: &str, value: Option<&Value>) -> Error {
        match value {
            Some(v) => Error::InvalidData(format!(
                "{}: invalid value for column {column}: {v}",
                self.table
            )),
            None => Error::InvalidData(format!("{}: missing column {column}", self.table)),
        }
    }
}

//! Store crate
//!
//! SQLite persistence for the analyst pipeline: the execution ledger, the
//! natural-key result merger and paginated history reads.

pub mod db;
pub mod entity;
pub mod history;
pub mod ledger;
pub mod merger;

pub use db::SqliteDb;
pub use entity::{Column, ColumnKind, EntitySpec, Row};
pub use history::{HistoryPage, HistoryQuery, HistoryReader};
pub use ledger::ExecutionLedger;
pub use merger::ResultMerger;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use analyst_common::Computation;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file; defaults to `ANALYST_CONFIG_PATH` or the bundled default.
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// SQLite database file, overriding the configured path.
    #[arg(long, global = true, env = "ANALYST_DATABASE")]
    pub database: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Submit every query for a day and record the executions.
    Submit {
        /// Target date (YYYY-MM-DD); defaults to yesterday (UTC).
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Check outstanding executions once and merge completed results.
    Reconcile,
    /// Submit, wait and merge every query inline.
    Fetch {
        /// Target date (YYYY-MM-DD); defaults to today (UTC).
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Load one query's history from a start date.
    Backfill {
        #[arg(long, default_value = "price-history")]
        query: Computation,
        #[arg(long, default_value = "2023-01-01")]
        from: NaiveDate,
    },
    /// Merge saved result files (`{"result": {"rows": [...]}}`) into a table.
    Import {
        #[arg(long)]
        query: Computation,
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Read stored rows for one query, newest first.
    History {
        #[arg(long)]
        query: Computation,
        #[arg(long)]
        from: Option<NaiveDate>,
        #[arg(long)]
        to: Option<NaiveDate>,
        #[arg(long)]
        limit: Option<u32>,
        #[arg(long)]
        offset: Option<u64>,
    },
    /// Inspect the execution ledger.
    Executions {
        /// Only PENDING and EXECUTING records.
        #[arg(long, conflicts_with = "id")]
        outstanding: bool,
        /// A single record by ledger id.
        #[arg(long)]
        id: Option<i64>,
        #[arg(long, default_value_t = 20)]
        limit: u32,
        /// Fail a PENDING record that never received a remote execution id.
        #[arg(long, requires = "id")]
        abandon: bool,
    },
}

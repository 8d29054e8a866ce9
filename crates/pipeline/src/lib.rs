//! Pipeline crate
//!
//! The three orchestration processes over one [`PipelineContext`]:
//!
//! - [`run_submit`] starts the daily executions and records them as EXECUTING.
//! - [`run_reconcile`] polls outstanding records once and merges finished results.
//! - [`run_fetch`] / [`run_backfill`] submit and wait inline.
//!
//! [`run_import`] loads previously saved result files through the same merger.

pub mod context;
pub mod fetch;
pub mod import;
pub mod params;
pub mod reconcile;
pub mod report;
pub mod settings;
pub mod submit;

pub use context::PipelineContext;
pub use fetch::{run_backfill, run_fetch};
pub use import::run_import;
pub use reconcile::run_reconcile;
pub use report::{
    FetchReport, FetchResult, ImportReport, ImportedFile, ReconcileReport, RecordOutcome,
    RecordResult, SubmitOutcome, SubmitReport, SubmitResult,
};
pub use settings::PipelineSettings;
pub use submit::run_submit;

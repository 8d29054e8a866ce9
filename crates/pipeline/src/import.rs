//! Loads saved result documents straight into the entity tables.

use serde::Deserialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use analyst_common::{Computation, Error, Result};
use analyst_dune::Row;
use analyst_store::ResultMerger;

use crate::report::{ImportReport, ImportedFile};

#[derive(Debug, Deserialize)]
struct ResultDocument {
    result: ResultRows,
}

#[derive(Debug, Deserialize)]
struct ResultRows {
    rows: Vec<Row>,
}

/// Merges each file's `result.rows` for `computation`, in order.
///
/// Missing files are skipped with a warning. An unreadable or malformed file
/// aborts the import; files merged before it stay merged.
#[instrument(skip_all, fields(run_id = tracing::field::Empty, computation = %computation))]
pub async fn run_import(
    merger: &ResultMerger,
    computation: Computation,
    paths: &[PathBuf],
) -> Result<ImportReport> {
    let run_id = Uuid::new_v4();
    tracing::Span::current().record("run_id", tracing::field::display(run_id));

    let mut files = Vec::with_capacity(paths.len());
    let mut total_rows = 0;
    for path in paths {
        let rows_affected = match read_rows(path).await? {
            Some(rows) => {
                let affected = merger.merge(computation, &rows).await?;
                info!(path = %path.display(), rows = rows.len(), affected, "file imported");
                total_rows += affected;
                Some(affected)
            }
            None => {
                warn!(path = %path.display(), "file not found, skipping");
                None
            }
        };
        files.push(ImportedFile {
            path: path.display().to_string(),
            rows_affected,
        });
    }

    info!(files = files.len(), total_rows, "import finished");
    Ok(ImportReport {
        run_id,
        computation,
        files,
        total_rows,
    })
}

async fn read_rows(path: &Path) -> Result<Option<Vec<Row>>> {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(Error::InvalidData(format!(
                "cannot read {}: {e}",
                path.display()
            )))
        }
    };
    let document: ResultDocument = serde_json::from_str(&raw)
        .map_err(|e| Error::InvalidData(format!("malformed result file {}: {e}", path.display())))?;
    Ok(Some(document.result.rows))
}

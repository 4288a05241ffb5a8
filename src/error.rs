use std::path::PathBuf;

use thiserror::Error;

/// Failures that end a run (or, for [`MigrationError::Table`], one table).
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("no backup source found under {searched:?} (expected {pattern})")]
    MissingSource { searched: PathBuf, pattern: &'static str },
    #[error("backup source {0:?} does not exist")]
    SourceNotFound(PathBuf),
    #[error("target table '{0}' does not exist or has no visible columns")]
    MissingTargetTable(String),
    #[error("table '{0}' has no policy")]
    UnknownTable(String),
    #[error("dependency cycle between tables: {0}")]
    DependencyCycle(String),
    #[error("failed to process table '{table}': {source}")]
    Table {
        table: String,
        #[source]
        source: anyhow::Error,
    },
}

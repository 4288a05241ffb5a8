use std::{fmt, path::Path};

use anyhow::{Context, Result};
use log::{info, warn};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentifierAction {
    Nulled,
    Skipped,
}

/// Non-fatal findings collected while migrating a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Warning {
    MissingSourceTable {
        table: String,
    },
    SourceFormat {
        table: String,
        message: String,
    },
    UnmappableColumn {
        table: String,
        column: String,
    },
    MappingNote {
        table: String,
        message: String,
    },
    InvalidIdentifier {
        table: String,
        key: Option<String>,
        column: String,
        value: Option<String>,
        action: IdentifierAction,
    },
    RejectedRecord {
        table: String,
        key: Option<String>,
        reason: String,
    },
    DuplicateKeyConflict {
        table: String,
        key: String,
        detail: String,
    },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::MissingSourceTable { table } => {
                write!(f, "{table}: no rows found in the backup")
            }
            Warning::SourceFormat { table, message } => write!(f, "{table}: {message}"),
            Warning::UnmappableColumn { table, column } => {
                write!(f, "{table}: source column '{column}' has no target column, dropped")
            }
            Warning::MappingNote { table, message } => write!(f, "{table}: {message}"),
            Warning::InvalidIdentifier {
                table,
                key,
                column,
                value,
                action,
            } => {
                let outcome = match action {
                    IdentifierAction::Nulled => "field nulled",
                    IdentifierAction::Skipped => "record skipped",
                };
                write!(
                    f,
                    "{table}: invalid identifier {column}={} on record {} ({outcome})",
                    value.as_deref().unwrap_or("NULL"),
                    key.as_deref().unwrap_or("?"),
                )
            }
            Warning::RejectedRecord { table, key, reason } => write!(
                f,
                "{table}: record {} rejected: {reason}",
                key.as_deref().unwrap_or("?")
            ),
            Warning::DuplicateKeyConflict { table, key, detail } => {
                write!(f, "{table}: record {key} conflicts with an existing row: {detail}")
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TableReport {
    pub table: String,
    pub inserted: usize,
    pub updated: usize,
    pub skipped: usize,
    pub warnings: Vec<Warning>,
    /// Set when the table was abandoned and its changes rolled back.
    pub failure: Option<String>,
}

impl TableReport {
    pub fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            ..Self::default()
        }
    }

    pub fn warn(&mut self, warning: Warning) {
        warn!("{warning}");
        self.warnings.push(warning);
    }

    /// Records a warning that also counts one skipped record.
    pub fn skip(&mut self, warning: Warning) {
        self.skipped += 1;
        self.warn(warning);
    }

    pub fn fail(&mut self, message: String) {
        self.inserted = 0;
        self.updated = 0;
        self.skipped = 0;
        self.failure = Some(message);
    }

    pub fn summary_line(&self) -> String {
        let line = format!(
            "{}: {} new, {} updated, {} skipped",
            self.table, self.inserted, self.updated, self.skipped
        );
        match &self.failure {
            Some(reason) => format!("{line} (failed, rolled back: {reason})"),
            None => line,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    pub dry_run: bool,
    pub tables: Vec<TableReport>,
}

impl MigrationReport {
    pub fn table(&self, name: &str) -> Option<&TableReport> {
        self.tables.iter().find(|t| t.table == name)
    }

    pub fn total_inserted(&self) -> usize {
        self.tables.iter().map(|t| t.inserted).sum()
    }

    pub fn total_updated(&self) -> usize {
        self.tables.iter().map(|t| t.updated).sum()
    }

    pub fn failed_tables(&self) -> Vec<&str> {
        self.tables
            .iter()
            .filter(|t| t.failure.is_some())
            .map(|t| t.table.as_str())
            .collect()
    }

    pub fn log_summary(&self) {
        if self.dry_run {
            info!("Dry run: no changes were written");
        }
        for table in &self.tables {
            info!("{}", table.summary_line());
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file =
            std::fs::File::create(path).with_context(|| format!("Creating report file {path:?}"))?;
        serde_json::to_writer_pretty(file, self).context("Writing migration report JSON")
    }
}

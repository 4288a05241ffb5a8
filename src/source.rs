use std::fs;

use anyhow::{Context, Result};

use crate::{
    dump,
    locator::BackupLocation,
    policy::{PolicyRegistry, TablePolicy},
    record::SourceRecord,
    snapshot::{self, Snapshots},
};

/// Rows and column order for one source table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceTable {
    pub columns: Vec<String>,
    pub records: Vec<SourceRecord>,
    pub warnings: Vec<String>,
}

/// A loaded backup, whichever form it came in.
#[derive(Debug, Clone)]
pub enum BackupData {
    Dump(String),
    Snapshots(Snapshots),
}

impl BackupData {
    pub fn load(location: &BackupLocation, registry: &PolicyRegistry) -> Result<Self> {
        match location {
            BackupLocation::Dump(path) => {
                let text = fs::read_to_string(path)
                    .with_context(|| format!("Reading dump {path:?}"))?;
                Ok(BackupData::Dump(text))
            }
            BackupLocation::SnapshotDirectory(dir) => {
                Ok(BackupData::Snapshots(snapshot::load_directory(dir, registry)?))
            }
            BackupLocation::SnapshotDocument(path) => {
                Ok(BackupData::Snapshots(snapshot::load_document(path, registry)?))
            }
        }
    }

    /// `None` when the backup has nothing for this table.
    pub fn table(&self, policy: &TablePolicy) -> Option<SourceTable> {
        match self {
            BackupData::Dump(text) => {
                let mut parsed = dump::parse_table(text, &policy.source_table);
                if parsed.is_empty() {
                    // Some dumps were taken after the tables were renamed.
                    let renamed = dump::parse_table(text, &policy.target_table);
                    if renamed.is_empty() {
                        return None;
                    }
                    parsed = renamed;
                }
                let records = parsed
                    .rows
                    .into_iter()
                    .zip(parsed.text)
                    .map(|(row, text)| {
                        let columns = parsed.columns.iter().cloned();
                        SourceRecord::from_pairs(columns.clone().zip(row)).with_text(
                            columns.zip(text).filter_map(|(column, text)| Some((column, text?))),
                        )
                    })
                    .collect();
                Some(SourceTable {
                    columns: parsed.columns,
                    records,
                    warnings: parsed.warnings,
                })
            }
            BackupData::Snapshots(snapshots) => {
                snapshots
                    .records(&policy.source_table)
                    .map(|(columns, records)| SourceTable {
                        columns,
                        records,
                        warnings: Vec::new(),
                    })
            }
        }
    }
}

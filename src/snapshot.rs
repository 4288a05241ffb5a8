//! JSON snapshot loading: one file per table, or one consolidated document
//! mapping table names to arrays of row objects.

use std::{
    collections::BTreeMap,
    fs,
    path::Path,
};

use anyhow::{Context, Result, bail};
use indexmap::IndexSet;
use log::{debug, warn};
use serde_json::{Map, Value as JsonValue};

use crate::{
    data::Value,
    policy::PolicyRegistry,
    record::SourceRecord,
};

/// Rows per source table, keyed by the policy's source table name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshots {
    tables: BTreeMap<String, Vec<Map<String, JsonValue>>>,
}

impl Snapshots {
    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    /// Columns in first-seen order plus the converted records.
    pub fn records(&self, source_table: &str) -> Option<(Vec<String>, Vec<SourceRecord>)> {
        let rows = self.tables.get(source_table)?;
        let mut columns: IndexSet<String> = IndexSet::new();
        for row in rows {
            columns.extend(row.keys().cloned());
        }
        let records = rows
            .iter()
            .map(|row| {
                SourceRecord::from_pairs(
                    row.iter()
                        .map(|(key, value)| (key.clone(), Value::from_json(value))),
                )
            })
            .collect();
        Some((columns.into_iter().collect(), records))
    }

    fn add(
        &mut self,
        registry: &PolicyRegistry,
        name: &str,
        value: JsonValue,
        origin: &str,
    ) -> Result<()> {
        let Some(policy) = registry.find(name) else {
            warn!("Ignoring snapshot '{name}' from {origin}: no table policy matches");
            return Ok(());
        };
        let rows = rows_from(value)
            .with_context(|| format!("Reading rows for '{name}' from {origin}"))?;
        debug!("{} row(s) for {} from {origin}", rows.len(), policy.source_table);
        self.tables
            .entry(policy.source_table.clone())
            .or_default()
            .extend(rows);
        Ok(())
    }
}

fn rows_from(value: JsonValue) -> Result<Vec<Map<String, JsonValue>>> {
    let JsonValue::Array(items) = value else {
        bail!("expected an array of row objects");
    };
    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| match item {
            JsonValue::Object(map) => Ok(map),
            other => bail!("row {index} is {}, not an object", json_kind(&other)),
        })
        .collect()
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "an array",
        JsonValue::Object(_) => "an object",
    }
}

fn read_json(path: &Path) -> Result<JsonValue> {
    let raw = fs::read_to_string(path).with_context(|| format!("Opening snapshot {path:?}"))?;
    serde_json::from_str(&raw).with_context(|| format!("Parsing snapshot {path:?}"))
}

/// `{ "Users": [ {...} ], "Books": [ ... ] }`
pub fn load_document(path: &Path, registry: &PolicyRegistry) -> Result<Snapshots> {
    let JsonValue::Object(tables) = read_json(path)? else {
        bail!("snapshot document {path:?} must be an object keyed by table name");
    };
    let origin = path.display().to_string();
    let mut snapshots = Snapshots::default();
    for (name, value) in tables {
        snapshots.add(registry, &name, value, &origin)?;
    }
    Ok(snapshots)
}

/// One `<table>.json` array per file; the file stem names the table.
pub fn load_directory(dir: &Path, registry: &PolicyRegistry) -> Result<Snapshots> {
    let mut paths = fs::read_dir(dir)
        .with_context(|| format!("Listing snapshot directory {dir:?}"))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
        })
        .collect::<Vec<_>>();
    paths.sort();
    let mut snapshots = Snapshots::default();
    for path in paths {
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let origin = path.display().to_string();
        snapshots.add(registry, stem, read_json(&path)?, &origin)?;
    }
    Ok(snapshots)
}

use std::collections::{BTreeMap, HashSet};

use indexmap::IndexMap;

use super::{StoreError, TargetStore};
use crate::{catalog::TableSchema, data::Value, record::TargetRow};

#[derive(Debug, Clone)]
struct MemoryTable {
    schema: TableSchema,
    key_column: String,
    unique_columns: Vec<String>,
    rows: IndexMap<String, TargetRow>,
}

impl MemoryTable {
    /// Stores values the way a text-to-column cast would.
    fn coerce(&self, row: &TargetRow) -> TargetRow {
        row.iter()
            .map(|(column, value)| {
                let stored = match self.schema.column(column) {
                    Some(info) => info.decode(info.param(value).as_deref()),
                    None => value.clone(),
                };
                (column.to_string(), stored)
            })
            .collect()
    }

    fn key_of(&self, row: &TargetRow) -> Result<String, StoreError> {
        row.get(&self.key_column)
            .and_then(Value::to_param)
            .ok_or_else(|| StoreError::Backend(format!("{} is null", self.key_column)))
    }

    fn check_unique(&self, row: &TargetRow, skip_key: Option<&str>) -> Result<(), StoreError> {
        for column in &self.unique_columns {
            let Some(candidate) = row.get(column).and_then(Value::to_param) else {
                continue;
            };
            let clash = self.rows.iter().any(|(key, stored)| {
                let held = stored.get(column).and_then(Value::to_param);
                Some(key.as_str()) != skip_key && held.as_deref() == Some(candidate.as_str())
            });
            if clash {
                return Err(StoreError::UniqueViolation(format!(
                    "Key ({column})=({candidate}) already exists."
                )));
            }
        }
        Ok(())
    }
}

/// In-memory stand-in for the live database.
///
/// Tables are registered with [`MemoryStore::with_table`]; inserts honour the
/// primary key and any declared unique columns, and each table unit of work
/// can be rolled back.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: BTreeMap<String, MemoryTable>,
    snapshot: Option<BTreeMap<String, MemoryTable>>,
    failing_tables: HashSet<String>,
    lost_at: Option<String>,
    connection_lost: bool,
    failing_rollback: bool,
    sequences: BTreeMap<String, i64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(
        mut self,
        schema: TableSchema,
        key_column: &str,
        unique_columns: &[&str],
    ) -> Self {
        self.tables.insert(
            schema.name.clone(),
            MemoryTable {
                schema,
                key_column: key_column.to_string(),
                unique_columns: unique_columns.iter().map(|c| c.to_string()).collect(),
                rows: IndexMap::new(),
            },
        );
        self
    }

    /// Makes every write into `table` fail with a backend error.
    pub fn fail_writes_to(&mut self, table: &str) {
        self.failing_tables.insert(table.to_string());
    }

    /// Drops the connection on the first write into `table`; every later
    /// call fails the same way.
    pub fn lose_connection_at(&mut self, table: &str) {
        self.lost_at = Some(table.to_string());
    }

    /// Makes every rollback fail.
    pub fn fail_rollback(&mut self) {
        self.failing_rollback = true;
    }

    pub fn seed(&mut self, table: &str, row: TargetRow) -> Result<(), StoreError> {
        let schema = self.table(table)?.schema.clone();
        self.insert(&schema, &row)
    }

    pub fn rows(&self, table: &str) -> Vec<TargetRow> {
        self.tables
            .get(table)
            .map(|t| t.rows.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn row(&self, table: &str, key: &str) -> Option<&TargetRow> {
        self.tables.get(table).and_then(|t| t.rows.get(key))
    }

    pub fn sequence_value(&self, table: &str) -> Option<i64> {
        self.sequences.get(table).copied()
    }

    fn connected(&self) -> Result<(), StoreError> {
        if self.connection_lost {
            return Err(StoreError::ConnectionLost("connection closed".into()));
        }
        Ok(())
    }

    fn table(&self, name: &str) -> Result<&MemoryTable, StoreError> {
        self.connected()?;
        self.tables
            .get(name)
            .ok_or_else(|| StoreError::Backend(format!("relation \"{name}\" does not exist")))
    }

    fn writable(&mut self, name: &str) -> Result<&mut MemoryTable, StoreError> {
        self.connected()?;
        if self.lost_at.as_deref() == Some(name) {
            self.connection_lost = true;
            return Err(StoreError::ConnectionLost(format!(
                "connection closed while writing \"{name}\""
            )));
        }
        if self.failing_tables.contains(name) {
            return Err(StoreError::Backend(format!("write to \"{name}\" failed")));
        }
        self.tables
            .get_mut(name)
            .ok_or_else(|| StoreError::Backend(format!("relation \"{name}\" does not exist")))
    }
}

impl TargetStore for MemoryStore {
    fn describe_table(&mut self, table: &str) -> Result<Option<TableSchema>, StoreError> {
        self.connected()?;
        Ok(self.tables.get(table).map(|t| t.schema.clone()))
    }

    fn primary_keys(
        &mut self,
        table: &TableSchema,
        _key_column: &str,
    ) -> Result<HashSet<String>, StoreError> {
        Ok(self.table(&table.name)?.rows.keys().cloned().collect())
    }

    fn fetch_row(
        &mut self,
        table: &TableSchema,
        _key_column: &str,
        key: &str,
    ) -> Result<Option<TargetRow>, StoreError> {
        let stored = self.table(&table.name)?;
        Ok(stored.rows.get(key).map(|row| {
            stored
                .schema
                .columns
                .iter()
                .map(|c| (c.name.clone(), row.get(&c.name).cloned().unwrap_or(Value::Null)))
                .collect()
        }))
    }

    fn insert(&mut self, table: &TableSchema, row: &TargetRow) -> Result<(), StoreError> {
        let target = self.writable(&table.name)?;
        let coerced = target.coerce(row);
        let key = target.key_of(&coerced)?;
        if target.rows.contains_key(&key) {
            return Err(StoreError::UniqueViolation(format!(
                "Key ({})=({key}) already exists.",
                target.key_column
            )));
        }
        target.check_unique(&coerced, None)?;
        target.rows.insert(key, coerced);
        Ok(())
    }

    fn update(
        &mut self,
        table: &TableSchema,
        _key_column: &str,
        row: &TargetRow,
    ) -> Result<(), StoreError> {
        let target = self.writable(&table.name)?;
        let coerced = target.coerce(row);
        let key = target.key_of(&coerced)?;
        target.check_unique(&coerced, Some(&key))?;
        let Some(stored) = target.rows.get_mut(&key) else {
            return Ok(());
        };
        for (column, value) in coerced.iter() {
            stored.set(column, value.clone());
        }
        Ok(())
    }

    fn begin_table(&mut self) -> Result<(), StoreError> {
        self.connected()?;
        self.snapshot = Some(self.tables.clone());
        Ok(())
    }

    fn commit_table(&mut self) -> Result<(), StoreError> {
        self.connected()?;
        self.snapshot = None;
        Ok(())
    }

    fn rollback_table(&mut self) -> Result<(), StoreError> {
        self.connected()?;
        if self.failing_rollback {
            return Err(StoreError::Backend("rollback failed".into()));
        }
        if let Some(snapshot) = self.snapshot.take() {
            self.tables = snapshot;
        }
        Ok(())
    }

    fn sync_sequence(&mut self, table: &TableSchema, _key_column: &str) -> Result<(), StoreError> {
        let max = self
            .table(&table.name)?
            .rows
            .keys()
            .filter_map(|k| k.parse::<i64>().ok())
            .max()
            .unwrap_or(0);
        self.sequences.insert(table.name.clone(), max);
        Ok(())
    }
}

//! Statement construction and execution of insert/update decisions.
//!
//! Values always travel as positional text parameters cast to the column's
//! catalog type (`$1::text::"uuid"`); identifiers are double-quoted.

use anyhow::{Result, bail};
use itertools::Itertools;
use log::debug;

use crate::{
    catalog::{ColumnInfo, TableSchema},
    dedupe::Decision,
    record::TargetRow,
    store::{StoreError, TargetStore},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Option<String>>,
}

pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub fn qualified_name(schema: &str, table: &str) -> String {
    format!("{}.{}", quote_ident(schema), quote_ident(table))
}

fn column<'t>(table: &'t TableSchema, name: &str) -> Result<&'t ColumnInfo> {
    match table.column(name) {
        Some(info) => Ok(info),
        None => bail!("column '{name}' does not exist on '{}'", table.name),
    }
}

fn placeholder(index: usize, info: &ColumnInfo) -> String {
    format!("${index}::text::{}", quote_ident(&info.udt_name))
}

pub fn insert_statement(schema: &str, table: &TableSchema, row: &TargetRow) -> Result<Statement> {
    if row.is_empty() {
        bail!("refusing to insert an empty row into '{}'", table.name);
    }
    let mut params = Vec::with_capacity(row.len());
    let mut placeholders = Vec::with_capacity(row.len());
    for (index, (name, value)) in row.iter().enumerate() {
        let info = column(table, name)?;
        placeholders.push(placeholder(index + 1, info));
        params.push(info.param(value));
    }
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        qualified_name(schema, &table.name),
        row.columns().map(quote_ident).join(", "),
        placeholders.join(", ")
    );
    Ok(Statement { sql, params })
}

/// `None` when the row has nothing besides its key to set.
pub fn update_statement(
    schema: &str,
    table: &TableSchema,
    key_column: &str,
    row: &TargetRow,
) -> Result<Option<Statement>> {
    let Some(key) = row.get(key_column).and_then(|v| v.to_param()) else {
        bail!("update on '{}' without a {key_column} value", table.name);
    };
    let mut params = Vec::new();
    let mut assignments = Vec::new();
    for (name, value) in row.iter().filter(|(name, _)| *name != key_column) {
        let info = column(table, name)?;
        params.push(info.param(value));
        assignments.push(format!("{} = {}", quote_ident(name), placeholder(params.len(), info)));
    }
    if assignments.is_empty() {
        return Ok(None);
    }
    params.push(Some(key));
    let sql = format!(
        "UPDATE {} SET {} WHERE {} = {}",
        qualified_name(schema, &table.name),
        assignments.join(", "),
        quote_ident(key_column),
        placeholder(params.len(), column(table, key_column)?)
    );
    Ok(Some(Statement { sql, params }))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Inserted,
    Updated,
    Unchanged,
    /// The insert hit a unique constraint; the record is skipped.
    Conflict(String),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UpsertExecutor {
    dry_run: bool,
}

impl UpsertExecutor {
    pub fn new(dry_run: bool) -> Self {
        Self { dry_run }
    }

    /// Carries out `decision`. Unique violations on insert are recovered as
    /// [`Outcome::Conflict`]; every other store error is returned.
    pub fn apply(
        &self,
        store: &mut dyn TargetStore,
        table: &TableSchema,
        key_column: &str,
        row: &TargetRow,
        decision: Decision,
    ) -> Result<Outcome, StoreError> {
        debug!(
            "{}: {:?} {}",
            table.name,
            decision,
            row.get(key_column).map(|v| v.as_display()).unwrap_or_default()
        );
        match decision {
            Decision::Skip => Ok(Outcome::Unchanged),
            Decision::Insert if self.dry_run => Ok(Outcome::Inserted),
            Decision::Update if self.dry_run => Ok(Outcome::Updated),
            Decision::Insert => match store.insert(table, row) {
                Ok(()) => Ok(Outcome::Inserted),
                Err(StoreError::UniqueViolation(detail)) => Ok(Outcome::Conflict(detail)),
                Err(err) => Err(err),
            },
            Decision::Update => {
                if row.columns().all(|c| c == key_column) {
                    return Ok(Outcome::Unchanged);
                }
                store.update(table, key_column, row)?;
                Ok(Outcome::Updated)
            }
        }
    }
}

//! The target database seam.
//!
//! Every component that touches the live database receives a
//! `&mut dyn TargetStore` explicitly. [`PgStore`] is the PostgreSQL backend;
//! [`MemoryStore`] keeps tables in memory and backs the test suite.

mod memory;
mod pg;

use std::collections::HashSet;

use thiserror::Error;

pub use memory::MemoryStore;
pub use pg::PgStore;

use crate::{catalog::TableSchema, record::TargetRow};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),
    #[error("database error: {0}")]
    Database(#[from] postgres::Error),
    #[error("connection lost: {0}")]
    ConnectionLost(String),
    #[error("{0}")]
    Backend(String),
}

impl StoreError {
    /// The connection itself is gone; nothing further can succeed.
    pub fn is_connection_lost(&self) -> bool {
        match self {
            StoreError::ConnectionLost(_) => true,
            StoreError::Database(err) => err.is_closed(),
            _ => false,
        }
    }
}

pub trait TargetStore {
    /// Column metadata for `table`, or `None` when the table does not exist.
    fn describe_table(&mut self, table: &str) -> Result<Option<TableSchema>, StoreError>;

    /// Every primary key currently stored, in canonical text form.
    fn primary_keys(
        &mut self,
        table: &TableSchema,
        key_column: &str,
    ) -> Result<HashSet<String>, StoreError>;

    fn fetch_row(
        &mut self,
        table: &TableSchema,
        key_column: &str,
        key: &str,
    ) -> Result<Option<TargetRow>, StoreError>;

    fn insert(&mut self, table: &TableSchema, row: &TargetRow) -> Result<(), StoreError>;

    fn update(
        &mut self,
        table: &TableSchema,
        key_column: &str,
        row: &TargetRow,
    ) -> Result<(), StoreError>;

    /// Opens the unit of work that one table's changes are applied in.
    fn begin_table(&mut self) -> Result<(), StoreError>;

    fn commit_table(&mut self) -> Result<(), StoreError>;

    fn rollback_table(&mut self) -> Result<(), StoreError>;

    /// Advances an integer key sequence past the largest stored key.
    fn sync_sequence(&mut self, table: &TableSchema, key_column: &str) -> Result<(), StoreError>;
}

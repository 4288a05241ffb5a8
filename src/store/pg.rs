use std::collections::HashSet;

use itertools::Itertools;
use log::{debug, info, warn};
use postgres::{Client, NoTls, error::SqlState, types::ToSql};

use super::{StoreError, TargetStore};
use crate::{
    catalog::{ColumnInfo, TableSchema},
    config::DbConfig,
    record::TargetRow,
    upsert::{Statement, insert_statement, qualified_name, quote_ident, update_statement},
};

const ROW_SAVEPOINT: &str = "reconcile_row";

fn classify(err: postgres::Error) -> StoreError {
    if err.code() == Some(&SqlState::UNIQUE_VIOLATION) {
        let detail = err
            .as_db_error()
            .map(|db| {
                db.detail()
                    .map(|d| format!("{} ({d})", db.message()))
                    .unwrap_or_else(|| db.message().to_string())
            })
            .unwrap_or_else(|| err.to_string());
        return StoreError::UniqueViolation(detail);
    }
    if err.is_closed() {
        return StoreError::ConnectionLost(err.to_string());
    }
    StoreError::Database(err)
}

/// The run's single PostgreSQL connection.
///
/// Acquired once by [`PgStore::connect`] and released by [`PgStore::close`]
/// (or on drop when a run unwinds).
pub struct PgStore {
    client: Client,
    schema: String,
    in_table: bool,
}

impl PgStore {
    pub fn connect(config: &DbConfig) -> Result<Self, StoreError> {
        info!("Connecting to {config}");
        let client = config.to_pg_config().connect(NoTls)?;
        Ok(Self {
            client,
            schema: config.schema.clone(),
            in_table: false,
        })
    }

    pub fn close(self) {
        if self.in_table {
            warn!("Closing connection with an open table transaction; it will be rolled back");
        }
        match self.client.close() {
            Ok(()) => info!("Database connection closed"),
            Err(err) => warn!("Closing database connection failed: {err}"),
        }
    }

    fn execute(&mut self, statement: &Statement) -> Result<u64, StoreError> {
        debug!("{}", statement.sql);
        let params: Vec<&(dyn ToSql + Sync)> = statement
            .params
            .iter()
            .map(|p| p as &(dyn ToSql + Sync))
            .collect();
        self.client.execute(statement.sql.as_str(), &params).map_err(classify)
    }
}

impl TargetStore for PgStore {
    fn describe_table(&mut self, table: &str) -> Result<Option<TableSchema>, StoreError> {
        let rows = self.client.query(
            "SELECT column_name::text, data_type::text, udt_name::text
             FROM information_schema.columns
             WHERE table_schema = $1 AND table_name = $2
             ORDER BY ordinal_position",
            &[&self.schema, &table],
        )?;
        if rows.is_empty() {
            return Ok(None);
        }
        let columns = rows
            .iter()
            .map(|row| ColumnInfo {
                name: row.get(0),
                data_type: row.get(1),
                udt_name: row.get(2),
            })
            .collect();
        Ok(Some(TableSchema {
            name: table.to_string(),
            columns,
        }))
    }

    fn primary_keys(
        &mut self,
        table: &TableSchema,
        key_column: &str,
    ) -> Result<HashSet<String>, StoreError> {
        let sql = format!(
            "SELECT {}::text FROM {}",
            quote_ident(key_column),
            qualified_name(&self.schema, &table.name)
        );
        let rows = self.client.query(sql.as_str(), &[])?;
        Ok(rows
            .iter()
            .filter_map(|row| row.get::<_, Option<String>>(0))
            .collect())
    }

    fn fetch_row(
        &mut self,
        table: &TableSchema,
        key_column: &str,
        key: &str,
    ) -> Result<Option<TargetRow>, StoreError> {
        let key_type = table
            .column(key_column)
            .map(|c| quote_ident(&c.udt_name))
            .unwrap_or_else(|| "text".to_string());
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = $1::text::{key_type}",
            table
                .columns
                .iter()
                .map(|c| format!("{}::text", quote_ident(&c.name)))
                .join(", "),
            qualified_name(&self.schema, &table.name),
            quote_ident(key_column),
        );
        let Some(row) = self.client.query_opt(sql.as_str(), &[&key])? else {
            return Ok(None);
        };
        Ok(Some(
            table
                .columns
                .iter()
                .enumerate()
                .map(|(index, column)| {
                    let text: Option<String> = row.get(index);
                    (column.name.clone(), column.decode(text.as_deref()))
                })
                .collect(),
        ))
    }

    fn insert(&mut self, table: &TableSchema, row: &TargetRow) -> Result<(), StoreError> {
        let statement = insert_statement(&self.schema, table, row)
            .map_err(|err| StoreError::Backend(err.to_string()))?;
        if !self.in_table {
            return self.execute(&statement).map(|_| ());
        }
        // A failed statement poisons the transaction; the savepoint keeps a
        // unique violation from taking the rest of the table with it.
        self.client.batch_execute(&format!("SAVEPOINT {ROW_SAVEPOINT}"))?;
        match self.execute(&statement) {
            Ok(_) => {
                self.client
                    .batch_execute(&format!("RELEASE SAVEPOINT {ROW_SAVEPOINT}"))?;
                Ok(())
            }
            Err(err) => {
                self.client
                    .batch_execute(&format!("ROLLBACK TO SAVEPOINT {ROW_SAVEPOINT}"))?;
                Err(err)
            }
        }
    }

    fn update(
        &mut self,
        table: &TableSchema,
        key_column: &str,
        row: &TargetRow,
    ) -> Result<(), StoreError> {
        let statement = update_statement(&self.schema, table, key_column, row)
            .map_err(|err| StoreError::Backend(err.to_string()))?;
        if let Some(statement) = statement {
            self.execute(&statement)?;
        }
        Ok(())
    }

    fn begin_table(&mut self) -> Result<(), StoreError> {
        self.client.batch_execute("BEGIN")?;
        self.in_table = true;
        Ok(())
    }

    fn commit_table(&mut self) -> Result<(), StoreError> {
        self.in_table = false;
        self.client.batch_execute("COMMIT")?;
        Ok(())
    }

    fn rollback_table(&mut self) -> Result<(), StoreError> {
        self.in_table = false;
        self.client.batch_execute("ROLLBACK")?;
        Ok(())
    }

    fn sync_sequence(&mut self, table: &TableSchema, key_column: &str) -> Result<(), StoreError> {
        let qualified = qualified_name(&self.schema, &table.name);
        // setval(NULL, ..) is a no-op, which covers integer keys without an owned sequence.
        let sql = format!(
            "SELECT setval(pg_get_serial_sequence($1, $2), COALESCE(MAX({}), 1)) FROM {qualified}",
            quote_ident(key_column)
        );
        self.client.query_opt(sql.as_str(), &[&qualified, &key_column])?;
        Ok(())
    }
}

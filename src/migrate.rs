//! Drives a whole run: tables in dependency order, records one at a time.

use std::collections::HashMap;

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};

use crate::{
    cli::MigrateArgs,
    config::{self, DbConfig},
    data::Value,
    dedupe::decide,
    error::MigrationError,
    identity::{Validation, canonical_key, validate_identifiers},
    locator,
    mapping::{MappingOverrides, build_mapping},
    normalize::{Normalized, Normalizer, project},
    policy::{KeyKind, PolicyRegistry, TablePolicy},
    record::{SourceRecord, TargetRow},
    report::{MigrationReport, TableReport, Warning},
    source::BackupData,
    store::{PgStore, StoreError, TargetStore},
    upsert::{Outcome, UpsertExecutor},
};

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub dry_run: bool,
    /// Source or target table names; empty means every table.
    pub tables: Vec<String>,
}

/// One table's worth of work, ranked by its position in the dependency order.
#[derive(Debug, Clone)]
pub struct TableMigrationPlan<'a> {
    pub rank: usize,
    pub policy: &'a TablePolicy,
    pub columns: Vec<String>,
    pub records: Vec<SourceRecord>,
    pub source_warnings: Vec<String>,
}

impl TableMigrationPlan<'_> {
    pub fn target_table(&self) -> &str {
        &self.policy.target_table
    }
}

pub struct Migrator<'a> {
    registry: &'a PolicyRegistry,
    overrides: &'a MappingOverrides,
    options: RunOptions,
    clock: fn() -> DateTime<Utc>,
}

impl<'a> Migrator<'a> {
    pub fn new(
        registry: &'a PolicyRegistry,
        overrides: &'a MappingOverrides,
        options: RunOptions,
    ) -> Self {
        Self {
            registry,
            overrides,
            options,
            clock: Utc::now,
        }
    }

    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    /// Plans for every selected table, in dependency order. Tables the backup
    /// has no rows for get a plan with no records.
    pub fn plan(&self, data: &BackupData) -> Result<Vec<TableMigrationPlan<'a>>> {
        for name in &self.options.tables {
            if self.registry.find(name).is_none() {
                return Err(MigrationError::UnknownTable(name.clone()).into());
            }
        }
        let order = self.registry.dependency_order()?;
        let plans = order
            .into_iter()
            .enumerate()
            .filter(|(_, policy)| {
                self.options.tables.is_empty()
                    || self.options.tables.iter().any(|t| policy.matches_name(t))
            })
            .map(|(rank, policy)| {
                let table = data.table(policy).unwrap_or_default();
                TableMigrationPlan {
                    rank,
                    policy,
                    columns: table.columns,
                    records: table.records,
                    source_warnings: table.warnings,
                }
            })
            .collect();
        Ok(plans)
    }

    /// Runs every plan against `store`. A failing table is rolled back and
    /// reported; only a lost connection (or a failed rollback) ends the run.
    pub fn run(&self, store: &mut dyn TargetStore, data: &BackupData) -> Result<MigrationReport> {
        let plans = self.plan(data)?;
        let mut report = MigrationReport {
            dry_run: self.options.dry_run,
            tables: Vec::with_capacity(plans.len()),
        };
        for plan in &plans {
            let mut table_report = TableReport::new(plan.target_table());
            for message in &plan.source_warnings {
                table_report.warn(Warning::SourceFormat {
                    table: plan.target_table().to_string(),
                    message: message.clone(),
                });
            }
            if plan.records.is_empty() && plan.columns.is_empty() {
                table_report.warn(Warning::MissingSourceTable {
                    table: plan.policy.source_table.clone(),
                });
                report.tables.push(table_report);
                continue;
            }
            info!(
                "[{}] {} -> {}: {} record(s)",
                plan.rank + 1,
                plan.policy.source_table,
                plan.target_table(),
                plan.records.len()
            );
            let transactional = !self.options.dry_run;
            if transactional {
                store.begin_table()?;
            }
            let result = self.migrate_table(store, plan, &mut table_report);
            match result {
                Ok(()) => {
                    if transactional {
                        store.commit_table()?;
                    }
                }
                Err(err) => {
                    let lost = err
                        .downcast_ref::<StoreError>()
                        .is_some_and(StoreError::is_connection_lost);
                    if lost {
                        warn!(
                            "{}: connection lost, aborting the remaining tables",
                            plan.target_table()
                        );
                        report.tables.push(table_report);
                        report.log_summary();
                        return Err(err);
                    }
                    let reason = format!("{err:#}");
                    let failure = MigrationError::Table {
                        table: plan.target_table().to_string(),
                        source: err,
                    };
                    warn!("{failure}");
                    if transactional {
                        store
                            .rollback_table()
                            .with_context(|| format!("Rolling back {}", plan.target_table()))?;
                    }
                    table_report.fail(reason);
                }
            }
            report.tables.push(table_report);
        }
        Ok(report)
    }

    fn migrate_table(
        &self,
        store: &mut dyn TargetStore,
        plan: &TableMigrationPlan<'_>,
        report: &mut TableReport,
    ) -> Result<()> {
        let policy = plan.policy;
        let table = plan.target_table();
        let schema = store
            .describe_table(table)?
            .ok_or_else(|| MigrationError::MissingTargetTable(table.to_string()))?;
        let pk = policy.primary_key.as_str();
        if !schema.has_column(pk) {
            return Err(anyhow!("target table '{table}' has no '{pk}' column"));
        }

        let mapping = build_mapping(
            &policy.source_table,
            &plan.columns,
            &schema.column_names(),
            self.overrides,
        );
        for column in &mapping.unmapped {
            report.warn(Warning::UnmappableColumn {
                table: table.to_string(),
                column: column.clone(),
            });
        }
        for note in &mapping.notes {
            report.warn(Warning::MappingNote {
                table: table.to_string(),
                message: note.clone(),
            });
        }

        let mut existing_keys = store.primary_keys(&schema, pk)?;
        debug!("{table}: {} existing key(s)", existing_keys.len());
        let normalizer = Normalizer::new(policy, &schema, (self.clock)());
        let executor = UpsertExecutor::new(self.options.dry_run);
        // Dry runs write nothing, so rows they would have written are kept
        // here for later records with the same key to compare against.
        let mut staged: HashMap<String, TargetRow> = HashMap::new();

        for record in &plan.records {
            let projected = project(record, &mapping, &schema);
            let hinted_key = projected
                .get(pk)
                .and_then(|value| canonical_key(value, policy.key_kind));
            let existing = hinted_key
                .as_deref()
                .is_some_and(|key| existing_keys.contains(key));

            let row = match normalizer.normalize(projected, existing) {
                Normalized::Row(row) => row,
                Normalized::Rejected(reason) => {
                    report.skip(Warning::RejectedRecord {
                        table: table.to_string(),
                        key: hinted_key,
                        reason,
                    });
                    continue;
                }
            };
            let row = match validate_identifiers(row, policy) {
                Validation::Valid { row, warnings } => {
                    for warning in warnings {
                        report.warn(warning);
                    }
                    row
                }
                Validation::Skip(warning) => {
                    report.skip(warning);
                    continue;
                }
            };
            let Some(key) = row.get(pk).and_then(Value::to_param) else {
                return Err(anyhow!("validated row on '{table}' lost its primary key"));
            };

            let stored = match staged.get(&key) {
                Some(row) => Some(row.clone()),
                None if existing_keys.contains(&key) => store.fetch_row(&schema, pk, &key)?,
                None => None,
            };
            let decision = decide(&row, stored.as_ref(), &policy.timestamp_columns);
            let outcome = executor.apply(store, &schema, pk, &row, decision)?;
            if self.options.dry_run && matches!(outcome, Outcome::Inserted | Outcome::Updated) {
                let mut would_store = stored.unwrap_or_default();
                for (column, value) in row.iter() {
                    would_store.set(column, value.clone());
                }
                staged.insert(key.clone(), would_store);
            }
            match outcome {
                Outcome::Inserted => {
                    report.inserted += 1;
                    existing_keys.insert(key);
                }
                Outcome::Updated => report.updated += 1,
                Outcome::Unchanged => report.skipped += 1,
                Outcome::Conflict(detail) => report.skip(Warning::DuplicateKeyConflict {
                    table: table.to_string(),
                    key,
                    detail,
                }),
            }
        }

        if policy.key_kind == KeyKind::Sequence && report.inserted > 0 && !self.options.dry_run {
            store.sync_sequence(&schema, pk)?;
        }
        Ok(())
    }
}

/// Entry point for `migrate`: locate and load the backup, then run inside a
/// single connection scope that is closed on every path.
pub fn execute(args: &MigrateArgs) -> Result<()> {
    let registry = PolicyRegistry::audiobook();
    let overrides = config::load_overrides(args.overrides.as_deref())?;
    let location = locator::locate(args.source.source.as_deref(), &args.source.search_dir)?;
    let data = BackupData::load(&location, &registry)
        .with_context(|| format!("Loading backup {:?}", location.path()))?;

    let options = RunOptions {
        dry_run: args.dry_run,
        tables: args.tables.clone(),
    };
    let migrator = Migrator::new(&registry, &overrides, options);
    let db_config = DbConfig::from(&args.db);
    let mut store = PgStore::connect(&db_config)
        .with_context(|| format!("Connecting to {db_config}"))?;
    let outcome = migrator.run(&mut store, &data);
    store.close();
    let report = outcome?;

    report.log_summary();
    for table in &report.tables {
        println!("{}", table.summary_line());
    }
    if let Some(path) = &args.report {
        report.save(path)?;
        info!("Report written to {path:?}");
    }
    let failed = report.failed_tables();
    if !failed.is_empty() {
        warn!("{} table(s) failed and were rolled back: {}", failed.len(), failed.join(", "));
    }
    Ok(())
}

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Reconcile legacy backups into the live audiobook database",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Upsert a legacy dump or JSON snapshots into the live database
    Migrate(MigrateArgs),
    /// List the tables, columns, and row counts a backup contains
    Inspect(InspectArgs),
}

#[derive(Debug, Args)]
pub struct SourceArgs {
    /// Dump file, snapshot directory, or consolidated JSON document
    #[arg(short = 's', long = "source")]
    pub source: Option<PathBuf>,
    /// Directory searched for `*backup*.sql` when --source is omitted
    #[arg(long = "search-dir", default_value = ".")]
    pub search_dir: PathBuf,
}

#[derive(Debug, Args)]
pub struct DbArgs {
    /// Database host
    #[arg(long = "db-host", env = "DB_HOST", default_value = "localhost")]
    pub host: String,
    /// Database port
    #[arg(long = "db-port", env = "DB_PORT", default_value_t = 5432)]
    pub port: u16,
    /// Database user
    #[arg(long = "db-user", env = "DB_USER", default_value = "postgres")]
    pub user: String,
    /// Database password
    #[arg(
        long = "db-password",
        env = "DB_PASSWORD",
        default_value = "postgres",
        hide_env_values = true
    )]
    pub password: String,
    /// Database name
    #[arg(long = "db-name", env = "DB_NAME", default_value = "audiobooks")]
    pub database: String,
    /// Schema holding the target tables
    #[arg(long = "db-schema", env = "DB_SCHEMA", default_value = "public")]
    pub schema: String,
}

#[derive(Debug, Args)]
pub struct MigrateArgs {
    #[command(flatten)]
    pub source: SourceArgs,
    #[command(flatten)]
    pub db: DbArgs,
    /// YAML file of column overrides (`Table: { sourceColumn: target_column }`)
    #[arg(long = "overrides")]
    pub overrides: Option<PathBuf>,
    /// Restrict the run to these tables (source or target names)
    #[arg(long = "tables", value_delimiter = ',')]
    pub tables: Vec<String>,
    /// Compute decisions without writing anything
    #[arg(long = "dry-run")]
    pub dry_run: bool,
    /// Write the final report as JSON to this path
    #[arg(long = "report")]
    pub report: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct InspectArgs {
    #[command(flatten)]
    pub source: SourceArgs,
}

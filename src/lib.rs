pub mod catalog;
pub mod cli;
pub mod config;
pub mod data;
pub mod dedupe;
pub mod dump;
pub mod error;
pub mod identity;
pub mod inspect;
pub mod locator;
pub mod mapping;
pub mod migrate;
pub mod normalize;
pub mod policy;
pub mod record;
pub mod report;
pub mod snapshot;
pub mod source;
pub mod store;
pub mod upsert;

use std::{env, sync::OnceLock};

use anyhow::Result;
use clap::Parser;
use log::{LevelFilter, debug};

use crate::cli::{Cli, Commands};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("backup_reconciler", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    // A missing .env file is fine; the environment and flags still apply.
    let dotenv = dotenvy::dotenv().ok();
    init_logging();
    if let Some(path) = dotenv {
        debug!("Loaded environment from {path:?}");
    }
    let cli = Cli::parse();
    match cli.command {
        Commands::Migrate(args) => migrate::execute(&args),
        Commands::Inspect(args) => inspect::execute(&args),
    }
}

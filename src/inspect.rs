use anyhow::{Context, Result};
use log::info;

use crate::{
    cli::InspectArgs,
    dump,
    locator,
    policy::PolicyRegistry,
    source::BackupData,
};

/// One line per known table, followed by dump segments no policy claims.
pub fn describe(data: &BackupData, registry: &PolicyRegistry) -> Vec<String> {
    let mut lines: Vec<String> = registry
        .policies()
        .iter()
        .map(|policy| match data.table(policy) {
            Some(table) => format!(
                "{}: {} row(s), {} column(s)",
                policy.source_table,
                table.records.len(),
                table.columns.len()
            ),
            None => format!("{}: not present", policy.source_table),
        })
        .collect();
    if let BackupData::Dump(text) = data {
        for header in dump::list_tables(text) {
            if registry.find(&header.table).is_none() {
                lines.push(format!("{}: no table policy, ignored", header.table));
            }
        }
    }
    lines
}

pub fn execute(args: &InspectArgs) -> Result<()> {
    let registry = PolicyRegistry::audiobook();
    let location = locator::locate(args.source.source.as_deref(), &args.source.search_dir)?;
    let data = BackupData::load(&location, &registry)
        .with_context(|| format!("Loading backup {:?}", location.path()))?;
    info!("Inspecting {:?}", location.path());
    for line in describe(&data, &registry) {
        println!("{line}");
    }
    Ok(())
}

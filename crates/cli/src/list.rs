use anyhow::Result;
use std::path::Path;

use programsync_core::{FilterSpec, QueryKey, filter_records};

use crate::context;
use crate::output;

pub struct ListArgs {
    pub key: Option<QueryKey>,
    pub program_type: Option<String>,
    pub business: Option<String>,
    pub force: bool,
    pub json: bool,
}

/// `programsync list`: load (or reuse) one key and print the filtered records.
pub async fn run_list(config_path: Option<&Path>, args: ListArgs) -> Result<()> {
    let (_, orchestrator) = context::connect(config_path)?;
    let key = args.key.unwrap_or_else(|| orchestrator.active_key());
    orchestrator.set_active_key(key.clone());

    let entry = orchestrator.ensure_with(&key, args.force).await?;
    let spec = FilterSpec::for_key(&key)
        .with_type(args.program_type.as_deref())
        .with_business(args.business.as_deref());
    let records = filter_records(&entry.records, &spec);

    if args.json {
        return output::print_json(&records);
    }

    if let Some(view) = orchestrator.view(&key) {
        println!("{}", output::view_header(&view, records.len()));
    }
    if let Some(notice) = output::degraded_notice(&entry.diagnostics) {
        println!("{notice}");
    }
    if records.is_empty() {
        println!("No programs match.");
        return Ok(());
    }
    for program in &records {
        println!("{}", output::program_line(program));
    }
    Ok(())
}

/// `programsync options`: business picker entries for one key.
pub async fn run_options(
    config_path: Option<&Path>,
    key: Option<QueryKey>,
    program_type: Option<String>,
    json: bool,
) -> Result<()> {
    let (_, orchestrator) = context::connect(config_path)?;
    let key = key.unwrap_or_else(|| orchestrator.active_key());
    let options = orchestrator.options(&key, program_type.as_deref()).await?;

    if json {
        return output::print_json(&options);
    }
    if options.is_empty() {
        println!("No businesses found for {key}.");
        return Ok(());
    }
    for option in &options {
        println!("{}", output::option_line(option));
    }
    Ok(())
}

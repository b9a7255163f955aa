//! Restore commands - promote a past run's output, list restore history

use crate::cli::config::PortalConfig;
use crate::cli::context;
use crate::cli::error::HelpfulError;
use crate::cli::output::{format_timestamp, print_table, print_warnings};
use crate::cli::parse_run_id;
use portal_db::RestoreRecord;
use portal_ids::RunId;
use serde::Serialize;

/// Arguments for the restore command
#[derive(Debug, clap::Args)]
pub struct RestoreArgs {
    /// Succeeded run whose output should become current
    pub run_id: String,

    /// Who is requesting the restore
    #[arg(long, env = "PORTAL_USER")]
    pub by: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the restores command
#[derive(Debug, clap::Args)]
pub struct RestoresArgs {
    /// Maximum records to list
    #[arg(long, short = 'n', default_value_t = 20)]
    pub limit: u32,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Serialize)]
struct RestoresOutput {
    limit: u32,
    restores: Vec<RestoreRecord>,
}

pub fn run_restore(args: RestoreArgs, config: &PortalConfig) -> anyhow::Result<()> {
    let source = parse_run_id(&args.run_id)?;
    let missing = config.missing_for_submit();
    if !missing.is_empty() {
        return Err(HelpfulError::missing_config(&missing, "submit a restore run").into());
    }

    let rt = context::runtime()?;
    rt.block_on(restore_async(source, args, config))
}

async fn restore_async(
    source: RunId,
    args: RestoreArgs,
    config: &PortalConfig,
) -> anyhow::Result<()> {
    let coordinator = context::coordinator(config).await?;
    let result = coordinator.restore(&source, &args.by).await;
    coordinator.db().close().await;
    let outcome = result.map_err(HelpfulError::from)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    print_warnings(&outcome.warnings);
    println!("Restore triggered.");
    println!("  Source run:  {}", outcome.source_run_id);
    println!("  Restore run: {}", outcome.target_run_id);
    println!("  Record:      {}", outcome.restore_id);
    println!();
    println!("Run `portal refresh` to poll its status.");
    Ok(())
}

pub fn run_list(args: RestoresArgs, config: &PortalConfig) -> anyhow::Result<()> {
    let rt = context::runtime()?;
    rt.block_on(list_async(args, config))
}

async fn list_async(args: RestoresArgs, config: &PortalConfig) -> anyhow::Result<()> {
    let coordinator = context::coordinator(config).await?;
    let restores = coordinator.list_restores(args.limit).await?;
    coordinator.db().close().await;

    if args.json {
        let output = RestoresOutput {
            limit: args.limit,
            restores,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    if restores.is_empty() {
        println!("No restores recorded.");
        return Ok(());
    }

    let rows = restores
        .iter()
        .map(|record| {
            vec![
                format_timestamp(&record.restored_at),
                record.restored_by.clone(),
                record.source_run_id.to_string(),
                record
                    .target_run_id
                    .as_ref()
                    .map(|id| id.to_string())
                    .unwrap_or_else(|| "(not submitted)".to_string()),
            ]
        })
        .collect();
    print_table(&["RESTORED", "BY", "SOURCE RUN", "RESTORE RUN"], rows);
    Ok(())
}

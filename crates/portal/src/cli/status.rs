//! Status command - lock holder, active run, last good run

use crate::cli::config::PortalConfig;
use crate::cli::context;
use crate::cli::output::{format_optional_timestamp, format_timestamp, print_table};
use portal_db::{Run, RunLockInfo, RunStats};
use serde::Serialize;

/// Arguments for the status command
#[derive(Debug, clap::Args)]
pub struct StatusArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Serialize)]
struct LockView {
    held: bool,
    holder: Option<RunLockInfo>,
}

#[derive(Debug, Serialize)]
struct StatusOutput {
    lock: LockView,
    active_run: Option<Run>,
    latest_successful_run: Option<Run>,
    stats: RunStats,
}

pub fn run(args: StatusArgs, config: &PortalConfig) -> anyhow::Result<()> {
    let rt = context::runtime()?;
    rt.block_on(run_async(args, config))
}

async fn run_async(args: StatusArgs, config: &PortalConfig) -> anyhow::Result<()> {
    let coordinator = context::coordinator(config).await?;

    let holder = coordinator.lock_status().await?;
    let output = StatusOutput {
        lock: LockView {
            held: holder.is_some(),
            holder,
        },
        active_run: coordinator.get_active_run().await?,
        latest_successful_run: coordinator.latest_successful_run().await?,
        stats: coordinator.run_stats().await?,
    };
    coordinator.db().close().await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("PIPELINE STATUS");
    println!();
    match &output.lock.holder {
        Some(info) => println!(
            "  Lock:   HELD by run {} ({}, since {})",
            info.run_id,
            info.locked_by.as_deref().unwrap_or("unknown"),
            format_optional_timestamp(info.locked_at.as_ref())
        ),
        None => println!("  Lock:   free"),
    }
    match &output.active_run {
        Some(run) => println!(
            "  Active: {} {} (input {}, by {})",
            run.run_id, run.status, run.input_file, run.triggered_by
        ),
        None => println!("  Active: none"),
    }
    match &output.latest_successful_run {
        Some(run) => println!(
            "  Last success: {} finished {}",
            run.run_id,
            format_optional_timestamp(run.finished_at.as_ref())
        ),
        None => println!("  Last success: never"),
    }
    println!();

    let stats = &output.stats;
    print_table(
        &["TOTAL", "SUBMITTED", "QUEUED", "RUNNING", "SUCCEEDED", "FAILED"],
        vec![vec![
            stats.total.to_string(),
            stats.submitted.to_string(),
            stats.queued.to_string(),
            stats.running.to_string(),
            stats.succeeded.to_string(),
            stats.failed.to_string(),
        ]],
    );

    if let Some(run) = &output.active_run {
        println!();
        println!("Submitted {}. Run `portal refresh` to poll it.", format_timestamp(&run.created_at));
    }
    Ok(())
}

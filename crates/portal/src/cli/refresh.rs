//! Refresh command - poll a run once and record what changed

use crate::cli::config::PortalConfig;
use crate::cli::context;
use crate::cli::error::HelpfulError;
use crate::cli::output::print_warnings;
use crate::cli::parse_run_id;
use portal_coordinator::{AdvanceOutcome, CoordinatorError, Transition};
use portal_ids::RunId;
use serde::Serialize;

/// Arguments for the refresh command
#[derive(Debug, clap::Args)]
pub struct RefreshArgs {
    /// Run to poll (default: the active run)
    pub run_id: Option<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Serialize)]
struct RefreshOutput {
    outcome: Option<AdvanceOutcome>,
}

pub fn run(args: RefreshArgs, config: &PortalConfig) -> anyhow::Result<()> {
    let requested = args.run_id.as_deref().map(parse_run_id).transpose()?;

    let rt = context::runtime()?;
    rt.block_on(run_async(requested, args.json, config))
}

async fn run_async(
    requested: Option<RunId>,
    json: bool,
    config: &PortalConfig,
) -> anyhow::Result<()> {
    let coordinator = context::coordinator(config).await?;

    let run = match &requested {
        Some(run_id) => Some(
            coordinator
                .get_run(run_id)
                .await?
                .ok_or_else(|| HelpfulError::from(CoordinatorError::RunNotFound(run_id.clone())))?,
        ),
        None => coordinator.get_active_run().await?,
    };

    let outcome = match run {
        Some(run) => {
            // Terminal runs are answered from the store without a poll.
            let missing = config.missing_for_poll();
            if run.status.is_active() && !missing.is_empty() {
                return Err(HelpfulError::missing_config(&missing, "poll a pipeline run").into());
            }
            let result = coordinator.advance(&run.run_id).await;
            Some(result.map_err(HelpfulError::from)?)
        }
        None => None,
    };
    coordinator.db().close().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&RefreshOutput { outcome })?);
        return Ok(());
    }

    let Some(outcome) = outcome else {
        println!("No active run.");
        return Ok(());
    };
    print_warnings(&outcome.warnings);
    match outcome.transition {
        Transition::Transitioned { from, to } => {
            println!("Run {}: {} -> {}", outcome.run_id, from, to)
        }
        Transition::Unchanged { status } => println!("Run {}: still {}", outcome.run_id, status),
    }
    if let Some(external) = &outcome.external_status {
        println!("  Fabric status: {}", external);
    }
    if outcome.kpis_captured {
        println!("  KPIs captured.");
    }
    if outcome.lock_released {
        println!("  Pipeline lock released.");
    }
    Ok(())
}

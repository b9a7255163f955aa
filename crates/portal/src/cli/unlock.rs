//! Unlock command - operator override for a stuck pipeline lock

use crate::cli::config::PortalConfig;
use crate::cli::context;
use crate::cli::error::HelpfulError;
use crate::cli::output::print_warnings;

/// Arguments for the unlock command
#[derive(Debug, clap::Args)]
pub struct UnlockArgs {
    /// Operator performing the override
    #[arg(long, env = "PORTAL_USER")]
    pub by: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: UnlockArgs, config: &PortalConfig) -> anyhow::Result<()> {
    let rt = context::runtime()?;
    rt.block_on(run_async(args, config))
}

async fn run_async(args: UnlockArgs, config: &PortalConfig) -> anyhow::Result<()> {
    let coordinator = context::coordinator(config).await?;
    let result = coordinator.force_release(&args.by).await;
    coordinator.db().close().await;
    let outcome = result.map_err(HelpfulError::from)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    print_warnings(&outcome.warnings);
    match &outcome.evicted {
        Some(info) => {
            println!("Pipeline lock released.");
            println!("  Evicted run: {}", info.run_id);
            println!(
                "  Held by:     {}",
                info.locked_by.as_deref().unwrap_or("unknown")
            );
        }
        None => println!("Pipeline lock was not held."),
    }
    Ok(())
}

//! Submit command - admit a new pipeline run

use crate::cli::config::PortalConfig;
use crate::cli::context;
use crate::cli::error::HelpfulError;
use crate::cli::output::print_warnings;

/// Arguments for the submit command
#[derive(Debug, clap::Args)]
pub struct SubmitArgs {
    /// Input file name the pipeline should process
    pub input: String,

    /// Who is triggering the run
    #[arg(long, env = "PORTAL_USER")]
    pub by: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: SubmitArgs, config: &PortalConfig) -> anyhow::Result<()> {
    let missing = config.missing_for_submit();
    if !missing.is_empty() {
        return Err(HelpfulError::missing_config(&missing, "submit a pipeline run").into());
    }

    let rt = context::runtime()?;
    rt.block_on(run_async(args, config))
}

async fn run_async(args: SubmitArgs, config: &PortalConfig) -> anyhow::Result<()> {
    let coordinator = context::coordinator(config).await?;
    let result = coordinator.admit(&args.input, &args.by).await;
    coordinator.db().close().await;
    let outcome = result.map_err(HelpfulError::from)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    print_warnings(&outcome.warnings);
    println!("Pipeline triggered.");
    println!("  Run:    {}", outcome.run_id);
    println!("  Input:  {}", args.input.trim());
    if outcome.job_handle.is_empty() {
        println!("  Job:    (no polling location returned)");
    } else {
        println!("  Job:    {}", outcome.job_handle.as_str());
    }
    println!();
    println!("Run `portal refresh` to poll its status.");
    Ok(())
}

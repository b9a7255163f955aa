//! Run history commands - list, show one run, show its KPIs

use crate::cli::config::PortalConfig;
use crate::cli::context;
use crate::cli::error::HelpfulError;
use crate::cli::output::{
    event_color, format_elapsed, format_optional_timestamp, format_size, format_timestamp,
    print_table, print_table_colored, status_color,
};
use crate::cli::parse_run_id;
use portal_coordinator::CoordinatorError;
use portal_db::{Run, RunArtifact, RunEvent, RunStats};
use portal_ids::RunId;
use serde::Serialize;

/// Arguments for the runs command
#[derive(Debug, clap::Args)]
pub struct RunsArgs {
    /// Maximum runs to list
    #[arg(long, short = 'n', default_value_t = 20)]
    pub limit: u32,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the show command
#[derive(Debug, clap::Args)]
pub struct ShowArgs {
    /// Run to show
    pub run_id: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the kpis command
#[derive(Debug, clap::Args)]
pub struct KpisArgs {
    /// Run whose KPIs to show
    pub run_id: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Serialize)]
struct RunsOutput {
    stats: RunStats,
    limit: u32,
    runs: Vec<Run>,
}

#[derive(Debug, Serialize)]
struct ShowOutput {
    run: Run,
    events: Vec<RunEvent>,
    artifacts: Vec<RunArtifact>,
}

#[derive(Debug, Serialize)]
struct KpisOutput {
    run_id: RunId,
    kpis: Option<serde_json::Value>,
}

pub fn run_list(args: RunsArgs, config: &PortalConfig) -> anyhow::Result<()> {
    let rt = context::runtime()?;
    rt.block_on(list_async(args, config))
}

async fn list_async(args: RunsArgs, config: &PortalConfig) -> anyhow::Result<()> {
    let coordinator = context::coordinator(config).await?;
    let output = RunsOutput {
        stats: coordinator.run_stats().await?,
        limit: args.limit,
        runs: coordinator.list_runs(args.limit).await?,
    };
    coordinator.db().close().await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    if output.runs.is_empty() {
        println!("No runs yet. Start one with `portal submit <input> --by <you>`.");
        return Ok(());
    }

    let rows = output
        .runs
        .iter()
        .map(|run| {
            vec![
                (run.run_id.short().to_string(), None),
                (run.status.to_string(), Some(status_color(run.status))),
                (run.input_file.clone(), None),
                (run.triggered_by.clone(), None),
                (format_timestamp(&run.created_at), None),
                (duration(run), None),
            ]
        })
        .collect();
    print_table_colored(&["RUN", "STATUS", "INPUT", "BY", "CREATED", "DURATION"], rows);

    println!();
    println!(
        "Showing {} of {} runs ({} succeeded, {} failed)",
        output.runs.len(),
        output.stats.total,
        output.stats.succeeded,
        output.stats.failed
    );
    Ok(())
}

fn duration(run: &Run) -> String {
    match (&run.started_at, &run.finished_at) {
        (Some(start), Some(end)) => format_elapsed(start, end),
        (Some(start), None) => format!("{} (running)", format_elapsed(start, &chrono::Utc::now())),
        _ => "-".to_string(),
    }
}

pub fn run_show(args: ShowArgs, config: &PortalConfig) -> anyhow::Result<()> {
    let run_id = parse_run_id(&args.run_id)?;
    let rt = context::runtime()?;
    rt.block_on(show_async(run_id, args.json, config))
}

async fn show_async(run_id: RunId, json: bool, config: &PortalConfig) -> anyhow::Result<()> {
    let coordinator = context::coordinator(config).await?;
    let run = coordinator
        .get_run(&run_id)
        .await?
        .ok_or_else(|| HelpfulError::from(CoordinatorError::RunNotFound(run_id.clone())))?;
    let output = ShowOutput {
        events: coordinator.get_events(&run_id).await?,
        artifacts: coordinator.list_artifacts(&run_id).await?,
        run,
    };
    coordinator.db().close().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    let run = &output.run;
    println!("RUN {}", run.run_id);
    println!();
    println!("  Status:      {}", run.status);
    println!("  Input:       {}", run.input_file);
    println!("  Triggered:   {} by {}", format_timestamp(&run.created_at), run.triggered_by);
    println!("  Started:     {}", format_optional_timestamp(run.started_at.as_ref()));
    println!("  Finished:    {}", format_optional_timestamp(run.finished_at.as_ref()));
    println!("  Duration:    {}", duration(run));
    println!("  Fabric job:  {}", run.external_job_id.as_deref().unwrap_or("-"));
    if let Some(version) = &run.app_version {
        println!("  App version: {}", version);
    }
    if let Some(error) = &run.error_message {
        println!("  Error:       {}", error);
    }
    println!();

    if output.events.is_empty() {
        println!("No events recorded.");
    } else {
        let rows = output
            .events
            .iter()
            .map(|event| {
                vec![
                    (format_timestamp(&event.event_time), None),
                    (event.event_type.to_string(), event_color(event.event_type)),
                    (event.message.clone(), None),
                ]
            })
            .collect();
        print_table_colored(&["TIME", "TYPE", "MESSAGE"], rows);
    }

    if !output.artifacts.is_empty() {
        println!();
        let rows = output
            .artifacts
            .iter()
            .map(|artifact| {
                vec![
                    artifact.artifact_type.clone(),
                    artifact.file_path.clone(),
                    artifact
                        .file_size
                        .and_then(|size| u64::try_from(size).ok())
                        .map(format_size)
                        .unwrap_or_else(|| "-".to_string()),
                ]
            })
            .collect();
        print_table(&["ARTIFACT", "PATH", "SIZE"], rows);
    }
    Ok(())
}

pub fn run_kpis(args: KpisArgs, config: &PortalConfig) -> anyhow::Result<()> {
    let run_id = parse_run_id(&args.run_id)?;
    let rt = context::runtime()?;
    rt.block_on(kpis_async(run_id, args.json, config))
}

async fn kpis_async(run_id: RunId, json: bool, config: &PortalConfig) -> anyhow::Result<()> {
    let coordinator = context::coordinator(config).await?;
    let result = coordinator.run_kpis(&run_id).await;
    coordinator.db().close().await;
    let kpis = result.map_err(HelpfulError::from)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&KpisOutput { run_id, kpis })?);
        return Ok(());
    }

    match kpis {
        Some(serde_json::Value::Object(map)) => {
            let rows = map
                .iter()
                .map(|(key, value)| {
                    let text = match value {
                        serde_json::Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    vec![key.clone(), text]
                })
                .collect();
            print_table(&["KPI", "VALUE"], rows);
        }
        Some(other) => println!("{}", serde_json::to_string_pretty(&other)?),
        None => println!("No KPIs recorded for run {}.", run_id),
    }
    Ok(())
}

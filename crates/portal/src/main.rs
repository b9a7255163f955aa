//! Fabric portal - operator CLI for the single-slot ETL pipeline
//!
//! One pipeline run may be in flight at a time. The CLI admits runs, polls
//! them, restores the output of earlier runs, and shows the audit trail:
//!
//! - `portal status`            lock holder, active run, last success
//! - `portal submit <input>`    trigger the pipeline for an input file
//! - `portal refresh [run]`     poll once and record any status change
//! - `portal runs` / `show`     run history and per-run audit events
//! - `portal restore <run>`     make a succeeded run's output current again
//! - `portal unlock`            force-release a stuck lock
//!
//! State lives in `~/.fabric_portal/` (override with `PORTAL_HOME`).

mod cli;

use anyhow::Context;
use clap::{Parser, Subcommand};
use cli::config::PortalConfig;
use portal_logging::{ConsoleMode, LogConfig};
use std::process::ExitCode;
use tracing::debug;

#[derive(Parser, Debug)]
#[command(name = "portal")]
#[command(author, version, about = "Run coordination for the Fabric ETL pipeline")]
struct Cli {
    /// Verbose console logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show the pipeline lock, the active run, and run counts
    Status(cli::status::StatusArgs),

    /// Trigger the pipeline for an input file
    ///
    /// Fails without submitting anything if another run holds the lock.
    ///
    /// Examples:
    ///   portal submit sales_2024.xlsx --by alice
    ///   PORTAL_USER=alice portal submit sales_2024.xlsx --json
    Submit(cli::submit::SubmitArgs),

    /// Poll a run once (default: the active run)
    Refresh(cli::refresh::RefreshArgs),

    /// List recent runs
    Runs(cli::runs::RunsArgs),

    /// Show one run with its audit events and artifacts
    Show(cli::runs::ShowArgs),

    /// Show the KPI snapshot of a run
    Kpis(cli::runs::KpisArgs),

    /// Re-run the pipeline to make a succeeded run's output current
    Restore(cli::restore::RestoreArgs),

    /// List restore history
    Restores(cli::restore::RestoresArgs),

    /// Force-release the pipeline lock
    ///
    /// Only for runs known to be dead: the next submit will not wait for
    /// the evicted run.
    Unlock(cli::unlock::UnlockArgs),

    /// Show the resolved configuration (secrets redacted)
    Config(cli::config::ConfigArgs),
}

fn command_wants_json(command: &Commands) -> bool {
    match command {
        Commands::Status(args) => args.json,
        Commands::Submit(args) => args.json,
        Commands::Refresh(args) => args.json,
        Commands::Runs(args) => args.json,
        Commands::Show(args) => args.json,
        Commands::Kpis(args) => args.json,
        Commands::Restore(args) => args.json,
        Commands::Restores(args) => args.json,
        Commands::Unlock(args) => args.json,
        Commands::Config(args) => args.json,
    }
}

fn command_name(command: &Commands) -> &'static str {
    match command {
        Commands::Status(_) => "status",
        Commands::Submit(_) => "submit",
        Commands::Refresh(_) => "refresh",
        Commands::Runs(_) => "runs",
        Commands::Show(_) => "show",
        Commands::Kpis(_) => "kpis",
        Commands::Restore(_) => "restore",
        Commands::Restores(_) => "restores",
        Commands::Unlock(_) => "unlock",
        Commands::Config(_) => "config",
    }
}

fn run_command(command: Commands, config: &PortalConfig) -> anyhow::Result<()> {
    match command {
        Commands::Status(args) => cli::status::run(args, config),
        Commands::Submit(args) => cli::submit::run(args, config),
        Commands::Refresh(args) => cli::refresh::run(args, config),
        Commands::Runs(args) => cli::runs::run_list(args, config),
        Commands::Show(args) => cli::runs::run_show(args, config),
        Commands::Kpis(args) => cli::runs::run_kpis(args, config),
        Commands::Restore(args) => cli::restore::run_restore(args, config),
        Commands::Restores(args) => cli::restore::run_list(args, config),
        Commands::Unlock(args) => cli::unlock::run(args, config),
        Commands::Config(args) => cli::config::run(args, config),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let json_mode = command_wants_json(&cli.command);

    let result = PortalConfig::load()
        .context("Failed to load portal configuration")
        .and_then(|config| {
            // stdout carries JSON in --json mode, so the console stays quiet.
            let console = if json_mode {
                ConsoleMode::Quiet
            } else if cli.verbose {
                ConsoleMode::Verbose
            } else {
                ConsoleMode::Normal
            };
            let log_dir = cli::config::logs_dir(&config.home);
            if let Err(err) = portal_logging::init_logging(LogConfig {
                app_name: "portal",
                log_dir: &log_dir,
                console,
            }) {
                eprintln!("Warning: failed to initialize logging: {:#}", err);
            }

            debug!(command = command_name(&cli.command), home = %config.home.display(), "Running command");
            run_command(cli.command, &config)
        });

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            if json_mode {
                cli::error::print_json_error(&err);
            } else {
                eprintln!("{:?}", err);
            }
            ExitCode::from(1)
        }
    }
}

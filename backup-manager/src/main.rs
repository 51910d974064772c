//! Backup Manager - Main entry point
//!
//! Personal ZIP backups with integrity hashes, history, selective restore
//! and scheduled runs.

mod config;
mod logger;
mod scheduler;
mod service;

use crate::config::AppConfig;
use crate::scheduler::BackupScheduler;
use crate::service::{BackupService, Outcome};
use backup_engine::models::NewProfile;
use backup_engine::RestorePlan;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::signal;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Service health and the most recent backup
    Status,

    /// Back up files and directories (configured sources when none given)
    Backup {
        sources: Vec<PathBuf>,

        /// Directory to write the archive to
        #[arg(short, long)]
        destination: Option<PathBuf>,
    },

    /// Back up using a stored profile (the default profile when omitted)
    BackupProfile { profile: Option<i64> },

    /// Most recent backups
    History {
        #[arg(short = 'n', long, default_value_t = 20)]
        limit: usize,
    },

    /// Most recent restores
    Restores {
        #[arg(short = 'n', long, default_value_t = 20)]
        limit: usize,
    },

    /// Archives present in the backup directory
    List,

    /// Members and root groups of an archive
    Preview { name: String },

    /// Restore an archive, optionally only the selected prefixes
    Restore {
        name: String,

        #[arg(short, long)]
        destination: Option<PathBuf>,

        /// Expected hash (looked up in history when omitted)
        #[arg(long)]
        hash: Option<String>,

        /// Member prefix to restore; repeatable
        #[arg(short, long = "select")]
        select: Vec<String>,
    },

    /// Download an archive from the mirror and restore it
    RestoreRemote {
        name: String,

        #[arg(short, long)]
        destination: Option<PathBuf>,

        #[arg(short, long = "select")]
        select: Vec<String>,
    },

    /// Delete all but the newest archives
    Cleanup {
        #[arg(short, long)]
        keep: Option<usize>,
    },

    /// Check an archive against its hash
    Verify {
        name: String,

        #[arg(long)]
        hash: Option<String>,
    },

    /// Manage backup profiles
    #[command(subcommand)]
    Profile(ProfileCommand),

    /// Send the daily report now
    Report,

    /// Run scheduled backups until interrupted
    Schedule {
        #[arg(short, long)]
        profile: Option<i64>,
    },
}

#[derive(Subcommand, Debug)]
enum ProfileCommand {
    List {
        #[arg(short = 'n', long, default_value_t = 50)]
        limit: usize,
    },
    Show {
        id: i64,
    },
    Create {
        name: String,

        /// Source path; repeatable
        #[arg(short, long = "source", required = true)]
        sources: Vec<String>,

        #[arg(long)]
        backup_dir: String,

        #[arg(long)]
        restore_dir: String,

        /// daily, weekly or monthly
        #[arg(long, default_value = "daily")]
        frequency: String,

        /// Daily report time as H:MM; enables the report
        #[arg(long)]
        report_time: Option<String>,

        #[arg(long)]
        recipient: Option<String>,

        /// Make this the default profile
        #[arg(long)]
        default: bool,
    },
    SetDefault {
        id: i64,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let app = AppConfig::load(cli.config.as_deref())?;

    let log_level = cli.log_level.as_deref().unwrap_or(&app.log.level);
    let log = logger::init(log_level, app.log.dir.as_deref())?;

    tracing::info!("Starting backup-manager v{}", env!("CARGO_PKG_VERSION"));

    let service = Arc::new(BackupService::from_config(&app, &log)?);

    match cli.command {
        Command::Schedule { profile } => schedule(service, app, profile).await,
        command => tokio::task::spawn_blocking(move || execute(&service, command)).await?,
    }
}

fn execute(service: &BackupService, command: Command) -> anyhow::Result<ExitCode> {
    match command {
        Command::Status => print(service.status()),
        Command::Backup {
            sources,
            destination,
        } => print(service.run_backup_from_sources(&sources, destination.as_deref())),
        Command::BackupProfile { profile } => print(service.run_backup_from_profile(profile)),
        Command::History { limit } => print(service.history(limit)),
        Command::Restores { limit } => print(service.restore_history(limit)),
        Command::List => print(service.list_backups()),
        Command::Preview { name } => print(service.preview(&name)),
        Command::Restore {
            name,
            destination,
            hash,
            select,
        } => {
            let outcome = if select.is_empty() {
                service.restore_full(&name, destination.as_deref(), hash.as_deref())
            } else {
                service.restore_partial(&name, &select, destination.as_deref(), hash.as_deref())
            };
            print(outcome)
        }
        Command::RestoreRemote {
            name,
            destination,
            select,
        } => {
            let plan = if select.is_empty() {
                RestorePlan::Full
            } else {
                RestorePlan::Partial(select)
            };
            print(service.restore_from_mirror(&name, &plan, destination.as_deref()))
        }
        Command::Cleanup { keep } => print(service.cleanup(keep)),
        Command::Verify { name, hash } => print(service.verify(&name, hash.as_deref())),
        Command::Profile(command) => profile(service, command),
        Command::Report => print(service.send_daily_report_now()),
        Command::Schedule { .. } => anyhow::bail!("schedule must run on the async runtime"),
    }
}

fn profile(service: &BackupService, command: ProfileCommand) -> anyhow::Result<ExitCode> {
    match command {
        ProfileCommand::List { limit } => print(service.list_profiles(limit)),
        ProfileCommand::Show { id } => print(service.get_profile(id)),
        ProfileCommand::Create {
            name,
            sources,
            backup_dir,
            restore_dir,
            frequency,
            report_time,
            recipient,
            default,
        } => {
            let mut data = NewProfile::new(name, sources, backup_dir, restore_dir);
            data.backup_frequency = frequency;
            if let Some(time) = report_time {
                data.daily_report_enable = true;
                data.daily_report_time = time;
            }
            data.recipient_email = recipient;
            data.is_default = default;
            print(service.create_profile(&data))
        }
        ProfileCommand::SetDefault { id } => print(service.set_default_profile(id)),
    }
}

fn print<T: Serialize>(outcome: Outcome<T>) -> anyhow::Result<ExitCode> {
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(if outcome.ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn schedule(
    service: Arc<BackupService>,
    app: AppConfig,
    profile: Option<i64>,
) -> anyhow::Result<ExitCode> {
    let scheduler = BackupScheduler::new(service, app.schedule).await?;
    let plan = scheduler.start(profile).await?;
    println!(
        "Scheduled backups ({}){}. Press Ctrl+C to stop.",
        plan.backup_cron,
        plan.report_cron
            .as_deref()
            .map(|cron| format!(", daily report ({cron})"))
            .unwrap_or_default()
    );

    shutdown_signal().await;

    tracing::info!("Shutting down...");
    if let Err(e) = scheduler.stop().await {
        tracing::warn!("Scheduler shutdown error: {}", e);
    }
    Ok(ExitCode::SUCCESS)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for ctrl+c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received SIGINT"),
        _ = terminate => tracing::info!("Received SIGTERM"),
    }
}

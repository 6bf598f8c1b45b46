//! Subcommand handlers.

use anyhow::Context;
use std::fmt::Write as _;
use std::time::Duration;
use tracing::info;

use shuttle_core::app::StatusReport;
use shuttle_core::config::ShuttleConfig;
use shuttle_core::domain::{Candidate, LockName, PostingId};

use crate::cli::{Cli, Commands, LockCommands, OutputFormat, PostingCommands};
use crate::control::{self, StateOwner};
use crate::daemon;
use crate::runtime::{ControlRequest, Runtime};

const REPLY_WAIT: Duration = Duration::from_secs(30);

pub fn load_config(cli: &Cli) -> anyhow::Result<ShuttleConfig> {
    let mut config = match &cli.config {
        Some(path) => ShuttleConfig::load(path)?,
        None => ShuttleConfig::default(),
    };
    if let Some(dir) = &cli.state_dir {
        config.state_dir = dir.clone();
    }
    config.validate()?;
    Ok(config)
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(&cli)?;
    let request = match cli.command {
        Commands::Run => return daemon::run(config).await,
        Commands::Tick => return print_json(&daemon::tick(config).await?),
        Commands::Status { top, output } => {
            let value = operate(config, ControlRequest::Status { top }).await?;
            return match output {
                OutputFormat::Json => print_json(&value),
                OutputFormat::Table => {
                    let report: StatusReport = serde_json::from_value(value)?;
                    print!("{}", render_status(&report));
                    Ok(())
                }
            };
        }
        Commands::Submit { candidate } => {
            let candidate: Candidate =
                serde_json::from_str(&candidate).context("candidate is not valid JSON")?;
            ControlRequest::Submit { candidate }
        }
        Commands::Lock {
            command: LockCommands::Expire { name, who },
        } => ControlRequest::ExpireLock {
            lock: LockName::new(name),
            operator: who.operator,
            reason: who.reason,
        },
        Commands::Posting {
            command:
                PostingCommands::Force {
                    id,
                    state,
                    who,
                    evidence,
                },
        } => ControlRequest::ForceState {
            id: PostingId::new(id),
            to: state.into(),
            operator: who.operator,
            reason: who.reason,
            evidence,
        },
        Commands::Compact => ControlRequest::Compact,
        Commands::Sweep { limit } => ControlRequest::Sweep { limit },
    };
    print_json(&operate(config, request).await?)
}

/// Execute in-process, or forward to the daemon when one owns the state dir.
async fn operate(config: ShuttleConfig, request: ControlRequest) -> anyhow::Result<serde_json::Value> {
    tokio::fs::create_dir_all(&config.state_dir)
        .await
        .with_context(|| format!("failed to create {}", config.state_dir.display()))?;
    match StateOwner::acquire(&config.state_dir) {
        Ok(_owner) => Runtime::open(config, false).await?.execute(request).await,
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            info!(state_dir = %config.state_dir.display(), "daemon running; forwarding request");
            control::forward(&config.state_dir, &request, REPLY_WAIT).await
        }
        Err(e) => Err(e).context("failed to take the state dir"),
    }
}

fn print_json(value: &serde_json::Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn render_status(report: &StatusReport) -> String {
    let mut out = String::new();
    let t = &report.totals;
    let _ = writeln!(
        out,
        "backlog {} (pending {}, claimed {}, deferred {}, applied {}, skipped {})",
        report.backlog, t.pending, t.claimed, t.deferred, t.applied, t.skipped
    );
    for view in &report.partitions {
        let c = &view.counts;
        let lock = match &view.lock {
            Some(lock) => format!("locked by {} until {}", lock.holder, lock.expires_at.format("%H:%M:%S")),
            None => "unlocked".to_string(),
        };
        let _ = writeln!(
            out,
            "\n{}{}  pending {}  claimed {}  deferred {}  applied {}  skipped {}  {}",
            view.partition,
            if view.enabled { "" } else { " (disabled)" },
            c.pending,
            c.claimed,
            c.deferred,
            c.applied,
            c.skipped,
            lock
        );
        for entry in &view.top {
            let label = match (&entry.company, &entry.title) {
                (Some(company), Some(title)) => format!("{company} / {title}"),
                (Some(name), None) | (None, Some(name)) => name.clone(),
                (None, None) => entry.id.to_string(),
            };
            let _ = writeln!(out, "  {:>4}  {}  {}", entry.score, label, entry.url);
        }
    }
    if !report.parked.is_empty() {
        let _ = writeln!(out, "\nparked ({}):", report.parked.len());
        for id in &report.parked {
            let _ = writeln!(out, "  {id}");
        }
    }
    out
}

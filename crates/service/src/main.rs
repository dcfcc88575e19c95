use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, info};

use service::companion::CompanionKind;
use service::runtime::boot;
use service::store::StoredLog;

#[derive(Debug, Parser)]
#[command(name = "klog", version, about = "Klipper log classification and telemetry analytics")]
struct Cli {
    /// Config file; defaults to $KLOG_CONFIG_FILE or /etc/klog/service.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Store a klippy.log (plus companions) and print its report
    Analyze {
        log: PathBuf,
        #[arg(long)]
        dmesg: Option<PathBuf>,
        #[arg(long)]
        moonraker: Option<PathBuf>,
        #[arg(long)]
        debug: Option<PathBuf>,
    },
    /// Print the report of a stored log
    Show { digest: String },
    /// List stored logs, newest first
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let basic_tracing = boot::init_logging_basic();
    let config = boot::load_config(cli.config.as_deref()).context("Failed to load configuration")?;
    drop(basic_tracing);
    boot::init_logging(&config.logging);

    let state = boot::boot(config).context("Failed to initialize application state")?;

    match cli.command {
        Command::Analyze {
            log,
            dmesg,
            moonraker,
            debug,
        } => {
            let bytes = read(&log).await?;
            let mut companions = Vec::new();
            for (kind, path) in [
                (CompanionKind::Dmesg, dmesg),
                (CompanionKind::Moonraker, moonraker),
                (CompanionKind::Debug, debug),
            ] {
                if let Some(path) = path {
                    companions.push((kind, read(&path).await?));
                }
            }

            let digest = state
                .ingest(bytes, companions)
                .await
                .with_context(|| format!("Failed to store {}", log.display()))?;
            info!(%digest, "Stored log");

            let report = state
                .analyze(&digest)
                .await
                .with_context(|| format!("Failed to analyze {}", log.display()))?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Show { digest } => {
            let report = state
                .analyze(&digest)
                .await
                .with_context(|| format!("Failed to load report for {digest}"))?;
            let stored = state.store.describe(&digest)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            info!(expires = %stored.expires, "Report expires");
        }
        Command::List => {
            let logs = state.store.list().context("Failed to list stored logs")?;
            print_listing(&logs);
        }
    }

    debug!(metrics = ?state.metrics.snapshot(), "Done");
    Ok(())
}

async fn read(path: &Path) -> Result<Vec<u8>> {
    tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))
}

fn print_listing(logs: &[StoredLog]) {
    println!("{:<64}  {:>10}  {:<20}  {:<20}  ANALYZED  COMPANIONS", "DIGEST", "SIZE", "UPLOADED", "EXPIRES");
    for log in logs {
        let companions: Vec<&str> = log.companions.iter().map(|k| k.suffix()).collect();
        println!(
            "{:<64}  {:>10}  {:<20}  {:<20}  {:<8}  {}",
            log.digest,
            log.size,
            log.uploaded.format("%Y-%m-%d %H:%M:%S"),
            log.expires.format("%Y-%m-%d %H:%M:%S"),
            if log.analyzed { "yes" } else { "no" },
            companions.join(",")
        );
    }
}

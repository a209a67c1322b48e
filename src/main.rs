//! channel-harvest command line
//!
//! Records go to stdout (or `--output`) as JSON lines; logs go to stderr and
//! the log file.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use channel_harvest_lib::application::{CrawlOptions, HarvestUseCases, JsonLinesSink};
use channel_harvest_lib::domain::{ContentKind, RecordSink};
use channel_harvest_lib::infrastructure::{init_logging_with_config, AppConfig, ConfigManager};

#[derive(Parser)]
#[command(name = "channel-harvest")]
#[command(version, about = "Enumerate channel content and track what has been ingested")]
struct Cli {
    /// Configuration file; defaults to the user config directory
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl one or more tabs of a channel and emit new items as JSON lines
    Crawl {
        /// Channel handle, e.g. @somechannel
        channel: String,

        /// Tabs to crawl; repeat for concurrent crawls
        #[arg(long = "kind", default_value = "videos")]
        kinds: Vec<ContentKind>,

        /// Items kept per tab. Without it the configured crawl.max_items_per_run applies (40 by default, null for no cap)
        #[arg(long)]
        max_items: Option<usize>,

        /// Process items again regardless of stored status
        #[arg(long)]
        reingest: bool,

        /// Keep ingest state in memory only
        #[arg(long)]
        dry_run: bool,

        /// Record items from listing data without opening watch pages
        #[arg(long)]
        listing_only: bool,

        /// Append records to this file instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Print channel metadata as JSON
    Channel { channel: String },

    /// Print per-status ingest counts
    Status {
        channel: String,
        #[arg(long, default_value = "videos")]
        kind: ContentKind,
    },

    /// Record ids as already uploaded so crawls skip them
    MarkUploaded {
        channel: String,
        #[arg(long, default_value = "videos")]
        kind: ContentKind,
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Write the default configuration file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

async fn load_config(path: Option<&PathBuf>) -> Result<AppConfig> {
    match path {
        Some(path) => AppConfig::from_file(path),
        None => ConfigManager::new()?.load_config().await,
    }
}

/// Cancel `token` on the first Ctrl-C
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("🛑 Interrupt received, stopping at the next safe point");
                token.cancel();
            }
            Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
        }
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::InitConfig { force } = &cli.command {
        let manager = match &cli.config {
            Some(path) => ConfigManager::with_path(path.clone()),
            None => ConfigManager::new()?,
        };
        if manager.config_path().exists() && !force {
            println!("Configuration already exists at {}", manager.config_path().display());
            return Ok(());
        }
        manager.save_config(&AppConfig::default()).await?;
        println!("Wrote default configuration to {}", manager.config_path().display());
        return Ok(());
    }

    let config = load_config(cli.config.as_ref()).await?;
    init_logging_with_config(&config.logging)?;

    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    match cli.command {
        Commands::Crawl {
            channel,
            kinds,
            max_items,
            reingest,
            dry_run,
            listing_only,
            output,
        } => {
            let use_cases = if dry_run {
                info!("Dry run: ingest state will not be stored");
                HarvestUseCases::dry_run(config)
            } else {
                HarvestUseCases::open(config).await?
            };

            let sink = Arc::new(match &output {
                Some(path) => JsonLinesSink::to_file(path).await?,
                None => JsonLinesSink::stdout(),
            });

            let mut seen = HashSet::new();
            let requests: Vec<CrawlOptions> = kinds
                .into_iter()
                .filter(|kind| seen.insert(*kind))
                .map(|kind| CrawlOptions {
                    max_items,
                    reingest,
                    ..CrawlOptions::new(channel.clone(), kind)
                })
                .collect();

            let sink_handle: Arc<dyn RecordSink> = Arc::clone(&sink) as Arc<dyn RecordSink>;
            let results = use_cases.crawl(&requests, listing_only, sink_handle, cancel).await?;

            let mut failures = 0;
            for result in results {
                match result {
                    Ok(report) => info!(
                        "✅ {}/{}: {} new item(s), {} page(s), stopped by {:?}",
                        report.channel,
                        report.kind,
                        report.newly_processed(),
                        report.pages_fetched,
                        report.stop_reason
                    ),
                    Err(e) => {
                        failures += 1;
                        error!("❌ {:#}", e);
                    }
                }
            }
            eprintln!("{} record(s) written", sink.written());
            if failures > 0 {
                anyhow::bail!("{failures} crawl(s) failed");
            }
        }
        Commands::Channel { channel } => {
            let use_cases = HarvestUseCases::dry_run(config);
            let metadata = use_cases.channel_metadata(&channel, cancel).await?;
            println!(
                "{}",
                serde_json::to_string_pretty(&metadata).context("Failed to serialize channel metadata")?
            );
        }
        Commands::Status { channel, kind } => {
            let use_cases = HarvestUseCases::open(config).await?;
            let summary = use_cases.status(&channel, kind).await?;
            println!("{}/{}: {} tracked item(s)", summary.channel, summary.kind, summary.total);
            for (status, count) in &summary.counts {
                println!("  {:<12} {count}", status.as_str());
            }
        }
        Commands::MarkUploaded { channel, kind, ids } => {
            let use_cases = HarvestUseCases::open(config).await?;
            let marked = use_cases.mark_uploaded(&channel, kind, &ids).await?;
            println!("Marked {marked} item(s) as uploaded");
        }
        Commands::InitConfig { .. } => {}
    }

    Ok(())
}

//! Option liquidity ranking CLI.
//!
//! # Usage
//!
//! ```bash
//! # Set API token
//! export XIGNITE_API_TOKEN=your-token
//!
//! # Rank the full OPRA universe with the default configuration
//! liquidity-rank run --config config/default.toml
//!
//! # Quick run over the first 50 tickers
//! liquidity-rank run --limit 50
//!
//! # Show the expiry window a run would target
//! liquidity-rank window --date 2024-01-10
//!
//! # Count option underlyings per exchange
//! liquidity-rank tickers --exchanges OPRA,XNAS
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use liquidity_rank::analytics::{ExpiryWindow, LiquidityTier};
use liquidity_rank::data::{TickerUniverse, VolRankFile, XigniteClient};
use liquidity_rank::pipeline::LiquidityRun;
use liquidity_rank::report::write_frame;
use liquidity_rank::RunConfig;

const SEPARATOR: &str = "============================================================";

#[derive(Parser)]
#[command(name = "liquidity-rank")]
#[command(about = "Rank option underlyings by near-the-money liquidity")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the liquidity report and tracker
    Run {
        /// Path to configuration file (defaults apply when omitted)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// IV rank export (CSV or Parquet)
        #[arg(long)]
        vol_data: Option<PathBuf>,

        /// Report output path (.csv or .parquet)
        #[arg(long)]
        report: Option<PathBuf>,

        /// Tracker output path (.csv or .parquet)
        #[arg(long)]
        tracker: Option<PathBuf>,

        /// Only process the first N tickers
        #[arg(long)]
        limit: Option<usize>,

        /// Run as of this date (YYYY-MM-DD), default today
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Print the expiry window for a date
    Window {
        /// Reference date (YYYY-MM-DD), default today
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Count option underlyings per exchange
    Tickers {
        /// Comma-separated exchanges
        #[arg(short, long, default_value = "OPRA")]
        exchanges: String,

        /// Path to configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn load_config(path: Option<&Path>) -> Result<RunConfig> {
    match path {
        Some(path) => RunConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => Ok(RunConfig::default()),
    }
}

fn xignite_client(config: &RunConfig) -> Result<Arc<XigniteClient>> {
    let token_env = &config.xignite.token_env;
    let token = std::env::var(token_env)
        .with_context(|| format!("{} environment variable not set", token_env))?;
    Ok(Arc::new(XigniteClient::new(token, &config.xignite)?))
}

struct RunArgs {
    config: Option<PathBuf>,
    vol_data: Option<PathBuf>,
    report: Option<PathBuf>,
    tracker: Option<PathBuf>,
    limit: Option<usize>,
    date: Option<NaiveDate>,
}

async fn cmd_run(args: RunArgs) -> Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(path) = args.vol_data {
        config.output.vol_data_path = Some(path);
    }
    if let Some(path) = args.report {
        config.output.report_path = path;
    }
    if let Some(path) = args.tracker {
        config.output.tracker_path = Some(path);
    }

    let today = args.date.unwrap_or_else(|| Local::now().date_naive());
    let client = xignite_client(&config)?;

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")?
            .progress_chars("=>-"),
    );
    pb.set_message("batches");

    let mut run = LiquidityRun::new(
        client.clone(),
        client.clone(),
        client.clone(),
        client.clone(),
        config.run_settings(args.limit),
    )
    .with_progress(pb.clone());
    if let Some(path) = &config.output.vol_data_path {
        run = run.with_vol_ranks(Arc::new(VolRankFile::new(path)));
    }

    let start_time = Instant::now();
    let report = run.execute(today).await?;
    pb.finish_with_message("batches complete");

    let mut report_df = report.report_frame()?;
    write_frame(&config.output.report_path, &mut report_df)?;

    if let Some(path) = &config.output.tracker_path {
        let mut tracker_df = report.tracker_frame()?;
        write_frame(path, &mut tracker_df)?;
    }

    let elapsed = start_time.elapsed();
    info!(
        "Run finished in {:.1}s with {} API requests",
        elapsed.as_secs_f64(),
        client.request_count()
    );

    println!("\n{}", SEPARATOR);
    println!("Liquidity Report {}", report.generated_on);
    println!("{}", SEPARATOR);
    println!("  Expiration: {}", report.window.third_friday);
    println!("  Tickers: {}", report.universe_size);
    println!("  Batches: {}", report.batches);
    println!("  Failed chain fetches: {}", report.failed_tickers.len());
    println!("  Symbols ranked: {}", report.rows.len());
    for tier in [
        LiquidityTier::VeryLiquid,
        LiquidityTier::SomewhatLiquid,
        LiquidityTier::NotVeryLiquid,
    ] {
        println!("    {}: {}", tier, report.tier_count(tier));
    }
    println!("  Report: {}", config.output.report_path.display());
    if let Some(path) = &config.output.tracker_path {
        println!("  Tracker: {}", path.display());
    }
    println!("  Elapsed time: {:.1} minutes", elapsed.as_secs_f64() / 60.0);

    Ok(())
}

fn cmd_window(date: Option<NaiveDate>) {
    let today = date.unwrap_or_else(|| Local::now().date_naive());
    let window = ExpiryWindow::for_date(today);

    println!("Reference date: {}", today);
    println!("  Expiration: {} ({}/{})", window.third_friday, window.month(), window.year());
    println!("  Window: {} to {}", window.from_date, window.to_date);
}

async fn cmd_tickers(exchanges: &str, config: Option<&Path>) -> Result<()> {
    let config = load_config(config)?;
    let client = xignite_client(&config)?;

    for exchange in exchanges.split(',').map(|s| s.trim()).filter(|s| !s.is_empty()) {
        match client.fetch_tickers(exchange).await {
            Ok(tickers) => println!("{}: {} underlyings", exchange, tickers.len()),
            Err(e) => println!("{}: ERROR - {}", exchange, e),
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("liquidity_rank=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            vol_data,
            report,
            tracker,
            limit,
            date,
        } => {
            cmd_run(RunArgs {
                config,
                vol_data,
                report,
                tracker,
                limit,
                date,
            })
            .await?;
        }
        Commands::Window { date } => cmd_window(date),
        Commands::Tickers { exchanges, config } => {
            cmd_tickers(&exchanges, config.as_deref()).await?;
        }
    }

    Ok(())
}

//! Shelf-Scrape main entry point
//!
//! This is the command-line interface for the Shelf-Scrape list scraper.

use anyhow::Context;
use clap::Parser;
use shelf_scrape::config::{resolve_config, ConfigOverrides, ScraperConfig};
use shelf_scrape::output::{load_statistics, print_statistics, print_summary};
use shelf_scrape::storage::CsvStore;
use shelf_scrape::Coordinator;
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Shelf-Scrape: a resumable book-list scraper
///
/// Shelf-Scrape walks the pages of a public book list, stores one CSV row
/// per book, optionally downloads cover images, and saves after every page
/// so an interrupted run continues where it stopped.
#[derive(Parser, Debug)]
#[command(name = "shelf-scrape")]
#[command(version = "1.0.0")]
#[command(about = "A resumable book-list scraper", long_about = None)]
struct Cli {
    /// Path to an optional TOML configuration file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// List identifier, e.g. 1.Best_Books_Ever
    #[arg(long)]
    list_id: Option<String>,

    /// First page to scrape
    #[arg(long)]
    start_page: Option<u32>,

    /// Last page to scrape (inclusive)
    #[arg(long)]
    end_page: Option<u32>,

    /// Do not download cover images
    #[arg(long)]
    no_covers: bool,

    /// Maximum cover downloads per page
    #[arg(long)]
    max_covers_per_page: Option<u32>,

    /// Seconds to wait between list pages
    #[arg(long, value_name = "SECONDS")]
    delay_pages: Option<f64>,

    /// Seconds to wait between cover downloads
    #[arg(long, value_name = "SECONDS")]
    delay_covers: Option<f64>,

    /// CSV output path
    #[arg(long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Directory for cover images
    #[arg(long, value_name = "DIR")]
    covers_dir: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Ignore the existing output file and start over
    #[arg(long, conflicts_with = "rescrape")]
    fresh: bool,

    /// Keep existing records but scrape from the start page again
    #[arg(long, conflicts_with = "fresh")]
    rescrape: bool,

    /// Validate config and show what would be scraped without scraping
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show statistics from the existing output file and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            list_id: self.list_id.clone(),
            start_page: self.start_page,
            end_page: self.end_page,
            no_covers: self.no_covers,
            max_covers_per_page: self.max_covers_per_page,
            delay_pages: self.delay_pages,
            delay_covers: self.delay_covers,
            output: self.output.clone(),
            covers_dir: self.covers_dir.clone(),
            rescrape: self.rescrape,
            verbose: self.verbose > 0,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // The config file may raise verbosity, so it is read before logging starts
    let resolved = resolve_config(cli.config.as_deref(), &cli.overrides());
    let file_verbose = resolved.as_ref().map(|(c, _)| c.verbose).unwrap_or(false);
    setup_logging(cli.verbose.max(u8::from(file_verbose)), cli.quiet);

    let (config, config_hash) = match resolved {
        Ok(resolved) => resolved,
        Err(e) => {
            tracing::error!("Invalid configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let (Some(path), Some(hash)) = (&cli.config, &config_hash) {
        tracing::info!("Configuration loaded from {} (hash: {})", path.display(), hash);
    }

    let result = if cli.dry_run {
        handle_dry_run(&config)
    } else if cli.stats {
        handle_stats(&config)
    } else {
        handle_scrape(config, cli.fresh).await
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("shelf_scrape=info,warn"),
            1 => EnvFilter::new("shelf_scrape=debug,info"),
            2 => EnvFilter::new("shelf_scrape=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: validates config and shows what would be scraped
fn handle_dry_run(config: &ScraperConfig) -> anyhow::Result<ExitCode> {
    println!("=== Shelf-Scrape Dry Run ===\n");

    println!("List:");
    println!("  Id: {}", config.list.id);
    println!("  Pages: {}-{}", config.list.start_page, config.list.end_page);
    println!("  Site: {}", config.list.base_url);
    println!("  Resume after last stored page: {}", config.list.resume_after_last_page);

    println!("\nCovers:");
    if config.covers.enabled {
        println!("  Directory: {}", config.covers.directory.display());
        println!("  Max per page: {}", config.covers.max_per_page);
        println!("  Delay: {}s", config.covers.delay);
    } else {
        println!("  Disabled");
    }

    println!("\nNetwork:");
    println!("  Delay between pages: {}s", config.network.delay_between_pages);
    println!("  Request timeout: {}s", config.network.request_timeout);
    println!("  Attempts per request: {}", config.network.retry_attempts);
    println!("  Rate-limit cooldown: {}s", config.network.rate_limit_wait);
    println!("  User agent: {}", config.network.user_agent);

    println!("\nOutput:");
    println!("  CSV: {}", config.csv_path().display());

    println!("\nPlanned pages:");
    for page in config.list.start_page..=config.list.end_page {
        let url = config
            .list_page_url(page)
            .with_context(|| format!("building URL for page {}", page))?;
        println!("  {}", url);
    }

    println!("\n✓ Configuration is valid");
    Ok(ExitCode::SUCCESS)
}

/// Handles the --stats mode: shows statistics from the output file
fn handle_stats(config: &ScraperConfig) -> anyhow::Result<ExitCode> {
    let path = config.csv_path();
    println!("Output file: {}\n", path.display());

    let store = CsvStore::new(&path);
    let stats = load_statistics(&store)
        .with_context(|| format!("reading {}", path.display()))?;
    print_statistics(&stats);

    Ok(ExitCode::SUCCESS)
}

/// Handles the main scrape operation
async fn handle_scrape(config: ScraperConfig, fresh: bool) -> anyhow::Result<ExitCode> {
    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping after the current step");
            signal_token.cancel();
        }
    });

    let mut coordinator = Coordinator::new(config, cancel)
        .context("setting up the scraper")?
        .fresh(fresh);
    let report = coordinator.run().await.context("running the scrape")?;

    print_summary(&report);

    if report.is_success() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

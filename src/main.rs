//! Sitesnap main entry point
//!
//! This is the command-line interface for the Sitesnap site snapshotter.

use anyhow::{bail, Context};
use clap::Parser;
use std::path::PathBuf;
use sitesnap::config::{compute_config_hash, parse_config, validate, Config};
use sitesnap::crawler::{run_crawl, RunLimits};
use sitesnap::output::print_summary;
use sitesnap::{CrawlMode, PageScope};
use tracing_subscriber::EnvFilter;

/// Sitesnap: a polite site snapshotter
///
/// Sitesnap crawls one website while respecting robots.txt and rate limits, records
/// an SEO snapshot of every page as CSV tables, mirrors the page assets for offline
/// browsing, and packages everything into a zip archive. With `--mode archive` the
/// site is replayed from a web archive snapshot instead.
#[derive(Parser, Debug)]
#[command(name = "sitesnap")]
#[command(version)]
#[command(about = "A polite site snapshotter", long_about = None)]
struct Cli {
    /// URL to start crawling from (overrides the config file)
    #[arg(value_name = "START_URL")]
    start_url: Option<String>,

    /// Path to TOML configuration file
    #[arg(short, long, value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Maximum number of pages to admit
    #[arg(long, value_name = "N")]
    max_pages: Option<usize>,

    /// Number of concurrent workers
    #[arg(long, value_name = "N")]
    concurrency: Option<usize>,

    /// Page request timeout in seconds
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Where pages come from: live or archive
    #[arg(long, value_name = "MODE")]
    mode: Option<CrawlMode>,

    /// Archive snapshot timestamp (YYYYMMDDhhmmss); the latest one when omitted
    #[arg(long, value_name = "TS")]
    snapshot: Option<String>,

    /// Treat subdomains of the start host as part of the site
    #[arg(long)]
    allow_subdomains: bool,

    /// Which pages to crawl: both, landing or blog
    #[arg(long, value_name = "SCOPE")]
    scope: Option<PageScope>,

    /// Path of the zip archive to write
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Validate the configuration and show what would be crawled without crawling
    #[arg(long)]
    dry_run: bool,

    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    let config = build_config(&cli)?;
    validate(&config).context("invalid configuration")?;

    if cli.dry_run {
        handle_dry_run(&config);
        return Ok(());
    }

    handle_crawl(config).await
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("sitesnap=info,warn"),
            1 => EnvFilter::new("sitesnap=debug,info"),
            _ => EnvFilter::new("sitesnap=trace,debug"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Loads the config file (if any) and layers the command-line flags on top
fn build_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            let config = parse_config(path)
                .with_context(|| format!("failed to load {}", path.display()))?;
            let hash = compute_config_hash(path)?;
            tracing::info!("Configuration loaded (hash: {})", hash);
            config
        }
        None => Config::default(),
    };

    let crawler = &mut config.crawler;
    if let Some(url) = &cli.start_url {
        crawler.start_url = url.clone();
    }
    if let Some(max_pages) = cli.max_pages {
        crawler.max_pages = max_pages;
    }
    if let Some(concurrency) = cli.concurrency {
        crawler.concurrency = concurrency;
    }
    if let Some(timeout) = cli.timeout {
        crawler.timeout_secs = timeout;
    }
    if let Some(mode) = cli.mode {
        crawler.mode = mode;
    }
    if let Some(ts) = &cli.snapshot {
        crawler.snapshot_timestamp = Some(ts.clone());
    }
    if cli.allow_subdomains {
        crawler.allow_subdomains = true;
    }
    if let Some(scope) = cli.scope {
        crawler.page_scope = scope;
    }
    if let Some(output) = &cli.output {
        config.output.archive_path = output.display().to_string();
    }

    if config.crawler.start_url.trim().is_empty() {
        bail!("no start URL given: pass START_URL or set crawler.start-url in the config file");
    }
    Ok(config)
}

/// Handles the --dry-run mode: shows the effective settings
fn handle_dry_run(config: &Config) {
    let limits = RunLimits::for_config(config);

    println!("=== Sitesnap Dry Run ===\n");

    println!("Crawl:");
    println!("  Start URL: {}", config.crawler.start_url);
    println!("  Mode: {}", config.crawler.mode);
    if let Some(ts) = &config.crawler.snapshot_timestamp {
        println!("  Snapshot timestamp: {}", ts);
    }
    println!("  Max pages: {}", config.crawler.max_pages);
    println!("  Workers: {}", limits.concurrency);
    println!("  Timeout: {}s", limits.timeout.as_secs());
    println!("  Page scope: {:?}", config.crawler.page_scope);
    println!("  Subdomains: {}", config.crawler.allow_subdomains);
    println!("  Obey robots.txt: {}", config.crawler.obey_robots);

    println!("\nRates (requests/second):");
    println!("  Pages: {}", limits.page_rps);
    println!("  Image probes: {}", limits.image_rps);
    println!("  Assets: {}", limits.asset_rps);

    println!("\nMirror:");
    println!("  Enabled: {}", config.mirror.enabled);
    println!("  External assets: {}", config.mirror.external_assets);

    println!("\nUser Agent: {}", config.user_agent.header_value());
    println!("Output: {}", config.output.archive_path);

    println!("\n✓ Configuration is valid");
}

/// Handles the main crawl operation
async fn handle_crawl(config: Config) -> anyhow::Result<()> {
    let output = PathBuf::from(&config.output.archive_path);

    let report = match run_crawl(config).await {
        Ok(report) => report,
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            return Err(e.into());
        }
    };

    std::fs::write(&output, &report.archive)
        .with_context(|| format!("failed to write {}", output.display()))?;
    tracing::info!("Wrote {}", output.display());

    print_summary(&report.summary);
    Ok(())
}

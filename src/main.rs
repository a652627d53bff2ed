//! Sumi-Sieve main entry point
//!
//! This is the command-line interface for the Sumi-Sieve search crawler.

use anyhow::Context;
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use sumi_sieve::config::{load_config_with_hash, Config};
use sumi_sieve::crawler::{check_session, crawl, root_scopes};
use sumi_sieve::scope::SearchQuery;
use sumi_sieve::RegionTable;
use tracing_subscriber::EnvFilter;

/// Sumi-Sieve: a partitioning search crawler
///
/// Sumi-Sieve collects every post matching a set of keywords over a date
/// range. Result sets larger than the search page can paginate are split by
/// day, hour, province and city until each part fits.
#[derive(Parser, Debug)]
#[command(name = "sumi-sieve")]
#[command(version = "1.0.0")]
#[command(about = "A partitioning search crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show the root scopes without crawling
    #[arg(long, conflicts_with_all = ["check", "stats", "export_csv"])]
    dry_run: bool,

    /// Only check that the session cookie is accepted
    #[arg(long, conflicts_with_all = ["dry_run", "stats", "export_csv"])]
    check: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with_all = ["dry_run", "check", "export_csv"])]
    stats: bool,

    /// Export stored posts to one CSV file per keyword and exit
    #[arg(long, conflicts_with_all = ["dry_run", "check", "stats"])]
    export_csv: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    let regions = RegionTable::for_config(&config.crawler).context("failed to load region table")?;

    if cli.dry_run {
        handle_dry_run(&config, &regions)
    } else if cli.stats {
        handle_stats(&config)
    } else if cli.export_csv {
        handle_export_csv(&config)
    } else if cli.check {
        handle_check(&config, &regions).await
    } else {
        handle_crawl(&config, &config_hash, Arc::new(regions)).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("sumi_sieve=info,warn"),
            1 => EnvFilter::new("sumi_sieve=debug,info"),
            2 => EnvFilter::new("sumi_sieve=trace,debug"),
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

/// Handles the --dry-run mode: shows the root scopes and their first URLs
fn handle_dry_run(config: &Config, regions: &RegionTable) -> anyhow::Result<()> {
    println!("=== Sumi-Sieve Dry Run ===\n");

    println!("Search:");
    println!("  Keywords: {}", config.search.keywords.len());
    println!(
        "  Dates: {} to {}",
        config.search.start_date, config.search.end_date
    );
    println!("  Post type: {:?}", config.search.post_type);
    println!("  Media filter: {:?}", config.search.media_filter);
    println!("  Further threshold: {}", config.search.further_threshold);

    println!("\nCrawler:");
    println!("  Base URL: {}", config.crawler.base_url);
    println!("  Request delay: {}ms", config.crawler.request_delay);
    println!("  Max attempts: {}", config.crawler.max_attempts);
    println!("  IP location lookup: {}", config.crawler.lookup_ip_location);

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);
    println!("  CSV directory: {}", config.output.csv_dir);

    let query = SearchQuery::from_config(config)?;
    let roots = root_scopes(config, regions)?;
    println!("\nRoot Scopes ({}):", roots.len());
    for scope in &roots {
        println!("  - {}", scope);
        println!("    {}", query.first_page_url(scope));
    }

    println!("\n✓ Configuration is valid");
    Ok(())
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    use sumi_sieve::output::{load_statistics, print_statistics};
    use sumi_sieve::storage::SqliteStorage;

    println!("Database: {}\n", config.output.database_path);

    let storage = SqliteStorage::new(Path::new(&config.output.database_path))?;
    let stats = load_statistics(&storage)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the --export-csv mode: writes one CSV file per keyword
fn handle_export_csv(config: &Config) -> anyhow::Result<()> {
    use sumi_sieve::output::export_csv;
    use sumi_sieve::storage::SqliteStorage;

    let storage = SqliteStorage::new(Path::new(&config.output.database_path))?;
    let paths = export_csv(&storage, Path::new(&config.output.csv_dir))
        .with_context(|| format!("failed to export to {}", config.output.csv_dir))?;

    for path in &paths {
        println!("  {}", path.display());
    }
    println!("✓ Exported {} keyword file(s) to: {}", paths.len(), config.output.csv_dir);

    Ok(())
}

/// Handles the --check mode: one request to verify the session
async fn handle_check(config: &Config, regions: &RegionTable) -> anyhow::Result<()> {
    let page = check_session(config, regions)
        .await
        .context("session check failed")?;
    println!(
        "✓ Session accepted ({} entries, {} pagination links on the first page)",
        page.entries().len(),
        page.pagination_link_count()
    );
    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(
    config: &Config,
    config_hash: &str,
    regions: Arc<RegionTable>,
) -> anyhow::Result<()> {
    tracing::info!(
        keywords = config.search.keywords.len(),
        start = %config.search.start_date,
        end = %config.search.end_date,
        "Starting crawl"
    );

    match crawl(config, config_hash, regions).await {
        Ok(counters) => {
            tracing::info!("Crawl completed successfully");
            println!("{}", counters);
            Ok(())
        }
        Err(e) => {
            if e.is_session_failure() {
                tracing::error!("Session rejected; refresh the cookie in the config file");
            }
            tracing::error!("Crawl failed: {}", e);
            Err(e.into())
        }
    }
}

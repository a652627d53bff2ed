//! Crawler module for search-result fetching and processing
//!
//! This module contains the core crawling logic, including:
//! - HTTP fetching with pacing and retry logic
//! - Result-page inspection (the oracle) and post extraction
//! - Recursive partitioning of oversized result sets
//! - Overall crawl orchestration

mod driver;
mod extractor;
mod fetcher;
mod oracle;
mod planner;

#[cfg(test)]
pub(crate) mod testing;

pub use driver::{check_session, root_scopes, run_crawl, CrawlDriver};
pub use extractor::{parse_count, parse_ip_location, ExtractedPost, RecordExtractor};
pub use fetcher::{build_http_client, FetchError, FetchedPage, HttpFetcher, PageFetcher};
pub use oracle::{parse_result_page, PostEntry, ResultPage};
pub use planner::{Decision, Partition, PartitionPlanner};

use crate::config::Config;
use crate::region::RegionTable;
use crate::state::CrawlCounters;
use crate::SieveError;
use std::sync::Arc;

/// Runs a complete crawl operation
///
/// This is the main entry point for starting a crawl. It will:
/// 1. Open the database and record a run
/// 2. Build the HTTP fetcher from the session settings
/// 3. Check that the session is accepted
/// 4. Partition and walk every keyword's result set
/// 5. Mark the run completed or failed
///
/// # Arguments
///
/// * `config` - The crawler configuration
/// * `config_hash` - SHA-256 of the configuration file
/// * `regions` - The province → city table
///
/// # Returns
///
/// * `Ok(CrawlCounters)` - Crawl completed successfully
/// * `Err(SieveError)` - Crawl failed
pub async fn crawl(
    config: &Config,
    config_hash: &str,
    regions: Arc<RegionTable>,
) -> Result<CrawlCounters, SieveError> {
    run_crawl(config, config_hash, regions).await
}

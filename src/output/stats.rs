//! Statistics generation from crawl database
//!
//! This module provides functionality for extracting and displaying
//! crawl statistics from the storage layer.

use crate::post::VerificationTier;
use crate::storage::{LeafRecord, RunRecord, Storage};
use crate::SieveError;
use std::collections::HashMap;

/// Crawl statistics summary
#[derive(Debug, Clone)]
pub struct CrawlStatistics {
    /// Most recent run, if any
    pub latest_run: Option<RunRecord>,

    /// Total number of stored posts
    pub total_posts: u64,

    /// Posts that repost another stored post
    pub reposts: u64,

    /// Post counts per keyword, most frequent first
    pub posts_by_keyword: Vec<(String, u64)>,

    /// Post counts per author verification tier
    pub verification: HashMap<VerificationTier, u64>,

    /// Walked leaf scopes over all runs
    pub leaves: u64,

    /// Leaf scopes that were still over the threshold
    pub lossy_leaves: u64,

    /// Lossy leaves of the most recent run
    pub latest_lossy: Vec<LeafRecord>,
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to query
///
/// # Returns
///
/// * `Ok(CrawlStatistics)` - Successfully loaded statistics
/// * `Err(SieveError)` - Failed to query statistics
pub fn load_statistics(storage: &dyn Storage) -> Result<CrawlStatistics, SieveError> {
    let latest_run = storage.get_latest_run()?;
    let latest_lossy = match &latest_run {
        Some(run) => storage.get_lossy_leaves(run.id)?,
        None => Vec::new(),
    };
    let (leaves, lossy_leaves) = storage.count_leaves()?;

    Ok(CrawlStatistics {
        latest_run,
        total_posts: storage.count_posts()?,
        reposts: storage.count_reposts()?,
        posts_by_keyword: storage.count_posts_by_keyword()?,
        verification: storage.get_verification_breakdown()?,
        leaves,
        lossy_leaves,
        latest_lossy,
    })
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &CrawlStatistics) {
    println!("=== Crawl Statistics ===\n");

    match &stats.latest_run {
        Some(run) => {
            println!("Latest Run:");
            println!("  Id: {}", run.id);
            println!("  Status: {}", run.status.to_db_string());
            println!("  Started: {}", run.started_at);
            if let Some(finished) = &run.finished_at {
                println!("  Finished: {}", finished);
            }
            if let Some(message) = &run.error_message {
                println!("  Error: {}", message);
            }
        }
        None => println!("No crawl runs recorded"),
    }
    println!();

    println!("Overview:");
    println!("  Total posts: {}", stats.total_posts);
    println!(
        "  Reposts: {} ({:.1}%)",
        stats.reposts,
        percentage(stats.reposts, stats.total_posts)
    );
    println!(
        "  Leaf scopes: {} ({} lossy)",
        stats.leaves, stats.lossy_leaves
    );
    println!();

    if !stats.posts_by_keyword.is_empty() {
        println!("Posts by Keyword:");
        for (keyword, count) in &stats.posts_by_keyword {
            println!("  {}: {}", keyword, count);
        }
        println!();
    }

    if !stats.verification.is_empty() {
        println!("Authors by Verification:");
        let mut tiers: Vec<_> = stats.verification.iter().collect();
        tiers.sort_by(|a, b| b.1.cmp(a.1));
        for (tier, count) in tiers {
            println!(
                "  {}: {} ({:.1}%)",
                tier.to_db_string(),
                count,
                percentage(*count, stats.total_posts)
            );
        }
        println!();
    }

    if !stats.latest_lossy.is_empty() {
        println!("Lossy Leaves in Latest Run ({}):", stats.latest_lossy.len());
        for leaf in &stats.latest_lossy {
            let region = match (leaf.region, leaf.sub_region) {
                (Some(p), Some(c)) => format!(" region={}:{}", p, c),
                (Some(p), None) => format!(" region={}", p),
                _ => String::new(),
            };
            println!(
                "  - {} [{}, {}){} ({} pages)",
                leaf.keyword, leaf.window_start, leaf.window_end, region, leaf.pages
            );
        }
        println!();
    }
}

fn percentage(part: u64, total: u64) -> f64 {
    if total > 0 {
        (part as f64 / total as f64) * 100.0
    } else {
        0.0
    }
}

//! State module for tracking crawl progress
//!
//! Nothing here is persisted. A restarted crawl re-derives the same
//! partition tree from configuration and relies on the sink to ignore posts
//! it has already stored.
//!
//! # Components
//!
//! - `CrawlProgress`: page cursor of the leaf scope currently being walked
//! - `CrawlCounters`: run-wide tallies reported when the crawl ends

mod counters;
mod progress;

// Re-export main types
pub use counters::CrawlCounters;
pub use progress::CrawlProgress;

//! Output module for reporting on stored crawl results
//!
//! This module handles:
//! - Loading post, keyword and leaf statistics from storage
//! - Printing them for the `--stats` command
//! - Exporting stored posts to per-keyword CSV files

pub mod csv_export;
pub mod stats;

pub use csv_export::{export_csv, write_keyword_csv};
pub use stats::{load_statistics, print_statistics, CrawlStatistics};

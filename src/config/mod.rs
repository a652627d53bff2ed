//! Configuration module for Sumi-Sieve
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use sumi_sieve::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("config.toml")).unwrap();
//! println!("Crawling {} keyword(s)", config.search.keywords.len());
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    selects_all_regions, Config, CrawlerConfig, ExtractionConfig, MediaFilter, OutputConfig,
    PostType, SearchConfig, SessionConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, read_keyword_file};

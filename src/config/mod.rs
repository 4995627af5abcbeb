//! Configuration module for Sitesnap
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//! Every section is optional; the command-line tool layers its flags on top.
//!
//! # Example
//!
//! ```no_run
//! use sitesnap::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("sitesnap.toml")).unwrap();
//! println!("Crawl will stop admitting pages at: {}", config.crawler.max_pages);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    ArchiveConfig, Config, CrawlMode, CrawlerConfig, ImageConfig, LanguageConfig, MirrorConfig,
    OutputConfig, PageScope, RateConfig, RetryConfig, UserAgentConfig,
};

pub use validation::validate;

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};

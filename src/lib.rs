//! Sitesnap: a polite site snapshotter
//!
//! This crate crawls a single website politely and concurrently, records an SEO
//! snapshot of every visited page as CSV tables, mirrors the page assets into a
//! relocatable local tree, and packages everything into one zip archive. Sites can
//! also be replayed from a web archive snapshot instead of being fetched live.

pub mod config;
pub mod crawler;
pub mod mirror;
pub mod output;
pub mod robots;
pub mod state;
pub mod url;

use thiserror::Error;

/// Main error type for Sitesnap operations
///
/// Only a handful of these ever escape [`crawl`]: configuration problems, an invalid
/// mode, a seed URL refused by the language gate, and archive index failures. Every
/// per-URL problem is contained inside the worker that hit it.
#[derive(Debug, Error)]
pub enum SnapError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid crawl mode '{0}': expected 'live' or 'archive'")]
    InvalidMode(String),

    #[error("Invalid page scope '{0}': expected 'both', 'landing' or 'blog'")]
    InvalidScope(String),

    #[error("Seed URL {url} is not admissible: it looks like a non-English page")]
    LanguageGate { url: String },

    #[error("Archive index error: {0}")]
    ArchiveIndex(String),

    #[error("HTTP error for {url}: {source}")]
    Http { url: String, source: reqwest::Error },

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Output error: {0}")]
    Output(#[from] output::OutputError),

    #[error("Invalid fetch state transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: state::FetchState,
        to: state::FetchState,
    },

    #[error("Worker task failed: {0}")]
    Worker(#[from] tokio::task::JoinError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("{} configuration errors: {}", .0.len(), join_errors(.0))]
    Multiple(Vec<ConfigError>),
}

fn join_errors(errors: &[ConfigError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,
}

/// Result type alias for Sitesnap operations
pub type Result<T> = std::result::Result<T, SnapError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::{Config, CrawlMode, PageScope};
pub use crawler::{crawl, run_crawl, CrawlReport};
pub use state::FetchState;
pub use url::{normalize_url, SiteRoot};

//! Crawler module for page fetching and processing
//!
//! This module contains the core crawling logic, including:
//! - Page fetching with the bounded retry protocol
//! - HTML parsing, link and image extraction, page records
//! - Rate limiting per traffic class and the shared frontier
//! - Archive replay and overall crawl coordination

pub mod archive;
mod context;
mod coordinator;
pub mod fetcher;
mod fields;
pub mod frontier;
pub(crate) mod parser;
pub mod probe;
mod rate_limit;

pub use archive::{latest_timestamp, ArchiveReplay};
pub use context::{RunContext, RunLimits, Sinks};
pub use coordinator::{run_crawl, CrawlReport};
pub use fetcher::{
    build_asset_client, build_http_client, FetchError, FetchOutcome, FetchRetry, FetchedPage,
    RedirectHop, RetryPolicy,
};
pub use fields::{carbon_rating, clean_text, flesch_reading_ease, format_redirect_chain};
pub use frontier::{Admission, AdmissionPolicy, Frontier, FrontierEntry};
pub use parser::{
    first_candidate, pick_image_source, process_page, DiscoveredImage, DiscoveredLink,
    PageInput, ProcessedPage,
};
pub use probe::{ImageProber, ProbeCache, ProbeResult};
pub use rate_limit::RateLimiter;

use crate::config::Config;
use crate::Result;

/// Runs a complete crawl and returns the zip archive
///
/// This is the main library entry point. Use [`run_crawl`] when the run statistics
/// are needed as well.
///
/// # Arguments
///
/// * `config` - The crawl configuration
///
/// # Returns
///
/// * `Ok(Vec<u8>)` - The packaged archive
/// * `Err(SnapError)` - The run could not produce an archive
pub async fn crawl(config: Config) -> Result<Vec<u8>> {
    Ok(run_crawl(config).await?.archive)
}

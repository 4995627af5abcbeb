//! Output module for the snapshot archive
//!
//! This module handles:
//! - The CSV tables (pages, links, images, assets, failures, manifest)
//! - Packaging the mirror tree and tables into one zip archive
//! - Recording crawl statistics

mod package;
pub mod records;
mod sink;
pub mod stats;
mod traits;

pub use package::Packager;
pub use records::{AssetRecord, DropRecord, ImageRecord, LinkRecord, ManifestEntry, PageRecord};
pub use sink::SynchronizedSink;
pub use stats::{print_summary, CrawlCounters, CrawlSummary};
pub use traits::{yes_or_empty, OutputError, OutputResult, TableRow};

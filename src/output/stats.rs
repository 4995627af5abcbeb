//! End-of-run statistics
//!
//! Workers bump the counters in [`CrawlCounters`] as they go; the coordinator turns
//! them into a [`CrawlSummary`] once the pool has drained.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Live counters shared by all workers
#[derive(Debug, Default)]
pub struct CrawlCounters {
    pub pages_crawled: AtomicUsize,
    pub pages_aborted: AtomicUsize,
    pub pages_dropped: AtomicUsize,
    pub links_recorded: AtomicUsize,
    pub images_recorded: AtomicUsize,
    pub images_broken: AtomicUsize,
    pub assets_mirrored: AtomicUsize,
    pub assets_failed: AtomicUsize,
}

impl CrawlCounters {
    pub fn add(counter: &AtomicUsize, n: usize) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::Relaxed)
    }
}

/// Summary statistics for a finished crawl
#[derive(Debug, Clone)]
pub struct CrawlSummary {
    pub mode: String,
    pub start_url: String,
    pub snapshot_timestamp: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,

    pub pages_crawled: usize,
    pub pages_aborted: usize,
    pub pages_dropped: usize,
    pub links_recorded: usize,
    pub images_recorded: usize,
    pub images_broken: usize,
    pub assets_mirrored: usize,
    pub assets_failed: usize,

    /// Size of the produced archive in bytes
    pub archive_bytes: usize,
}

impl CrawlSummary {
    /// Snapshot of the counters at the end of a run
    pub fn from_counters(
        counters: &CrawlCounters,
        mode: String,
        start_url: String,
        snapshot_timestamp: Option<String>,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
    ) -> Self {
        Self {
            mode,
            start_url,
            snapshot_timestamp,
            started_at,
            finished_at,
            pages_crawled: CrawlCounters::get(&counters.pages_crawled),
            pages_aborted: CrawlCounters::get(&counters.pages_aborted),
            pages_dropped: CrawlCounters::get(&counters.pages_dropped),
            links_recorded: CrawlCounters::get(&counters.links_recorded),
            images_recorded: CrawlCounters::get(&counters.images_recorded),
            images_broken: CrawlCounters::get(&counters.images_broken),
            assets_mirrored: CrawlCounters::get(&counters.assets_mirrored),
            assets_failed: CrawlCounters::get(&counters.assets_failed),
            archive_bytes: 0,
        }
    }

    pub fn duration_seconds(&self) -> i64 {
        (self.finished_at - self.started_at).num_seconds()
    }

    /// Pages that reached a terminal state
    pub fn total_terminal_pages(&self) -> usize {
        self.pages_crawled + self.pages_aborted + self.pages_dropped
    }

    /// Returns the success rate as a percentage
    pub fn success_rate(&self) -> f64 {
        let terminal = self.total_terminal_pages();
        if terminal == 0 {
            return 0.0;
        }
        (self.pages_crawled as f64 / terminal as f64) * 100.0
    }
}

/// Prints the summary to stdout in a formatted manner
pub fn print_summary(summary: &CrawlSummary) {
    println!("=== Snapshot Summary ===\n");

    println!("Run:");
    println!("  Mode: {}", summary.mode);
    println!("  Start URL: {}", summary.start_url);
    if let Some(ts) = &summary.snapshot_timestamp {
        println!("  Snapshot timestamp: {}", ts);
    }
    println!("  Duration: {}s", summary.duration_seconds());
    println!();

    println!("Pages:");
    println!("  Crawled: {}", summary.pages_crawled);
    println!("  Skipped (non-HTML or unexpected status): {}", summary.pages_aborted);
    println!("  Dropped after retries: {}", summary.pages_dropped);
    println!("  Success rate: {:.1}%", summary.success_rate());
    println!();

    println!("Content:");
    println!("  Links recorded: {}", summary.links_recorded);
    println!(
        "  Images recorded: {} ({} broken)",
        summary.images_recorded, summary.images_broken
    );
    println!(
        "  Assets mirrored: {} ({} failed)",
        summary.assets_mirrored, summary.assets_failed
    );
    println!();

    println!("Archive size: {} bytes", summary.archive_bytes);
}

//! Crawl coordinator - worker pool and run lifecycle
//!
//! This module contains the main crawl loop. It:
//! - Sets up the run context and seeds the frontier
//! - Runs a fixed pool of workers until the frontier drains
//! - Turns each fetched page into table rows, new frontier entries and a mirrored copy
//! - Writes the manifest and packages the archive

use crate::config::Config;
use crate::crawler::context::RunContext;
use crate::crawler::fetcher::{FetchOutcome, FetchedPage};
use crate::crawler::frontier::FrontierEntry;
use crate::crawler::parser::{process_page, DiscoveredImage, PageInput};
use crate::mirror::save_page;
use crate::output::{
    CrawlCounters, CrawlSummary, DropRecord, ImageRecord, LinkRecord, ManifestEntry, Packager,
    SynchronizedSink,
};
use crate::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use std::sync::Arc;
use tokio::task::JoinSet;
use url::Url;

/// Progress is logged every this many pages
const PROGRESS_EVERY: usize = 25;

/// Result of a finished crawl
#[derive(Debug, Clone)]
pub struct CrawlReport {
    /// The zip archive
    pub archive: Vec<u8>,
    pub summary: CrawlSummary,
}

/// Runs a complete crawl and packages its archive
///
/// This function orchestrates the entire crawl process:
///
/// 1. Validate the configuration and build the run context
/// 2. Look up the snapshot timestamp (archive mode) or robots.txt (live mode)
/// 3. Seed the frontier with the start URL
/// 4. Run `concurrency` workers until the frontier drains
/// 5. Write the manifest and package the mirror tree and tables
///
/// # Returns
///
/// * `Ok(CrawlReport)` - The archive bytes and run statistics
/// * `Err(SnapError)` - Invalid configuration or mode, a non-English seed, or a failed
///   archive index lookup
///
/// # Example
///
/// ```no_run
/// use sitesnap::config::Config;
/// use sitesnap::crawler::run_crawl;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let report = run_crawl(Config::for_url("https://example.com/")).await?;
/// std::fs::write("site_snapshot.zip", &report.archive)?;
/// println!("{} pages", report.summary.pages_crawled);
/// # Ok(())
/// # }
/// ```
pub async fn run_crawl(config: Config) -> Result<CrawlReport> {
    let started_at = Utc::now();
    let context = Arc::new(RunContext::new(config).await?);
    context.seed()?;

    tracing::info!(
        "Starting {} crawl of {} with {} workers (max {} pages)",
        context.mode(),
        context.seed_url,
        context.limits.concurrency,
        context.config.crawler.max_pages
    );

    let mut workers = JoinSet::new();
    for id in 0..context.limits.concurrency {
        workers.spawn(run_worker(Arc::clone(&context), id));
    }
    while let Some(joined) = workers.join_next().await {
        joined?;
    }

    let finished_at = Utc::now();
    tracing::info!(
        "Crawl finished: {} pages in {}s",
        CrawlCounters::get(&context.counters.pages_crawled),
        (finished_at - started_at).num_seconds()
    );

    package(&context, started_at, finished_at)
}

/// One worker: takes entries until the frontier reports no more work
async fn run_worker(context: Arc<RunContext>, id: usize) {
    tracing::trace!("worker {} started", id);
    while let Some(entry) = context.frontier.dequeue().await {
        let _done = context.frontier.complete_on_drop();
        if let Err(e) = process_entry(&context, &entry).await {
            tracing::error!("Error processing {}: {}", entry.url, e);
        }
    }
    tracing::trace!("worker {} finished", id);
}

/// Fetches one frontier entry and handles its outcome
async fn process_entry(context: &RunContext, entry: &FrontierEntry) -> Result<()> {
    let target = match &context.replay {
        Some(replay) => replay.replay_url(&entry.url)?,
        None => entry.url.clone(),
    };
    tracing::debug!("Fetching {}", target);

    match context.fetcher.fetch(&target, &context.page_limiter).await? {
        FetchOutcome::Success(page) => handle_page(context, entry, *page).await?,
        FetchOutcome::Aborted { reason } => {
            tracing::debug!("Skipped {}: {}", entry.url, reason);
            CrawlCounters::add(&context.counters.pages_aborted, 1);
        }
        FetchOutcome::Dropped { reason } => {
            CrawlCounters::add(&context.counters.pages_dropped, 1);
            context.sinks.failures.append(&DropRecord {
                url: entry.url.to_string(),
                reason,
            })?;
        }
    }
    Ok(())
}

/// Records, expands and mirrors one fetched page
async fn handle_page(context: &RunContext, entry: &FrontierEntry, page: FetchedPage) -> Result<()> {
    let page_url = &entry.url;
    let FetchedPage {
        final_url: base_url,
        status,
        content_type,
        body,
        redirect_chain,
        ..
    } = page;

    let html = match &context.replay {
        Some(replay) => match replay.prepare_html(&body) {
            Ok(prepared) => prepared,
            Err(e) => {
                tracing::warn!("Could not prepare archived page {}: {}", page_url, e);
                body
            }
        },
        None => body,
    };

    let processed = process_page(
        &PageInput {
            page_url,
            base_url: &base_url,
            html: &html,
            status,
            content_type: &content_type,
            redirect_chain: &redirect_chain,
            snapshot_timestamp: context.snapshot_timestamp(),
        },
        &context.root,
        context.replay.as_ref(),
    );
    context.sinks.pages.append(&processed.record)?;

    let language = context.frontier.policy().language();
    let mut links = Vec::with_capacity(processed.links.len());
    for link in &processed.links {
        if !language.allows(&link.normalized, &context.root) {
            continue;
        }
        links.push(LinkRecord {
            page_url: page_url.to_string(),
            link_url: link.url.to_string(),
            link_text: link.text.clone(),
        });
        let admission = context.frontier.enqueue(link.normalized.clone(), Some(page_url));
        tracing::trace!("{} -> {:?}", link.normalized, admission);
    }
    context.sinks.links.append_all(&links)?;
    CrawlCounters::add(&context.counters.links_recorded, links.len());

    let images = probe_images(context, page_url, &base_url, &processed.images).await;
    context.sinks.images.append_all(&images)?;
    CrawlCounters::add(&context.counters.images_recorded, images.len());

    let saved = match &context.mirror {
        Some(mirror) => {
            mirror
                .snapshot_page(&html, page_url, &base_url, context.replay.is_some())
                .await
        }
        None => save_page(context.workdir(), page_url, &html).await,
    };
    if let Err(e) = saved {
        tracing::warn!("Could not save a local copy of {}: {}", page_url, e);
    }

    CrawlCounters::add(&context.counters.pages_crawled, 1);
    let crawled = CrawlCounters::get(&context.counters.pages_crawled);
    tracing::debug!(
        "Crawled {} ({} links, {} images)",
        page_url,
        links.len(),
        images.len()
    );
    if crawled % PROGRESS_EVERY == 0 {
        tracing::info!(
            "Progress: {} pages crawled, {} queued",
            crawled,
            context.frontier.queued_count()
        );
    }
    Ok(())
}

/// Builds the image rows of one page, probing up to the per-page cap
async fn probe_images(
    context: &RunContext,
    page_url: &Url,
    referer: &Url,
    images: &[DiscoveredImage],
) -> Vec<ImageRecord> {
    let settings = &context.config.images;
    let mut rows = Vec::with_capacity(images.len());

    for (index, image) in images.iter().enumerate() {
        let within_cap = settings.max_probes_per_page == 0 || index < settings.max_probes_per_page;
        let mut row = ImageRecord {
            page_url: page_url.to_string(),
            image_url: image.url.to_string(),
            alt_text: image.alt.clone(),
            status_code: None,
            content_type: None,
            is_broken: None,
        };

        if settings.probe && within_cap {
            let result = context
                .prober
                .probe(&image.url, referer, &context.image_limiter)
                .await;
            if result.broken {
                CrawlCounters::add(&context.counters.images_broken, 1);
            }
            row.status_code = Some(result.status);
            row.content_type = Some(result.content_type);
            row.is_broken = Some(result.broken);
        }
        rows.push(row);
    }
    rows
}

/// Writes the manifest and zips the staging directory
fn package(
    context: &RunContext,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
) -> Result<CrawlReport> {
    let workdir = context.workdir();
    let pages_crawled = CrawlCounters::get(&context.counters.pages_crawled);

    let manifest: SynchronizedSink<ManifestEntry> =
        SynchronizedSink::create(workdir.join("manifest.csv"))?;
    manifest.append_all(&[
        ManifestEntry::new("mode", context.mode().to_string()),
        ManifestEntry::new("start_url", context.seed_url.to_string()),
        ManifestEntry::new(
            "snapshot_timestamp",
            context.snapshot_timestamp().unwrap_or_default(),
        ),
        ManifestEntry::new("pages_crawled", pages_crawled.to_string()),
        ManifestEntry::new(
            "started_at",
            started_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        ),
        ManifestEntry::new(
            "finished_at",
            finished_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        ),
    ])?;
    manifest.flush()?;
    context.sinks.flush()?;

    let mut packager = Packager::new(workdir);
    packager.add_tree(&workdir.join(crate::mirror::SITE_DIR))?;
    for table in [
        context.sinks.pages.path(),
        context.sinks.links.path(),
        context.sinks.images.path(),
        context.sinks.assets.path(),
        manifest.path(),
    ] {
        packager.add_file(table)?;
    }
    if !context.sinks.failures.is_empty() {
        packager.add_file(context.sinks.failures.path())?;
    }
    let archive = packager.finish()?;

    let mut summary = CrawlSummary::from_counters(
        &context.counters,
        context.mode().to_string(),
        context.seed_url.to_string(),
        context.snapshot_timestamp().map(str::to_string),
        started_at,
        finished_at,
    );
    summary.archive_bytes = archive.len();
    tracing::info!("Packaged archive: {} bytes", archive.len());

    Ok(CrawlReport { archive, summary })
}

//! Per-run shared services
//!
//! A [`RunContext`] owns everything workers share during one crawl: clients, rate
//! limiters, the frontier, caches, sinks and the staging directory. Nothing outlives
//! the run and nothing is process-wide.

use crate::config::{validate, Config, CrawlMode};
use crate::crawler::archive::{latest_timestamp, ArchiveReplay};
use crate::crawler::fetcher::{build_asset_client, build_http_client, FetchRetry, RetryPolicy};
use crate::crawler::frontier::{Admission, AdmissionPolicy, Frontier};
use crate::crawler::probe::ImageProber;
use crate::crawler::RateLimiter;
use crate::mirror::AssetMirror;
use crate::output::{
    AssetRecord, CrawlCounters, DropRecord, ImageRecord, LinkRecord, PageRecord,
    SynchronizedSink,
};
use crate::robots::fetch_robots;
use crate::url::{with_default_scheme, LanguagePolicy, SiteRoot};
use crate::{Result, SnapError};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use url::Url;

/// The CSV tables every run writes
pub struct Sinks {
    pub pages: SynchronizedSink<PageRecord>,
    pub links: SynchronizedSink<LinkRecord>,
    pub images: SynchronizedSink<ImageRecord>,
    pub assets: Arc<SynchronizedSink<AssetRecord>>,
    pub failures: SynchronizedSink<DropRecord>,
}

impl Sinks {
    fn create(dir: &Path) -> Result<Self> {
        Ok(Self {
            pages: SynchronizedSink::create(dir.join("pages.csv"))?,
            links: SynchronizedSink::create(dir.join("links.csv"))?,
            images: SynchronizedSink::create(dir.join("images.csv"))?,
            assets: Arc::new(SynchronizedSink::create(dir.join("assets.csv"))?),
            failures: SynchronizedSink::create(dir.join("failures.csv"))?,
        })
    }

    pub fn flush(&self) -> Result<()> {
        self.pages.flush()?;
        self.links.flush()?;
        self.images.flush()?;
        self.assets.flush()?;
        self.failures.flush()?;
        Ok(())
    }
}

/// Effective per-run limits after mode adjustments
#[derive(Debug, Clone, Copy)]
pub struct RunLimits {
    pub concurrency: usize,
    pub timeout: Duration,
    pub page_rps: f64,
    pub image_rps: f64,
    pub asset_rps: f64,
}

impl RunLimits {
    /// Archive mode runs slower and with more patience than a live crawl
    pub fn for_config(config: &Config) -> Self {
        let crawler = &config.crawler;
        let rates = &config.rates;
        match crawler.mode {
            CrawlMode::Live => Self {
                concurrency: crawler.concurrency,
                timeout: crawler.timeout(),
                page_rps: rates.page_rps,
                image_rps: rates.image_rps,
                asset_rps: rates.asset_rps,
            },
            CrawlMode::Archive => Self {
                concurrency: crawler.concurrency.min(config.archive.max_concurrency).max(1),
                timeout: Duration::from_secs(
                    crawler.timeout_secs.max(config.archive.min_timeout_secs),
                ),
                page_rps: rates.archive_page_rps,
                image_rps: rates.archive_image_rps,
                asset_rps: rates.archive_asset_rps,
            },
        }
    }
}

/// Everything one crawl run shares between its workers
pub struct RunContext {
    pub config: Config,
    pub limits: RunLimits,
    pub root: SiteRoot,
    pub seed_url: Url,
    pub frontier: Frontier,
    pub fetcher: FetchRetry,
    pub prober: ImageProber,
    pub page_limiter: RateLimiter,
    pub image_limiter: RateLimiter,
    pub replay: Option<ArchiveReplay>,
    pub mirror: Option<AssetMirror>,
    pub sinks: Sinks,
    pub counters: Arc<CrawlCounters>,
    workdir: TempDir,
}

impl RunContext {
    /// Validates `config` and sets up every service of the run
    ///
    /// This performs the run's setup traffic: the archive index lookup (archive mode,
    /// when no timestamp is given) and the robots.txt fetch (live mode, when robots
    /// are obeyed). The seed is not enqueued yet; see [`seed`](Self::seed).
    pub async fn new(config: Config) -> Result<Self> {
        validate(&config)?;
        let limits = RunLimits::for_config(&config);

        let parsed = Url::parse(&with_default_scheme(&config.crawler.start_url))?;
        let root = SiteRoot::new(&parsed, config.crawler.allow_subdomains)?;
        let seed_url = root.normalize(parsed.as_str())?;

        let page_client = build_http_client(&config.user_agent)?;
        let asset_client = build_asset_client(&config.user_agent)?;
        let page_limiter = RateLimiter::new("page", limits.page_rps);
        let image_limiter = RateLimiter::new("image", limits.image_rps);
        let asset_limiter = Arc::new(RateLimiter::new("asset", limits.asset_rps));

        let replay = match config.crawler.mode {
            CrawlMode::Live => None,
            CrawlMode::Archive => {
                let timestamp = match &config.crawler.snapshot_timestamp {
                    Some(ts) => ts.clone(),
                    None => {
                        let ts = latest_timestamp(
                            &asset_client,
                            &config.archive.index_url,
                            root.host(),
                            limits.timeout,
                        )
                        .await?;
                        tracing::info!("Latest archive snapshot for {}: {}", root.host(), ts);
                        ts
                    }
                };
                Some(ArchiveReplay::new(&config.archive, timestamp)?)
            }
        };

        let robots = if replay.is_none() && config.crawler.obey_robots {
            let rules = fetch_robots(
                &page_client,
                &seed_url,
                &config.user_agent.crawler_name,
                &page_limiter,
                limits.timeout,
            )
            .await;
            if let Some(delay) = rules.crawl_delay() {
                page_limiter.slow_to(delay);
            }
            Some(rules)
        } else {
            None
        };

        let workdir = tempfile::Builder::new().prefix("sitesnap-").tempdir()?;
        let sinks = Sinks::create(workdir.path())?;
        let counters = Arc::new(CrawlCounters::default());

        let mirror = if config.mirror.enabled {
            let scope = match &replay {
                // prepared archive pages reference their assets on the archive host
                Some(replay) => SiteRoot::new(&Url::parse(&replay.snapshot_base())?, true)?,
                None => SiteRoot::new(&seed_url, true)?,
            };
            Some(AssetMirror::new(
                asset_client.clone(),
                asset_limiter,
                scope,
                &config.mirror,
                workdir.path(),
                Arc::clone(&sinks.assets),
                Arc::clone(&counters),
            ))
        } else {
            None
        };

        let policy = AdmissionPolicy::new(
            root.clone(),
            LanguagePolicy::new(&config.language),
            config.crawler.page_scope,
            robots,
        );
        let frontier = Frontier::new(policy, config.crawler.max_pages);

        let fetcher = FetchRetry::new(
            page_client,
            RetryPolicy::from_config(&config.retry),
            config.retry.soft_block_markers.clone(),
            limits.timeout,
        );
        let prober = ImageProber::new(
            asset_client,
            Duration::from_secs(config.images.timeout_secs),
            config.images.probe_bytes,
        );

        Ok(Self {
            config,
            limits,
            root,
            seed_url,
            frontier,
            fetcher,
            prober,
            page_limiter,
            image_limiter,
            replay,
            mirror,
            sinks,
            counters,
            workdir,
        })
    }

    /// Offers the seed URL to the frontier
    ///
    /// A seed that looks non-English is fatal; other refusals (for example robots.txt)
    /// only leave the run empty.
    pub fn seed(&self) -> Result<Admission> {
        let admission = self.frontier.enqueue(self.seed_url.clone(), None);
        match admission {
            Admission::Admitted => {
                tracing::info!("Seeded frontier with {}", self.seed_url);
            }
            Admission::NonEnglish => {
                return Err(SnapError::LanguageGate {
                    url: self.seed_url.to_string(),
                });
            }
            refused => {
                tracing::warn!("Seed {} was not admitted: {:?}", self.seed_url, refused);
            }
        }
        Ok(admission)
    }

    pub fn mode(&self) -> CrawlMode {
        self.config.crawler.mode
    }

    pub fn snapshot_timestamp(&self) -> Option<&str> {
        self.replay.as_ref().map(ArchiveReplay::timestamp)
    }

    /// Directory the archive tree and tables are staged in
    pub fn workdir(&self) -> &Path {
        self.workdir.path()
    }
}

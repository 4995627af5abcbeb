use crate::SnapError;
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Main configuration structure for Sitesnap
///
/// Every section is optional in the TOML file; missing sections fall back to the
/// defaults below.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub rates: RateConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub images: ImageConfig,
    #[serde(default)]
    pub language: LanguageConfig,
    #[serde(default)]
    pub mirror: MirrorConfig,
    #[serde(default)]
    pub archive: ArchiveConfig,
    #[serde(rename = "user-agent", default)]
    pub user_agent: UserAgentConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Where pages come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(try_from = "String")]
pub enum CrawlMode {
    /// Fetch pages from the live site
    #[default]
    Live,
    /// Replay pages from a web archive snapshot
    Archive,
}

impl FromStr for CrawlMode {
    type Err = SnapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "live" => Ok(CrawlMode::Live),
            "archive" | "wayback" => Ok(CrawlMode::Archive),
            _ => Err(SnapError::InvalidMode(s.to_string())),
        }
    }
}

impl TryFrom<String> for CrawlMode {
    type Error = SnapError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for CrawlMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CrawlMode::Live => write!(f, "live"),
            CrawlMode::Archive => write!(f, "archive"),
        }
    }
}

/// Which kind of pages the frontier admits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(try_from = "String")]
pub enum PageScope {
    /// Landing pages and blog posts
    #[default]
    Both,
    /// Only pages that do not look like blog content
    Landing,
    /// Only pages that look like blog content
    Blog,
}

impl FromStr for PageScope {
    type Err = SnapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "both" | "all" => Ok(PageScope::Both),
            "landing" => Ok(PageScope::Landing),
            "blog" => Ok(PageScope::Blog),
            _ => Err(SnapError::InvalidScope(s.to_string())),
        }
    }
}

impl TryFrom<String> for PageScope {
    type Error = SnapError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// URL the crawl starts from; its host becomes the run root
    #[serde(rename = "start-url")]
    pub start_url: String,

    /// Ceiling on the number of pages admitted to the frontier
    #[serde(rename = "max-pages")]
    pub max_pages: usize,

    /// Number of concurrent workers
    pub concurrency: usize,

    /// Page request timeout (seconds)
    #[serde(rename = "timeout-secs")]
    pub timeout_secs: u64,

    pub mode: CrawlMode,

    /// Archive snapshot timestamp (`YYYYMMDDhhmmss`, any prefix); looked up when absent
    #[serde(rename = "snapshot-timestamp")]
    pub snapshot_timestamp: Option<String>,

    /// Treat subdomains of the root host as part of the site
    #[serde(rename = "allow-subdomains")]
    pub allow_subdomains: bool,

    #[serde(rename = "page-scope")]
    pub page_scope: PageScope,

    /// Honor robots.txt disallow rules and crawl-delay
    #[serde(rename = "obey-robots")]
    pub obey_robots: bool,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            start_url: String::new(),
            max_pages: 2000,
            concurrency: 8,
            timeout_secs: 15,
            mode: CrawlMode::Live,
            snapshot_timestamp: None,
            allow_subdomains: false,
            page_scope: PageScope::Both,
            obey_robots: true,
        }
    }
}

impl CrawlerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Requests per second for each traffic class
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateConfig {
    #[serde(rename = "page-rps")]
    pub page_rps: f64,
    #[serde(rename = "image-rps")]
    pub image_rps: f64,
    #[serde(rename = "asset-rps")]
    pub asset_rps: f64,
    #[serde(rename = "archive-page-rps")]
    pub archive_page_rps: f64,
    #[serde(rename = "archive-image-rps")]
    pub archive_image_rps: f64,
    #[serde(rename = "archive-asset-rps")]
    pub archive_asset_rps: f64,
}

impl Default for RateConfig {
    fn default() -> Self {
        Self {
            page_rps: 3.0,
            image_rps: 12.0,
            asset_rps: 8.0,
            archive_page_rps: 0.5,
            archive_image_rps: 1.0,
            archive_asset_rps: 2.0,
        }
    }
}

/// Retry and backoff policy for page fetches
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per URL before it is dropped
    #[serde(rename = "max-retries")]
    pub max_retries: u32,

    #[serde(rename = "backoff-base")]
    pub backoff_base: f64,

    /// Length of one backoff unit (milliseconds); the n-th retry sleeps `unit * base^(n-1)`
    #[serde(rename = "backoff-unit-ms")]
    pub backoff_unit_ms: u64,

    #[serde(rename = "backoff-cap-secs")]
    pub backoff_cap_secs: u64,

    /// Upper bound of the uniform jitter added to computed backoffs (milliseconds)
    #[serde(rename = "jitter-ms")]
    pub jitter_ms: u64,

    /// Body fragments that mark a 200 response as a soft block
    #[serde(rename = "soft-block-markers")]
    pub soft_block_markers: Vec<String>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            backoff_base: 1.5,
            backoff_unit_ms: 1000,
            backoff_cap_secs: 30,
            jitter_ms: 500,
            soft_block_markers: vec![
                "429 Too Many Requests".to_string(),
                "temporarily restricted your access".to_string(),
            ],
        }
    }
}

/// Image probing configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    /// Probe discovered images for reachability and type
    pub probe: bool,

    #[serde(rename = "timeout-secs")]
    pub timeout_secs: u64,

    /// Bytes read from a streamed GET when sniffing the image type
    #[serde(rename = "probe-bytes")]
    pub probe_bytes: usize,

    /// Probes per page; 0 disables the cap
    #[serde(rename = "max-probes-per-page")]
    pub max_probes_per_page: usize,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            probe: true,
            timeout_secs: 10,
            probe_bytes: 512,
            max_probes_per_page: 50,
        }
    }
}

/// Language admission configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LanguageConfig {
    #[serde(rename = "english-only")]
    pub english_only: bool,

    /// Locale codes that mark a path segment or subdomain as non-English
    #[serde(rename = "deny-list")]
    pub deny_list: Vec<String>,
}

impl Default for LanguageConfig {
    fn default() -> Self {
        const DENY: &[&str] = &[
            "ar", "bg", "cs", "da", "de", "el", "es", "et", "fa", "fi", "fr", "he", "hi", "hr",
            "hu", "id", "it", "ja", "jp", "ko", "ms", "nl", "no", "pl", "pt", "ro", "ru", "sk",
            "sl", "sr", "sv", "th", "tr", "uk", "vi", "zh", "cn", "tw", "kr",
        ];
        Self {
            english_only: true,
            deny_list: DENY.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Asset mirroring configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MirrorConfig {
    pub enabled: bool,

    /// Mirror assets hosted outside the crawl root as well
    #[serde(rename = "external-assets")]
    pub external_assets: bool,

    #[serde(rename = "asset-timeout-secs")]
    pub asset_timeout_secs: u64,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            external_assets: false,
            asset_timeout_secs: 20,
        }
    }
}

/// Web archive endpoints and archive-mode limits
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    /// Prefix of replay URLs; the snapshot timestamp and original URL are appended
    #[serde(rename = "replay-base")]
    pub replay_base: String,

    /// CDX index endpoint used to find the latest snapshot
    #[serde(rename = "index-url")]
    pub index_url: String,

    #[serde(rename = "min-timeout-secs")]
    pub min_timeout_secs: u64,

    #[serde(rename = "max-concurrency")]
    pub max_concurrency: usize,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            replay_base: "https://web.archive.org/web/".to_string(),
            index_url: "https://web.archive.org/cdx/search/cdx".to_string(),
            min_timeout_secs: 45,
            max_concurrency: 2,
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,
}

impl Default for UserAgentConfig {
    fn default() -> Self {
        Self {
            crawler_name: "Sitesnap".to_string(),
            crawler_version: env!("CARGO_PKG_VERSION").to_string(),
            contact_url: "https://github.com/sitesnap/sitesnap".to_string(),
        }
    }
}

impl UserAgentConfig {
    /// Full `User-Agent` header value, e.g. `Sitesnap/1.0.0 (+https://...)`
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{})",
            self.crawler_name, self.crawler_version, self.contact_url
        )
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Path the zip archive is written to by the command-line tool
    #[serde(rename = "archive-path")]
    pub archive_path: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            archive_path: "site_snapshot.zip".to_string(),
        }
    }
}

impl Config {
    /// Configuration for a crawl of `start_url` with every other setting at its default
    pub fn for_url(start_url: impl Into<String>) -> Self {
        let mut config = Config::default();
        config.crawler.start_url = start_url.into();
        config
    }
}

//! Asset mirror
//!
//! This module makes every saved page browsable offline:
//! - Stylesheets, scripts, images, fonts and media referenced by a page are
//!   downloaded once per run into `site/_assets/<bucket>/<host>/`
//! - Stylesheets get one level of `url(...)` recursion, rewritten relative to the
//!   stylesheet's own location
//! - The page HTML is rewritten to point at the local copies and saved under
//!   `site/<host>/`
//!
//! A reference that cannot be mirrored keeps its original URL and is recorded in the
//! assets table with an empty local path.

mod css;
mod html;
mod paths;

pub use css::{css_references, rewrite_css};
pub use html::{collect_references, rewrite_references, AssetReference, PageReferences, Replacements};
pub use paths::{
    asset_path, bucket_for, display_path, host_dir, page_path, relative_reference, AssetKind,
    Bucket, ASSETS_DIR, SITE_DIR,
};

use crate::config::MirrorConfig;
use crate::crawler::parser::document_base;
use crate::crawler::RateLimiter;
use crate::output::{AssetRecord, CrawlCounters, SynchronizedSink};
use crate::url::SiteRoot;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use scraper::Html;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::OnceCell;
use url::Url;

/// Name of the synthetic stylesheet inline `style` attributes are resolved as
const INLINE_STYLESHEET: &str = "__inline__.css";

/// Why one asset could not be mirrored
#[derive(Debug, Error)]
pub enum AssetError {
    #[error("request failed: {0}")]
    Network(String),

    #[error("HTTP {status}")]
    Status { status: u16, content_type: String },

    #[error("empty response body")]
    EmptyBody { content_type: String },

    #[error("failed to write mirror file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to rewrite page: {0}")]
    Rewrite(#[from] lol_html::errors::RewritingError),
}

impl AssetError {
    /// Status for the assets table; 0 when no response was received
    fn status(&self) -> u16 {
        match self {
            Self::Status { status, .. } => *status,
            Self::EmptyBody { .. } => 200,
            _ => 0,
        }
    }

    fn content_type(&self) -> &str {
        match self {
            Self::Status { content_type, .. } | Self::EmptyBody { content_type } => {
                content_type.as_str()
            }
            _ => "",
        }
    }
}

#[derive(Debug)]
struct Slot {
    kind: AssetKind,
    /// Archive-relative path once mirrored; `None` inside marks a failed fetch
    cell: Arc<OnceCell<Option<PathBuf>>>,
}

/// Run-scoped map from absolute asset URL to its mirrored path
///
/// The first reference to a URL registers a slot; every later reference, including
/// ones racing the first fetch, awaits the same cell, so each distinct URL is fetched
/// at most once per run. Failures are remembered too.
#[derive(Debug, Default)]
pub struct AssetMap {
    slots: Mutex<HashMap<String, Slot>>,
}

impl AssetMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the slot for `url`, registering it with `kind` if it is new
    fn slot(&self, url: &Url, kind: AssetKind) -> (AssetKind, Arc<OnceCell<Option<PathBuf>>>) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let slot = slots.entry(url.to_string()).or_insert_with(|| Slot {
            kind,
            cell: Arc::new(OnceCell::new()),
        });
        (slot.kind, Arc::clone(&slot.cell))
    }

    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct Download {
    status: u16,
    content_type: String,
    body: Vec<u8>,
}

/// Downloads page assets and writes relocatable page copies
pub struct AssetMirror {
    client: Client,
    limiter: Arc<RateLimiter>,
    /// Host (and subdomains) whose assets are mirrored
    scope: SiteRoot,
    external_assets: bool,
    timeout: Duration,
    /// Directory the archive tree is staged in
    staging: PathBuf,
    map: AssetMap,
    sink: Arc<SynchronizedSink<AssetRecord>>,
    counters: Arc<CrawlCounters>,
}

impl AssetMirror {
    /// Creates a mirror writing below `staging`
    ///
    /// # Arguments
    ///
    /// * `client` - Client that follows redirects
    /// * `limiter` - Asset rate limiter; every download waits on it
    /// * `scope` - Assets on this host or its subdomains are mirrored
    /// * `config` - Mirror settings (external assets, timeout)
    /// * `staging` - Archive staging directory
    /// * `sink` - Assets table
    /// * `counters` - Run counters
    pub fn new(
        client: Client,
        limiter: Arc<RateLimiter>,
        scope: SiteRoot,
        config: &MirrorConfig,
        staging: impl Into<PathBuf>,
        sink: Arc<SynchronizedSink<AssetRecord>>,
        counters: Arc<CrawlCounters>,
    ) -> Self {
        Self {
            client,
            limiter,
            scope,
            external_assets: config.external_assets,
            timeout: Duration::from_secs(config.asset_timeout_secs),
            staging: staging.into(),
            map: AssetMap::new(),
            sink,
            counters,
        }
    }

    pub fn map(&self) -> &AssetMap {
        &self.map
    }

    /// Returns true if assets at `url` are mirrored
    pub fn in_scope(&self, url: &Url) -> bool {
        matches!(url.scheme(), "http" | "https")
            && (self.external_assets || self.scope.same_site_or_subdomain(url))
    }

    /// Mirrors one asset, returning its archive-relative path
    ///
    /// Out-of-scope URLs and failed downloads yield `None`. Stylesheets have their
    /// `url(...)` references mirrored and rewritten before they are saved.
    pub async fn mirror(&self, url: &Url, kind: AssetKind) -> Option<PathBuf> {
        if !self.in_scope(url) {
            return None;
        }
        let (kind, cell) = self.map.slot(url, kind);
        let path = asset_path(url, kind);
        if bucket_for(url, kind) == Bucket::Css {
            cell.get_or_init(|| self.fetch_stylesheet(url, path))
                .await
                .clone()
        } else {
            cell.get_or_init(|| self.fetch_asset(url, path)).await.clone()
        }
    }

    /// Mirrors a dependency of a stylesheet
    ///
    /// Nested stylesheets are never followed, so a stylesheet fetch only ever waits on
    /// plain asset fetches.
    async fn mirror_dependency(&self, url: &Url) -> Option<PathBuf> {
        if !self.in_scope(url) || bucket_for(url, AssetKind::Other) == Bucket::Css {
            return None;
        }
        let (kind, cell) = self.map.slot(url, AssetKind::Other);
        if bucket_for(url, kind) == Bucket::Css {
            return None;
        }
        let path = asset_path(url, kind);
        cell.get_or_init(|| self.fetch_asset(url, path)).await.clone()
    }

    async fn fetch_asset(&self, url: &Url, path: PathBuf) -> Option<PathBuf> {
        let result = match self.download(url).await {
            Ok(download) => self
                .store(&path, &download.body)
                .await
                .map(|_| download),
            Err(e) => Err(e),
        };
        self.finish(url, &path, result)
    }

    async fn fetch_stylesheet(&self, url: &Url, path: PathBuf) -> Option<PathBuf> {
        let result = match self.download(url).await {
            Ok(mut download) => {
                let text = String::from_utf8_lossy(&download.body).into_owned();
                let replacements = self.localize_css(&text, url, &path).await;
                download.body = rewrite_css(&text, &replacements).into_bytes();
                self.store(&path, &download.body).await.map(|_| download)
            }
            Err(e) => Err(e),
        };
        self.finish(url, &path, result)
    }

    /// Mirrors the `url(...)` references of a stylesheet saved at `css_path`
    ///
    /// Returns raw token → path relative to the stylesheet, for mirrored tokens only.
    async fn localize_css(
        &self,
        css: &str,
        css_url: &Url,
        css_path: &Path,
    ) -> HashMap<String, String> {
        let mut replacements = HashMap::new();
        for token in css_references(css) {
            let Ok(mut target) = css_url.join(&token) else {
                continue;
            };
            target.set_fragment(None);
            if target == *css_url {
                continue;
            }
            if let Some(local) = self.mirror_dependency(&target).await {
                if let Some(relative) = relative_reference(css_path, &local) {
                    replacements.insert(token, relative);
                }
            }
        }
        replacements
    }

    async fn download(&self, url: &Url) -> Result<Download, AssetError> {
        self.limiter.wait().await;
        let response = self
            .client
            .get(url.clone())
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| AssetError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if status != 200 {
            return Err(AssetError::Status {
                status,
                content_type,
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| AssetError::Network(e.to_string()))?;
        if body.is_empty() {
            return Err(AssetError::EmptyBody { content_type });
        }

        Ok(Download {
            status,
            content_type,
            body: body.to_vec(),
        })
    }

    async fn store(&self, path: &Path, bytes: &[u8]) -> Result<(), AssetError> {
        let target = self.staging.join(path);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, bytes).await?;
        Ok(())
    }

    /// Records the outcome of one download in the assets table
    fn finish(
        &self,
        url: &Url,
        path: &Path,
        result: Result<Download, AssetError>,
    ) -> Option<PathBuf> {
        let (record, local) = match result {
            Ok(download) => {
                tracing::debug!("[asset] {} -> {}", url, display_path(path));
                CrawlCounters::add(&self.counters.assets_mirrored, 1);
                let record = AssetRecord {
                    asset_url: url.to_string(),
                    status_code: download.status,
                    content_type: download.content_type,
                    local_path: display_path(path),
                };
                (record, Some(path.to_path_buf()))
            }
            Err(e) => {
                tracing::warn!("[asset] failed to mirror {}: {}", url, e);
                CrawlCounters::add(&self.counters.assets_failed, 1);
                let record = AssetRecord {
                    asset_url: url.to_string(),
                    status_code: e.status(),
                    content_type: e.content_type().to_string(),
                    local_path: String::new(),
                };
                (record, None)
            }
        };

        if let Err(e) = self.sink.append(&record) {
            tracing::error!("failed to record asset {}: {}", url, e);
        }
        local
    }

    /// Mirrors a page's assets, rewrites its references and saves it
    ///
    /// # Arguments
    ///
    /// * `html` - Page HTML (already prepared, in archive mode)
    /// * `page_url` - Canonical page URL; decides where the page is saved
    /// * `base_url` - URL the page's relative references resolve against
    /// * `strip_base` - Drop `<base>` so local paths resolve against the saved file
    ///
    /// # Returns
    ///
    /// The archive-relative path of the saved page. Asset failures never fail the
    /// page; only a rewrite or write error does.
    pub async fn snapshot_page(
        &self,
        html: &str,
        page_url: &Url,
        base_url: &Url,
        strip_base: bool,
    ) -> Result<PathBuf, AssetError> {
        let page_file = page_path(page_url);
        let (references, base) = {
            let document = Html::parse_document(html);
            let base = document_base(&document, base_url);
            (collect_references(&document, &base), base)
        };

        let mut replacements = Replacements {
            strip_base,
            ..Replacements::default()
        };
        for reference in references.assets {
            if replacements.attributes.contains_key(&reference.raw) {
                continue;
            }
            if let Some(local) = self.mirror(&reference.url, reference.kind).await {
                if let Some(relative) = relative_reference(&page_file, &local) {
                    replacements.attributes.insert(reference.raw, relative);
                }
            }
        }

        if !references.inline_styles.is_empty() {
            let inline_path = page_file.with_file_name(INLINE_STYLESHEET);
            if let Ok(inline_url) = base.join(INLINE_STYLESHEET) {
                for style in &references.inline_styles {
                    let tokens = self.localize_css(style, &inline_url, &inline_path).await;
                    replacements.inline_tokens.extend(tokens);
                }
            }
        }

        let rewritten = rewrite_references(html, &replacements)?;
        self.store(&page_file, rewritten.as_bytes()).await?;
        Ok(page_file)
    }
}

/// Saves a page without touching its references
pub async fn save_page(staging: &Path, page_url: &Url, html: &str) -> Result<PathBuf, AssetError> {
    let page_file = page_path(page_url);
    let target = staging.join(&page_file);
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&target, html).await?;
    Ok(page_file)
}

//! Archive-replay mode
//!
//! Instead of fetching the live site, pages are fetched from a Wayback-style web
//! archive at one snapshot timestamp. URLs are rewritten in both directions:
//! canonical site URLs become replay URLs before fetching, and replay links found in
//! archived pages are mapped back to canonical URLs before admission, so the frontier
//! only ever holds site URLs.

use crate::config::ArchiveConfig;
use crate::{Result, SnapError};
use lol_html::html_content::ContentType;
use lol_html::{element, HtmlRewriter, Settings};
use regex::Regex;
use reqwest::Client;
use std::cell::Cell;
use std::sync::LazyLock;
use std::time::Duration;
use url::Url;

/// `/web/<timestamp><flags>/<original url>`
static REPLAY_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/web/(\d+)[^/]*/(.*)$").expect("static replay pattern"));

static BASE_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<base[\s>/]").expect("static base pattern"));

static HEAD_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<head[\s>]").expect("static head pattern"));

/// Replay toolbar and banner elements injected by the archive
const TOOLBAR_SELECTORS: &[&str] = &["#wm-ipp", ".wm-ipp", "#playback", "#wm-capinfo", "#wm-toolbar"];

/// Captures kept when looking up the newest snapshot
const INDEX_LIMIT: &str = "50000";

/// URL rewriting for one archive snapshot
#[derive(Debug, Clone)]
pub struct ArchiveReplay {
    /// e.g. `https://web.archive.org/web/`
    replay_base: Url,
    timestamp: String,
}

impl ArchiveReplay {
    pub fn new(config: &ArchiveConfig, timestamp: impl Into<String>) -> Result<Self> {
        let mut replay_base = Url::parse(&config.replay_base)?;
        if !replay_base.path().ends_with('/') {
            let path = format!("{}/", replay_base.path());
            replay_base.set_path(&path);
        }
        Ok(Self {
            replay_base,
            timestamp: timestamp.into(),
        })
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    /// `scheme://host[:port]` of the archive
    pub fn origin(&self) -> String {
        self.replay_base.origin().ascii_serialization()
    }

    /// Base every archived page of this snapshot resolves against
    pub fn snapshot_base(&self) -> String {
        format!("{}{}/", self.replay_base, self.timestamp)
    }

    /// Replay URL serving `url` as it was at the snapshot timestamp
    pub fn replay_url(&self, url: &Url) -> Result<Url> {
        Ok(Url::parse(&format!("{}{}", self.snapshot_base(), url))?)
    }

    pub fn is_archive_url(&self, url: &Url) -> bool {
        url.host_str() == self.replay_base.host_str()
            && url.port_or_known_default() == self.replay_base.port_or_known_default()
    }

    /// Maps a replay URL back to the original URL it captures
    ///
    /// URLs on other hosts are returned unchanged. A replay URL without a scheme in
    /// its original part gets `http://`. Archive URLs that are not replay URLs (the
    /// archive's own pages) yield `None`.
    pub fn strip_replay_url(&self, url: &Url) -> Option<Url> {
        if !self.is_archive_url(url) {
            return Some(url.clone());
        }

        let captures = REPLAY_PATH.captures(url.path())?;
        let mut original = captures.get(2)?.as_str().to_string();
        if let Some(query) = url.query() {
            original.push('?');
            original.push_str(query);
        }

        let original = if original.starts_with("http://") || original.starts_with("https://") {
            original
        } else if let Some(rest) = original.strip_prefix("https:/") {
            // some replays collapse the scheme's double slash
            format!("https://{}", rest)
        } else if let Some(rest) = original.strip_prefix("http:/") {
            format!("http://{}", rest)
        } else {
            format!("http://{}", original)
        };
        Url::parse(&original).ok()
    }

    /// Resolves an `<a href>` found on an archived page to a canonical site URL
    ///
    /// Absolute archive links and `/web/...` paths are mapped back through
    /// [`strip_replay_url`](Self::strip_replay_url); anything else is resolved against
    /// the canonical page URL.
    pub fn canonical_link(&self, raw: &str, page_url: &Url) -> Option<Url> {
        let raw = raw.trim();
        if raw.is_empty() || raw.starts_with('#') {
            return None;
        }

        let resolved = if raw.starts_with("/web/") {
            Url::parse(&self.origin()).ok()?.join(raw).ok()?
        } else {
            match Url::parse(raw) {
                Ok(absolute) if self.is_archive_url(&absolute) => absolute,
                _ => page_url.join(raw).ok()?,
            }
        };
        let mut url = self.strip_replay_url(&resolved)?;
        url.set_fragment(None);
        Some(url)
    }

    /// Makes an archived page self-consistent before it is parsed and mirrored
    ///
    /// - injects `<base href="<replay-base><ts>/">` when the page has no `<base>`
    /// - absolutizes `link[href]`, `script[src]` and `img[src]` against the archive
    /// - removes the replay toolbar
    pub fn prepare_html(
        &self,
        html: &str,
    ) -> std::result::Result<String, lol_html::errors::RewritingError> {
        let base = self.snapshot_base();
        let base_tag = format!(r#"<base href="{}">"#, base);
        let needs_base = !BASE_TAG.is_match(html);
        let has_head = HEAD_TAG.is_match(html);
        let injected = Cell::new(false);

        let mut handlers = vec![
            element!("head", |el| {
                if needs_base && !injected.get() {
                    el.prepend(&base_tag, ContentType::Html);
                    injected.set(true);
                }
                Ok(())
            }),
            element!("html", |el| {
                if needs_base && !has_head && !injected.get() {
                    el.prepend(&format!("<head>{}</head>", base_tag), ContentType::Html);
                    injected.set(true);
                }
                Ok(())
            }),
            element!("link[href]", |el| {
                if let Some(value) = el.get_attribute("href") {
                    if let Some(absolute) = self.absolutize(&value) {
                        el.set_attribute("href", &absolute)?;
                    }
                }
                Ok(())
            }),
            element!("script[src]", |el| {
                if let Some(value) = el.get_attribute("src") {
                    if let Some(absolute) = self.absolutize(&value) {
                        el.set_attribute("src", &absolute)?;
                    }
                }
                Ok(())
            }),
            element!("img[src]", |el| {
                if let Some(value) = el.get_attribute("src") {
                    if let Some(absolute) = self.absolutize(&value) {
                        el.set_attribute("src", &absolute)?;
                    }
                }
                Ok(())
            }),
        ];
        for selector in TOOLBAR_SELECTORS {
            handlers.push(element!(*selector, |el| {
                el.remove();
                Ok(())
            }));
        }

        let mut output = Vec::with_capacity(html.len() + base_tag.len());
        let mut rewriter = HtmlRewriter::new(
            Settings {
                element_content_handlers: handlers,
                ..Settings::default()
            },
            |c: &[u8]| output.extend_from_slice(c),
        );
        rewriter.write(html.as_bytes())?;
        rewriter.end()?;

        let mut prepared = String::from_utf8_lossy(&output).into_owned();
        if needs_base && !injected.get() {
            prepared.insert_str(0, &base_tag);
        }
        Ok(prepared)
    }

    /// Archive-absolute form of a subresource reference, if it needs one
    fn absolutize(&self, value: &str) -> Option<String> {
        let value = value.trim();
        let already_absolute = ["http://", "https://", "data:", "mailto:", "tel:", "#"]
            .iter()
            .any(|prefix| value.starts_with(prefix));
        if value.is_empty() || already_absolute {
            return None;
        }
        if value.starts_with("/web/") {
            return Some(format!("{}{}", self.origin(), value));
        }
        if value.starts_with("//") {
            return Some(format!("https:{}", value));
        }
        Url::parse(&self.snapshot_base())
            .and_then(|base| base.join(value))
            .ok()
            .map(|url| url.to_string())
    }
}

/// Looks up the newest successful capture of `host` in the archive's CDX index
///
/// # Errors
///
/// [`SnapError::ArchiveIndex`] when the index has no capture or answers with
/// something other than a JSON row table; [`SnapError::Http`] when it cannot be
/// reached.
pub async fn latest_timestamp(
    client: &Client,
    index_url: &str,
    host: &str,
    timeout: Duration,
) -> Result<String> {
    let response = client
        .get(index_url)
        .query(&[
            ("url", host),
            ("output", "json"),
            ("fl", "timestamp,original,statuscode"),
            ("filter", "statuscode:200"),
            ("from", "1996"),
            ("limit", INDEX_LIMIT),
        ])
        .timeout(timeout)
        .send()
        .await
        .and_then(|response| response.error_for_status())
        .map_err(|source| SnapError::Http {
            url: index_url.to_string(),
            source,
        })?;

    let body = response.text().await.map_err(|source| SnapError::Http {
        url: index_url.to_string(),
        source,
    })?;
    let rows: Vec<Vec<String>> = if body.trim().is_empty() {
        Vec::new()
    } else {
        serde_json::from_str(&body)
            .map_err(|e| SnapError::ArchiveIndex(format!("unreadable index response: {}", e)))?
    };

    // first row is the field header
    rows.iter()
        .skip(1)
        .last()
        .and_then(|row| row.first())
        .filter(|ts| !ts.is_empty())
        .cloned()
        .ok_or_else(|| SnapError::ArchiveIndex(format!("no snapshots found for {}", host)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn replay() -> ArchiveReplay {
        let config = ArchiveConfig {
            replay_base: "https://archive.example/web/".to_string(),
            ..ArchiveConfig::default()
        };
        ArchiveReplay::new(&config, "20210101000000").unwrap()
    }

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_replay_url() {
        let replay = replay();
        let target = replay.replay_url(&url("http://example.com/x/")).unwrap();
        assert_eq!(
            target.as_str(),
            "https://archive.example/web/20210101000000/http://example.com/x/"
        );
        assert_eq!(replay.origin(), "https://archive.example");
    }

    #[test]
    fn test_strip_replay_url() {
        let replay = replay();
        let stripped = replay
            .strip_replay_url(&url("https://archive.example/web/20210101000000/http://example.com/x"))
            .unwrap();
        assert_eq!(stripped.as_str(), "http://example.com/x");

        // flags after the timestamp and a schemeless original
        let stripped = replay
            .strip_replay_url(&url("https://archive.example/web/20210101000000id_/example.com/a?b=1"))
            .unwrap();
        assert_eq!(stripped.as_str(), "http://example.com/a?b=1");

        let untouched = url("http://example.com/y");
        assert_eq!(replay.strip_replay_url(&untouched), Some(untouched.clone()));

        assert_eq!(replay.strip_replay_url(&url("https://archive.example/about")), None);
    }

    #[test]
    fn test_canonical_link() {
        let replay = replay();
        let page = url("http://example.com/blog/");
        assert_eq!(
            replay
                .canonical_link("/web/20200505000000/http://example.com/pricing", &page)
                .unwrap()
                .as_str(),
            "http://example.com/pricing"
        );
        assert_eq!(
            replay
                .canonical_link("https://archive.example/web/2020/https://example.com/a#x", &page)
                .unwrap()
                .as_str(),
            "https://example.com/a"
        );
        assert_eq!(
            replay.canonical_link("post-1", &page).unwrap().as_str(),
            "http://example.com/blog/post-1"
        );
        assert_eq!(replay.canonical_link("#top", &page), None);
    }

    #[test]
    fn test_prepare_html_injects_base_and_absolutizes() {
        let replay = replay();
        let html = r#"<html><head><link rel="stylesheet" href="/web/20210101000000cs_/http://example.com/s.css"></head><body><img src="//cdn.example.com/a.png"><script src="app.js"></script><div id="wm-ipp">toolbar</div><p>kept</p></body></html>"#;
        let prepared = replay.prepare_html(html).unwrap();

        assert!(prepared.contains(r#"<head><base href="https://archive.example/web/20210101000000/">"#));
        assert!(prepared
            .contains(r#"href="https://archive.example/web/20210101000000cs_/http://example.com/s.css""#));
        assert!(prepared.contains(r#"src="https://cdn.example.com/a.png""#));
        assert!(prepared.contains(r#"src="https://archive.example/web/20210101000000/app.js""#));
        assert!(!prepared.contains("toolbar"));
        assert!(prepared.contains("<p>kept</p>"));
    }

    #[test]
    fn test_prepare_html_keeps_existing_base() {
        let replay = replay();
        let html = r#"<html><head><base href="https://example.com/"></head><body></body></html>"#;
        let prepared = replay.prepare_html(html).unwrap();
        assert_eq!(prepared.matches("<base").count(), 1);
    }
}

//! HTML page processing
//!
//! This module turns one fetched HTML document into everything the crawler needs
//! from it:
//! - The outbound links to record and offer to the frontier
//! - The images to record and probe
//! - The [`PageRecord`] row for the pages table (see [`crate::crawler::fields`])
//!
//! Processing is a pure function of its inputs; no network access happens here.

use crate::crawler::archive::ArchiveReplay;
use crate::crawler::fetcher::RedirectHop;
use crate::crawler::fields::{build_record, clean_text, RecordContext};
use crate::output::PageRecord;
use crate::url::{normalize_parsed, resolve_href, SiteRoot};
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use url::Url;

/// Attributes lazy-loading scripts use to hold the real image URL
const LAZY_ATTRS: &[&str] = &["data-src", "data-original", "data-lazy", "data-img", "data-url"];

/// Everything known about a fetched page before it is parsed
#[derive(Debug, Clone)]
pub struct PageInput<'a> {
    /// Canonical page URL, as held by the frontier
    pub page_url: &'a Url,
    /// URL relative references are resolved against (the final URL after redirects,
    /// or the replay URL in archive mode)
    pub base_url: &'a Url,
    pub html: &'a str,
    pub status: u16,
    pub content_type: &'a str,
    pub redirect_chain: &'a [RedirectHop],
    pub snapshot_timestamp: Option<&'a str>,
}

/// An `<a href>` resolved to an absolute http(s) URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredLink {
    /// Absolute URL as written on the page, fragment removed
    pub url: Url,
    /// Normalized form pinned to the root host, as the frontier holds it
    pub normalized: Url,
    pub text: String,
}

/// An image reference resolved to an absolute http(s) URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredImage {
    pub url: Url,
    pub alt: String,
}

/// Result of processing one page
#[derive(Debug, Clone)]
pub struct ProcessedPage {
    pub record: PageRecord,
    /// Every link occurrence, in document order
    pub links: Vec<DiscoveredLink>,
    /// Distinct images, in document order
    pub images: Vec<DiscoveredImage>,
}

/// Parses a page and extracts its links, images and page record
///
/// # Link Resolution
///
/// - Live mode: relative to the document's `<base href>` if present, otherwise to
///   `base_url`; then normalized and pinned to the root host
/// - Archive mode: replay links are mapped back to the original site before
///   normalization, so the frontier never sees archive URLs
///
/// `mailto:`, `tel:`, `javascript:`, `data:` and fragment-only links are skipped.
///
/// # Example
///
/// ```
/// use sitesnap::crawler::{process_page, PageInput};
/// use sitesnap::SiteRoot;
/// use url::Url;
///
/// let url = Url::parse("https://example.com/").unwrap();
/// let root = SiteRoot::new(&url, false).unwrap();
/// let html = r#"<html><head><title>Home</title></head><body><a href="/about">About</a></body></html>"#;
/// let input = PageInput {
///     page_url: &url,
///     base_url: &url,
///     html,
///     status: 200,
///     content_type: "text/html",
///     redirect_chain: &[],
///     snapshot_timestamp: None,
/// };
/// let page = process_page(&input, &root, None);
/// assert_eq!(page.record.page_title, "Home");
/// assert_eq!(page.links[0].url.as_str(), "https://example.com/about");
/// assert_eq!(page.links[0].normalized.as_str(), "https://example.com/about/");
/// ```
pub fn process_page(
    input: &PageInput<'_>,
    root: &SiteRoot,
    replay: Option<&ArchiveReplay>,
) -> ProcessedPage {
    let document = Html::parse_document(input.html);

    let link_base = match replay {
        Some(_) => input.base_url.clone(),
        None => document_base(&document, input.base_url),
    };
    let links = extract_links(&document, input.page_url, &link_base, root, replay);
    let images = extract_images(&document, input.base_url);

    let context = RecordContext {
        page_url: input.page_url,
        base_url: input.base_url,
        root,
        status: input.status,
        content_type: input.content_type,
        redirect_chain: input.redirect_chain,
        snapshot_timestamp: input.snapshot_timestamp,
        body_bytes: input.html.len(),
    };
    let record = build_record(&document, &context, &links, &images);

    ProcessedPage {
        record,
        links,
        images,
    }
}

/// Honors `<base href>` when the page declares one
pub(crate) fn document_base(document: &Html, fallback: &Url) -> Url {
    let Ok(selector) = Selector::parse("base[href]") else {
        return fallback.clone();
    };
    document
        .select(&selector)
        .next()
        .and_then(|base| base.value().attr("href"))
        .and_then(|href| fallback.join(href.trim()).ok())
        .filter(|url| matches!(url.scheme(), "http" | "https"))
        .unwrap_or_else(|| fallback.clone())
}

fn extract_links(
    document: &Html,
    page_url: &Url,
    base: &Url,
    root: &SiteRoot,
    replay: Option<&ArchiveReplay>,
) -> Vec<DiscoveredLink> {
    let mut links = Vec::new();
    let Ok(selector) = Selector::parse("a[href]") else {
        return links;
    };

    for anchor in document.select(&selector) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };

        let resolved = match replay {
            Some(replay) => replay.canonical_link(href, page_url),
            None => resolve_href(base, href),
        };
        let Some(url) = resolved.filter(|u| matches!(u.scheme(), "http" | "https")) else {
            continue;
        };
        let Ok(normalized) = normalize_parsed(url.clone()) else {
            continue;
        };

        links.push(DiscoveredLink {
            url,
            normalized: root.pin(normalized),
            text: element_text(&anchor),
        });
    }

    links
}

/// Collects image references, one per element, deduplicated by URL
///
/// For `<img>`, the first `srcset` candidate wins, then a non-`data:` `src`, then the
/// lazy-loading attributes. `<picture><source srcset>` candidates are added too and
/// borrow the `alt` of the picture's `<img>`.
fn extract_images(document: &Html, base: &Url) -> Vec<DiscoveredImage> {
    let mut images = Vec::new();
    let mut seen = HashSet::new();

    let mut push = |raw: Option<&str>, alt: String| {
        let Some(url) = raw.and_then(|raw| resolve_image(base, raw)) else {
            return;
        };
        if seen.insert(url.as_str().to_string()) {
            images.push(DiscoveredImage { url, alt });
        }
    };

    if let Ok(selector) = Selector::parse("img, picture source[srcset]") {
        for element in document.select(&selector) {
            if element.value().name() == "source" {
                let alt = picture_alt(&element);
                push(element.value().attr("srcset").map(first_candidate), alt);
            } else {
                let alt = clean_text(element.value().attr("alt").unwrap_or_default());
                push(pick_image_source(&element), alt);
            }
        }
    }

    images
}

/// The most specific image URL an `<img>` declares
pub fn pick_image_source<'a>(img: &ElementRef<'a>) -> Option<&'a str> {
    let attrs = img.value();
    if let Some(srcset) = attrs.attr("srcset").or_else(|| attrs.attr("data-srcset")) {
        let first = first_candidate(srcset);
        if !first.is_empty() {
            return Some(first);
        }
    }
    if let Some(src) = attrs.attr("src") {
        let src = src.trim();
        if !src.is_empty() && !src.starts_with("data:") {
            return Some(src);
        }
    }
    LAZY_ATTRS
        .iter()
        .filter_map(|name| attrs.attr(name))
        .map(first_candidate)
        .find(|value| !value.is_empty())
}

/// First URL of a `srcset`-style list (`a.png 1x, b.png 2x` yields `a.png`)
pub fn first_candidate(srcset: &str) -> &str {
    srcset
        .split(',')
        .next()
        .unwrap_or_default()
        .split_whitespace()
        .next()
        .unwrap_or_default()
}

fn resolve_image(base: &Url, raw: &str) -> Option<Url> {
    let raw = raw.trim();
    if raw.is_empty() || raw.starts_with("data:") {
        return None;
    }
    let mut url = base.join(raw).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    url.set_fragment(None);
    Some(url)
}

fn picture_alt(source: &ElementRef<'_>) -> String {
    let Some(picture) = source.parent().and_then(ElementRef::wrap) else {
        return String::new();
    };
    picture
        .children()
        .filter_map(ElementRef::wrap)
        .find(|child| child.value().name() == "img")
        .and_then(|img| img.value().attr("alt"))
        .map(clean_text)
        .unwrap_or_default()
}

fn element_text(element: &ElementRef<'_>) -> String {
    clean_text(&element.text().collect::<Vec<_>>().join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn process(html: &str, page: &str) -> ProcessedPage {
        let page_url = url(page);
        let root = SiteRoot::new(&page_url, false).unwrap();
        let input = PageInput {
            page_url: &page_url,
            base_url: &page_url,
            html,
            status: 200,
            content_type: "text/html",
            redirect_chain: &[],
            snapshot_timestamp: None,
        };
        process_page(&input, &root, None)
    }

    #[test]
    fn test_links_resolved_and_normalized() {
        let html = r##"<a href="/about">About  us</a>
            <a href="contact#form">Contact</a>
            <a href="https://other.com/x">Elsewhere</a>
            <a href="mailto:hi@example.com">Mail</a>
            <a href="#top">Top</a>
            <a href="javascript:void(0)">JS</a>"##;
        let page = process(html, "https://example.com/company/");

        let urls: Vec<&str> = page.links.iter().map(|l| l.normalized.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://example.com/about/",
                "https://example.com/company/contact/",
                "https://other.com/x/",
            ]
        );
        assert_eq!(page.links[0].text, "About us");
    }

    #[test]
    fn test_links_keep_the_url_as_written() {
        let html = r#"<a href="https://other.test/x">X</a>
            <a href="https://other.test/api?id=1#results">API</a>
            <a href="/about">About</a>"#;
        let page = process(html, "https://example.com/");

        let urls: Vec<&str> = page.links.iter().map(|l| l.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://other.test/x",
                "https://other.test/api?id=1",
                "https://example.com/about",
            ]
        );
        assert_eq!(page.links[1].normalized.as_str(), "https://other.test/api/?id=1");
    }

    #[test]
    fn test_www_variant_pinned_to_root_host() {
        let page = process(
            r#"<a href="https://www.example.com/pricing">Pricing</a>"#,
            "https://example.com/",
        );
        assert_eq!(page.links[0].normalized.as_str(), "https://example.com/pricing/");
    }

    #[test]
    fn test_base_element_honored() {
        let page = process(
            r#"<head><base href="https://example.com/docs/"></head><a href="intro">Intro</a>"#,
            "https://example.com/",
        );
        assert_eq!(page.links[0].normalized.as_str(), "https://example.com/docs/intro/");
    }

    #[test]
    fn test_image_discovery_rules() {
        let html = r#"
            <img src="/logo.png" alt="Logo">
            <img src="data:image/gif;base64,R0lGOD" data-src="/lazy.jpg">
            <img srcset="/small.jpg 480w, /large.jpg 1080w" src="/fallback.jpg" alt="Sized">
            <img src="/logo.png" alt="Duplicate">
            <picture><source srcset="/hero.webp 1x, /hero@2x.webp 2x"><img src="/hero.jpg" alt="Hero"></picture>
        "#;
        let page = process(html, "https://example.com/");

        let urls: Vec<&str> = page.images.iter().map(|i| i.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://example.com/logo.png",
                "https://example.com/lazy.jpg",
                "https://example.com/small.jpg",
                "https://example.com/hero.webp",
                "https://example.com/hero.jpg",
            ]
        );
        assert_eq!(page.images[0].alt, "Logo");
        assert_eq!(page.images[1].alt, "");
        assert_eq!(page.images[3].alt, "Hero");
    }

    #[test]
    fn test_first_candidate() {
        assert_eq!(first_candidate("a.png 1x, b.png 2x"), "a.png");
        assert_eq!(first_candidate("  c.png  "), "c.png");
        assert_eq!(first_candidate(""), "");
    }

    #[test]
    fn test_record_is_filled() {
        let html = r#"<html lang="en"><head><title> Home  Page </title></head>
            <body><h1>Welcome</h1><a href="/a">A</a><a href="https://x.org/">X</a></body></html>"#;
        let page = process(html, "https://example.com/");
        assert_eq!(page.record.page_url, "https://example.com/");
        assert_eq!(page.record.page_title, "Home Page");
        assert_eq!(page.record.headings[0], "Welcome");
        assert_eq!(page.record.links_internal, 1);
        assert_eq!(page.record.links_external, 1);
        assert!(page.record.is_homepage);
    }
}

//! Asset references in HTML pages
//!
//! Rewriting happens in two passes. [`collect_references`] walks the parsed document
//! and lists every asset reference; the caller mirrors them (asynchronously) and then
//! [`rewrite_references`] streams the page through `lol_html`, swapping in the local
//! paths from precomputed maps.

use crate::crawler::parser::first_candidate;
use crate::mirror::css::rewrite_css;
use crate::mirror::paths::AssetKind;
use lol_html::{element, HtmlRewriter, Settings};
use scraper::{ElementRef, Html, Selector};
use std::collections::HashMap;
use url::Url;

/// One attribute value that points at an asset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetReference {
    /// Attribute value as written in the page (first candidate for `srcset`)
    pub raw: String,
    pub url: Url,
    pub kind: AssetKind,
}

/// Asset references of one page
#[derive(Debug, Clone, Default)]
pub struct PageReferences {
    pub assets: Vec<AssetReference>,
    /// Values of `style` attributes that contain `url(`
    pub inline_styles: Vec<String>,
}

/// Local replacements for one page, keyed by the original attribute text
#[derive(Debug, Clone, Default)]
pub struct Replacements {
    /// Raw attribute value → relative path
    pub attributes: HashMap<String, String>,
    /// Raw `url(...)` token in an inline style → relative path
    pub inline_tokens: HashMap<String, String>,
    /// Remove `<base>` elements so relative paths resolve against the local file
    pub strip_base: bool,
}

impl Replacements {
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty() && self.inline_tokens.is_empty() && !self.strip_base
    }
}

/// Link relations whose target is mirrored
fn link_kind(link: &ElementRef<'_>) -> Option<AssetKind> {
    let rel = link.value().attr("rel").unwrap_or_default().to_ascii_lowercase();
    let tokens: Vec<&str> = rel.split_whitespace().collect();

    if tokens.contains(&"stylesheet") {
        return Some(AssetKind::Stylesheet);
    }
    if tokens.iter().any(|t| t.contains("icon")) {
        return Some(AssetKind::Image);
    }
    if tokens.contains(&"preload") {
        return match link.value().attr("as").unwrap_or_default() {
            "style" => Some(AssetKind::Stylesheet),
            "script" => Some(AssetKind::Script),
            "font" => Some(AssetKind::Font),
            "image" => Some(AssetKind::Image),
            _ => None,
        };
    }
    let href = link.value().attr("href").unwrap_or_default();
    if href.split(['?', '#']).next().unwrap_or_default().ends_with(".css") {
        return Some(AssetKind::Stylesheet);
    }
    None
}

/// Lists every asset reference in a page
///
/// # Collected References
///
/// - `link[href]`: stylesheets, icons, preloads
/// - `script[src]`, `img[src]`, the first `img[srcset]` candidate
/// - `source[src]`, `video[src]`, `video[poster]`, `audio[src]`
/// - `style` attributes containing `url(...)`
///
/// `base` is the URL relative references resolve against. Only http(s) targets are
/// returned; scope filtering is left to the mirror.
pub fn collect_references(document: &Html, base: &Url) -> PageReferences {
    let mut refs = PageReferences::default();
    let mut push = |raw: &str, kind: AssetKind| {
        let raw = raw.trim();
        if raw.is_empty() || raw.starts_with("data:") || raw.starts_with('#') {
            return;
        }
        let Ok(mut url) = base.join(raw) else {
            return;
        };
        if !matches!(url.scheme(), "http" | "https") {
            return;
        }
        url.set_fragment(None);
        refs.assets.push(AssetReference {
            raw: raw.to_string(),
            url,
            kind,
        });
    };

    let targets: &[(&str, &str, AssetKind)] = &[
        ("script[src]", "src", AssetKind::Script),
        ("img[src]", "src", AssetKind::Image),
        ("source[src]", "src", AssetKind::Media),
        ("video[src]", "src", AssetKind::Media),
        ("video[poster]", "poster", AssetKind::Image),
        ("audio[src]", "src", AssetKind::Media),
    ];

    if let Ok(selector) = Selector::parse("link[href]") {
        for link in document.select(&selector) {
            if let (Some(kind), Some(href)) = (link_kind(&link), link.value().attr("href")) {
                push(href, kind);
            }
        }
    }

    for (css, attr, kind) in targets {
        if let Ok(selector) = Selector::parse(css) {
            for element in document.select(&selector) {
                if let Some(value) = element.value().attr(attr) {
                    push(value, *kind);
                }
            }
        }
    }

    if let Ok(selector) = Selector::parse("img[srcset]") {
        for img in document.select(&selector) {
            if let Some(srcset) = img.value().attr("srcset") {
                push(first_candidate(srcset), AssetKind::Image);
            }
        }
    }

    if let Ok(selector) = Selector::parse("[style]") {
        for element in document.select(&selector) {
            if let Some(style) = element.value().attr("style") {
                if style.to_ascii_lowercase().contains("url(") {
                    refs.inline_styles.push(style.to_string());
                }
            }
        }
    }

    refs
}

/// Attribute text as it will be looked up in the replacement map
fn lookup_key(value: &str) -> String {
    value.trim().replace("&amp;", "&")
}

/// Streams `html` through the rewriter, replacing mirrored references
pub fn rewrite_references(
    html: &str,
    replacements: &Replacements,
) -> Result<String, lol_html::errors::RewritingError> {
    if replacements.is_empty() {
        return Ok(html.to_string());
    }

    let swap = |el: &mut lol_html::html_content::Element<'_, '_>, attr: &str| {
        let local = el
            .get_attribute(attr)
            .and_then(|value| replacements.attributes.get(&lookup_key(&value)).cloned());
        match local {
            Some(local) => el.set_attribute(attr, &local),
            None => Ok(()),
        }
    };

    let mut output = Vec::with_capacity(html.len());
    let mut rewriter = HtmlRewriter::new(
        Settings {
            element_content_handlers: vec![
                element!("base", |el| {
                    if replacements.strip_base {
                        el.remove();
                    }
                    Ok(())
                }),
                element!("link[href]", |el| {
                    swap(el, "href")?;
                    Ok(())
                }),
                element!("script[src]", |el| {
                    swap(el, "src")?;
                    Ok(())
                }),
                element!("img[src]", |el| {
                    swap(el, "src")?;
                    Ok(())
                }),
                element!("source[src]", |el| {
                    swap(el, "src")?;
                    Ok(())
                }),
                element!("video[src]", |el| {
                    swap(el, "src")?;
                    Ok(())
                }),
                element!("audio[src]", |el| {
                    swap(el, "src")?;
                    Ok(())
                }),
                element!("video[poster]", |el| {
                    swap(el, "poster")?;
                    Ok(())
                }),
                element!("img[srcset]", |el| {
                    let local = el.get_attribute("srcset").and_then(|srcset| {
                        replacements
                            .attributes
                            .get(&lookup_key(first_candidate(&srcset)))
                            .cloned()
                    });
                    if let Some(local) = local {
                        el.set_attribute("srcset", &local)?;
                    }
                    Ok(())
                }),
                element!("[style]", |el| {
                    if let Some(style) = el.get_attribute("style") {
                        let rewritten = rewrite_css(&style, &replacements.inline_tokens);
                        if rewritten != style {
                            el.set_attribute("style", &rewritten)?;
                        }
                    }
                    Ok(())
                }),
            ],
            ..Settings::default()
        },
        |c: &[u8]| output.extend_from_slice(c),
    );

    rewriter.write(html.as_bytes())?;
    rewriter.end()?;

    Ok(String::from_utf8_lossy(&output).into_owned())
}

//! Pages-table field extraction
//!
//! Builds the [`PageRecord`] for one parsed document. Text fields are whitespace
//! collapsed; multi-valued fields are joined with `;` (headings with `; `).

use crate::crawler::fetcher::RedirectHop;
use crate::crawler::parser::{DiscoveredImage, DiscoveredLink};
use crate::output::PageRecord;
use crate::url::{extract_domain, strip_www, SiteRoot};
use scraper::{ElementRef, Html, Node, Selector};
use std::collections::BTreeSet;
use url::Url;

/// Headings kept per level
const MAX_HEADINGS: usize = 50;

/// Image URLs kept in the `images` column
const MAX_IMAGE_URLS: usize = 200;

/// Document links kept in the `documents` column
const MAX_DOCUMENTS: usize = 200;

const DOCUMENT_EXTENSIONS: &[&str] = &[".pdf", ".doc", ".docx", ".ppt", ".pptx", ".xls", ".xlsx"];

/// Subtrees that never count as visible copy
const INVISIBLE_TAGS: &[&str] = &["script", "style", "noscript", "nav", "footer", "header"];

/// Page facts that do not come from the document itself
#[derive(Debug, Clone)]
pub struct RecordContext<'a> {
    pub page_url: &'a Url,
    pub base_url: &'a Url,
    pub root: &'a SiteRoot,
    pub status: u16,
    pub content_type: &'a str,
    pub redirect_chain: &'a [RedirectHop],
    pub snapshot_timestamp: Option<&'a str>,
    pub body_bytes: usize,
}

/// Builds the pages-table row for a document
///
/// `links` and `images` are the already resolved references of the page; they drive
/// the link counts, the document list and the image columns.
pub fn build_record(
    document: &Html,
    ctx: &RecordContext<'_>,
    links: &[DiscoveredLink],
    images: &[DiscoveredImage],
) -> PageRecord {
    let links_internal = links
        .iter()
        .filter(|link| ctx.root.same_site_or_subdomain(&link.normalized))
        .count();

    let documents: Vec<&str> = links
        .iter()
        .filter(|link| is_document(&link.url))
        .map(|link| link.url.as_str())
        .take(MAX_DOCUMENTS)
        .collect();

    let image_urls: Vec<&str> = images
        .iter()
        .map(|image| image.url.as_str())
        .take(MAX_IMAGE_URLS)
        .collect();

    let robots = meta_name(document, "robots");
    let visible = visible_text(document);

    PageRecord {
        page_url: ctx.page_url.to_string(),
        status_code: ctx.status,
        content_type: ctx.content_type.to_string(),
        is_homepage: is_homepage(ctx.page_url, ctx.root),
        page_title: first_text(document, "title"),
        meta_title: non_empty_or(meta_name(document, "title"), || {
            meta_property(document, "og:title")
        }),
        meta_description: non_empty_or(meta_name(document, "description"), || {
            meta_property(document, "og:description")
        }),
        meta_keywords: meta_name(document, "keywords"),
        headings: headings(document),
        canonical_url: link_rel(document, "canonical"),
        og_title: meta_property(document, "og:title"),
        og_description: meta_property(document, "og:description"),
        og_image: meta_property(document, "og:image"),
        twitter_card: meta_name(document, "twitter:card"),
        twitter_title: meta_name(document, "twitter:title"),
        twitter_description: meta_name(document, "twitter:description"),
        lang_attr: document
            .root_element()
            .value()
            .attr("lang")
            .map(|lang| lang.trim().to_string())
            .unwrap_or_default(),
        word_count: visible.split_whitespace().count(),
        links_internal,
        links_external: links.len() - links_internal,
        images_count: images.len(),
        images_missing_alt: images.iter().filter(|image| image.alt.is_empty()).count(),
        images: image_urls.join(";"),
        video_embeds: video_embeds(document, ctx.base_url),
        documents: documents.join(";"),
        schema_types: schema_types(document),
        date_published: non_empty_or(meta_property(document, "article:published_time"), || {
            meta_name(document, "date")
        }),
        date_modified: non_empty_or(meta_property(document, "article:modified_time"), || {
            meta_name(document, "last-modified")
        }),
        hreflang_tags: hreflang_tags(document),
        pagination_prev: non_empty_or(link_rel(document, "prev"), || {
            link_rel(document, "previous")
        }),
        pagination_next: link_rel(document, "next"),
        snapshot_timestamp: ctx.snapshot_timestamp.unwrap_or_default().to_string(),
        indexability: indexability(&robots, ctx.redirect_chain).to_string(),
        redirect_chain: format_redirect_chain(ctx.redirect_chain),
        readability: readability_label(&visible).to_string(),
        carbon_rating: carbon_rating(ctx.body_bytes).to_string(),
        robots,
    }
}

/// Collapses runs of whitespace to single spaces and trims
pub fn clean_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn select<'a>(document: &'a Html, css: &str) -> Vec<ElementRef<'a>> {
    match Selector::parse(css) {
        Ok(selector) => document.select(&selector).collect(),
        Err(_) => Vec::new(),
    }
}

fn text_of(element: &ElementRef<'_>) -> String {
    clean_text(&element.text().collect::<Vec<_>>().join(" "))
}

fn first_text(document: &Html, css: &str) -> String {
    select(document, css)
        .first()
        .map(text_of)
        .unwrap_or_default()
}

fn attr_of_first(document: &Html, css: &str, attr: &str) -> String {
    select(document, css)
        .first()
        .and_then(|element| element.value().attr(attr))
        .map(|value| value.trim().to_string())
        .unwrap_or_default()
}

fn meta_name(document: &Html, name: &str) -> String {
    attr_of_first(document, &format!(r#"meta[name="{}"]"#, name), "content")
}

fn meta_property(document: &Html, property: &str) -> String {
    attr_of_first(document, &format!(r#"meta[property="{}"]"#, property), "content")
}

fn link_rel(document: &Html, rel: &str) -> String {
    attr_of_first(document, &format!(r#"link[rel~="{}"][href]"#, rel), "href")
}

fn non_empty_or(value: String, fallback: impl FnOnce() -> String) -> String {
    if value.is_empty() {
        fallback()
    } else {
        value
    }
}

fn headings(document: &Html) -> [String; 6] {
    std::array::from_fn(|level| {
        select(document, &format!("h{}", level + 1))
            .iter()
            .map(text_of)
            .filter(|text| !text.is_empty())
            .take(MAX_HEADINGS)
            .collect::<Vec<_>>()
            .join("; ")
    })
}

fn is_homepage(url: &Url, root: &SiteRoot) -> bool {
    let on_root = extract_domain(url)
        .map(|host| strip_www(&host) == root.bare_host())
        .unwrap_or(false);
    on_root && matches!(url.path(), "" | "/" | "/index.html")
}

fn is_document(url: &Url) -> bool {
    let path = url.path().to_ascii_lowercase();
    DOCUMENT_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

fn video_embeds(document: &Html, base: &Url) -> String {
    select(document, "iframe[src]")
        .iter()
        .filter_map(|frame| frame.value().attr("src"))
        .filter_map(|src| base.join(src.trim()).ok())
        .map(|url| url.to_string())
        .collect::<Vec<_>>()
        .join(";")
}

fn hreflang_tags(document: &Html) -> String {
    select(document, r#"link[rel~="alternate"][hreflang][href]"#)
        .iter()
        .filter_map(|link| {
            let lang = link.value().attr("hreflang")?.trim();
            let href = link.value().attr("href")?.trim();
            Some(format!("{}:{}", lang, href))
        })
        .collect::<Vec<_>>()
        .join(";")
}

/// JSON-LD `@type` values (including `@graph` members) and microdata `itemtype`s
fn schema_types(document: &Html) -> String {
    let mut types = BTreeSet::new();

    for script in select(document, r#"script[type="application/ld+json"]"#) {
        let body = script.text().collect::<String>();
        match serde_json::from_str::<serde_json::Value>(&body) {
            Ok(value) => collect_ld_types(&value, &mut types),
            Err(e) => tracing::trace!("ignoring malformed JSON-LD block: {}", e),
        }
    }

    for element in select(document, "[itemscope][itemtype]") {
        if let Some(itemtype) = element.value().attr("itemtype") {
            types.extend(itemtype.split_whitespace().map(str::to_string));
        }
    }

    types.into_iter().collect::<Vec<_>>().join(";")
}

fn collect_ld_types(value: &serde_json::Value, types: &mut BTreeSet<String>) {
    match value {
        serde_json::Value::Array(items) => {
            for item in items {
                collect_ld_types(item, types);
            }
        }
        serde_json::Value::Object(map) => {
            match map.get("@type") {
                Some(serde_json::Value::String(t)) => {
                    insert_clean(types, t);
                }
                Some(serde_json::Value::Array(ts)) => {
                    for t in ts.iter().filter_map(|t| t.as_str()) {
                        insert_clean(types, t);
                    }
                }
                _ => {}
            }
            if let Some(graph) = map.get("@graph") {
                collect_ld_types(graph, types);
            }
        }
        _ => {}
    }
}

fn insert_clean(types: &mut BTreeSet<String>, value: &str) {
    let cleaned = clean_text(value);
    if !cleaned.is_empty() {
        types.insert(cleaned);
    }
}

/// Text a reader would see, minus scripts, styles and page chrome
fn visible_text(document: &Html) -> String {
    let mut out = String::new();
    collect_visible(document.root_element(), &mut out);
    out
}

fn collect_visible(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => {
                out.push_str(text);
                out.push(' ');
            }
            Node::Element(el) if INVISIBLE_TAGS.contains(&el.name()) => {}
            Node::Element(_) => {
                if let Some(child) = ElementRef::wrap(child) {
                    collect_visible(child, out);
                }
            }
            _ => {}
        }
    }
}

fn indexability(robots: &str, redirect_chain: &[RedirectHop]) -> &'static str {
    if robots.to_ascii_lowercase().contains("noindex") || !redirect_chain.is_empty() {
        "Non-Indexable"
    } else {
        "Indexable"
    }
}

/// `status:from->to` hops joined with ` | `
pub fn format_redirect_chain(chain: &[RedirectHop]) -> String {
    chain
        .iter()
        .map(|hop| format!("{}:{}->{}", hop.status, hop.from, hop.to))
        .collect::<Vec<_>>()
        .join(" | ")
}

/// Flesch reading ease score, or `None` for pages without words
pub fn flesch_reading_ease(text: &str) -> Option<f64> {
    let words: Vec<&str> = text
        .split_whitespace()
        .filter(|word| word.chars().any(char::is_alphabetic))
        .collect();
    if words.is_empty() {
        return None;
    }

    let sentences = text
        .split(['.', '!', '?'])
        .filter(|sentence| sentence.chars().any(char::is_alphabetic))
        .count()
        .max(1);
    let syllables: usize = words.iter().map(|word| count_syllables(word)).sum();

    let words_per_sentence = words.len() as f64 / sentences as f64;
    let syllables_per_word = syllables as f64 / words.len() as f64;
    Some(206.835 - 1.015 * words_per_sentence - 84.6 * syllables_per_word)
}

/// Vowel-group syllable estimate, ignoring a trailing silent `e`
fn count_syllables(word: &str) -> usize {
    let letters: Vec<char> = word
        .chars()
        .filter(|c| c.is_alphabetic())
        .map(|c| c.to_ascii_lowercase())
        .collect();
    let is_vowel = |c: char| matches!(c, 'a' | 'e' | 'i' | 'o' | 'u' | 'y');

    let mut groups = 0;
    let mut previous_vowel = false;
    for &c in &letters {
        let vowel = is_vowel(c);
        if vowel && !previous_vowel {
            groups += 1;
        }
        previous_vowel = vowel;
    }

    let silent_e = letters.len() > 2
        && letters.ends_with(&['e'])
        && !letters.ends_with(&['l', 'e'])
        && !is_vowel(letters[letters.len() - 2]);
    if silent_e && groups > 1 {
        groups -= 1;
    }
    groups.max(1)
}

fn readability_label(text: &str) -> &'static str {
    let Some(score) = flesch_reading_ease(text) else {
        return "";
    };
    match score {
        s if s > 90.0 => "Very Easy",
        s if s > 80.0 => "Easy",
        s if s > 70.0 => "Fairly Easy",
        s if s > 60.0 => "Standard",
        s if s > 50.0 => "Fairly Difficult",
        s if s > 30.0 => "Difficult",
        _ => "Very Difficult",
    }
}

/// Grades page weight by estimated CO2 per view (0.2 mg per kB)
pub fn carbon_rating(bytes: usize) -> &'static str {
    let co2_mg = bytes as f64 / 1000.0 * 0.2;
    match co2_mg {
        mg if mg < 100.0 => "A",
        mg if mg < 200.0 => "B",
        mg if mg < 300.0 => "C",
        mg if mg < 400.0 => "D",
        _ => "E",
    }
}

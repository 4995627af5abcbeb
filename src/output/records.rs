//! Row types for every table in the snapshot archive

use crate::output::traits::{yes_or_empty, TableRow};

/// SEO and content snapshot of one fetched HTML page
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageRecord {
    pub page_url: String,
    pub status_code: u16,
    pub content_type: String,
    pub is_homepage: bool,
    pub page_title: String,
    pub meta_title: String,
    pub meta_description: String,
    pub meta_keywords: String,
    /// h1 through h6, each level joined with `; `
    pub headings: [String; 6],
    pub canonical_url: String,
    pub og_title: String,
    pub og_description: String,
    pub og_image: String,
    pub twitter_card: String,
    pub twitter_title: String,
    pub twitter_description: String,
    pub robots: String,
    pub lang_attr: String,
    pub word_count: usize,
    pub links_internal: usize,
    pub links_external: usize,
    pub images_count: usize,
    pub images_missing_alt: usize,
    pub images: String,
    pub video_embeds: String,
    pub documents: String,
    pub schema_types: String,
    pub date_published: String,
    pub date_modified: String,
    pub hreflang_tags: String,
    pub pagination_prev: String,
    pub pagination_next: String,
    pub snapshot_timestamp: String,
    pub indexability: String,
    pub redirect_chain: String,
    pub readability: String,
    pub carbon_rating: String,
}

impl TableRow for PageRecord {
    const HEADER: &'static [&'static str] = &[
        "page_url",
        "status_code",
        "content_type",
        "is_homepage",
        "page_title",
        "meta_title",
        "meta_description",
        "meta_keywords",
        "h1",
        "h2",
        "h3",
        "h4",
        "h5",
        "h6",
        "canonical_url",
        "og_title",
        "og_description",
        "og_image",
        "twitter_card",
        "twitter_title",
        "twitter_description",
        "robots",
        "lang_attr",
        "word_count",
        "links_internal",
        "links_external",
        "images_count",
        "images_missing_alt",
        "images",
        "video_embeds",
        "documents",
        "schema_types",
        "date_published",
        "date_modified",
        "hreflang_tags",
        "pagination_prev",
        "pagination_next",
        "snapshot_timestamp",
        "indexability",
        "redirect_chain",
        "readability",
        "carbon_rating",
    ];

    fn fields(&self) -> Vec<String> {
        let mut row = vec![
            self.page_url.clone(),
            self.status_code.to_string(),
            self.content_type.clone(),
            yes_or_empty(self.is_homepage),
            self.page_title.clone(),
            self.meta_title.clone(),
            self.meta_description.clone(),
            self.meta_keywords.clone(),
        ];
        row.extend(self.headings.iter().cloned());
        row.extend([
            self.canonical_url.clone(),
            self.og_title.clone(),
            self.og_description.clone(),
            self.og_image.clone(),
            self.twitter_card.clone(),
            self.twitter_title.clone(),
            self.twitter_description.clone(),
            self.robots.clone(),
            self.lang_attr.clone(),
            self.word_count.to_string(),
            self.links_internal.to_string(),
            self.links_external.to_string(),
            self.images_count.to_string(),
            self.images_missing_alt.to_string(),
            self.images.clone(),
            self.video_embeds.clone(),
            self.documents.clone(),
            self.schema_types.clone(),
            self.date_published.clone(),
            self.date_modified.clone(),
            self.hreflang_tags.clone(),
            self.pagination_prev.clone(),
            self.pagination_next.clone(),
            self.snapshot_timestamp.clone(),
            self.indexability.clone(),
            self.redirect_chain.clone(),
            self.readability.clone(),
            self.carbon_rating.clone(),
        ]);
        row
    }
}

/// One outbound link found on a page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkRecord {
    pub page_url: String,
    pub link_url: String,
    pub link_text: String,
}

impl TableRow for LinkRecord {
    const HEADER: &'static [&'static str] = &["page_url", "link_url", "link_text"];

    fn fields(&self) -> Vec<String> {
        vec![
            self.page_url.clone(),
            self.link_url.clone(),
            self.link_text.clone(),
        ]
    }
}

/// One image found on a page, with its probe result
///
/// Probe columns are `None` when the image was not probed (probing disabled, or the
/// per-page cap was reached).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRecord {
    pub page_url: String,
    pub image_url: String,
    pub alt_text: String,
    pub status_code: Option<u16>,
    pub content_type: Option<String>,
    pub is_broken: Option<bool>,
}

impl TableRow for ImageRecord {
    const HEADER: &'static [&'static str] = &[
        "page_url",
        "image_url",
        "alt_text",
        "status_code",
        "content_type",
        "is_broken",
    ];

    fn fields(&self) -> Vec<String> {
        vec![
            self.page_url.clone(),
            self.image_url.clone(),
            self.alt_text.clone(),
            self.status_code.map(|s| s.to_string()).unwrap_or_default(),
            self.content_type.clone().unwrap_or_default(),
            self.is_broken.map(yes_or_empty).unwrap_or_default(),
        ]
    }
}

/// One mirrored (or failed) asset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetRecord {
    pub asset_url: String,
    /// 0 when no response was received
    pub status_code: u16,
    pub content_type: String,
    /// Path inside the archive; empty when the asset could not be mirrored
    pub local_path: String,
}

impl TableRow for AssetRecord {
    const HEADER: &'static [&'static str] =
        &["asset_url", "status_code", "content_type", "local_path"];

    fn fields(&self) -> Vec<String> {
        vec![
            self.asset_url.clone(),
            self.status_code.to_string(),
            self.content_type.clone(),
            self.local_path.clone(),
        ]
    }
}

/// A URL abandoned after exhausting its retries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropRecord {
    pub url: String,
    pub reason: String,
}

impl TableRow for DropRecord {
    const HEADER: &'static [&'static str] = &["url", "reason"];

    fn fields(&self) -> Vec<String> {
        vec![self.url.clone(), self.reason.clone()]
    }
}

/// One `key,value` row of the run manifest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub key: &'static str,
    pub value: String,
}

impl ManifestEntry {
    pub fn new(key: &'static str, value: impl Into<String>) -> Self {
        Self {
            key,
            value: value.into(),
        }
    }
}

impl TableRow for ManifestEntry {
    const HEADER: &'static [&'static str] = &["key", "value"];

    fn fields(&self) -> Vec<String> {
        vec![self.key.to_string(), self.value.clone()]
    }
}

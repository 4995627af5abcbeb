//! Image reachability probes
//!
//! Each discovered image is probed with a HEAD request; when the server answers 200
//! without an image content type, a streamed GET reads the first few hundred bytes
//! and the type is sniffed from magic bytes. Results are memoized per run.

use crate::crawler::RateLimiter;
use reqwest::header::{ACCEPT, CONTENT_TYPE, REFERER};
use reqwest::{Client, RequestBuilder, Response};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use url::Url;

/// Outcome of probing one image URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    /// HTTP status; 0 when no response was received
    pub status: u16,
    pub content_type: String,
    pub broken: bool,
}

impl ProbeResult {
    fn unreachable() -> Self {
        Self {
            status: 0,
            content_type: String::new(),
            broken: true,
        }
    }

    fn classify(status: u16, content_type: String) -> Self {
        let broken = status >= 400 || (status == 200 && !is_image_type(&content_type));
        Self {
            status,
            content_type,
            broken,
        }
    }
}

/// Run-scoped memo of probe results keyed by absolute URL
#[derive(Debug, Default)]
pub struct ProbeCache {
    entries: Mutex<HashMap<String, ProbeResult>>,
}

impl ProbeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, url: &Url) -> Option<ProbeResult> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(url.as_str())
            .cloned()
    }

    pub fn insert(&self, url: &Url, result: ProbeResult) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(url.to_string(), result);
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Probes images through the image rate budget, consulting the cache first
#[derive(Debug)]
pub struct ImageProber {
    client: Client,
    timeout: Duration,
    probe_bytes: usize,
    cache: ProbeCache,
}

impl ImageProber {
    pub fn new(client: Client, timeout: Duration, probe_bytes: usize) -> Self {
        Self {
            client,
            timeout,
            probe_bytes,
            cache: ProbeCache::new(),
        }
    }

    /// Returns the (possibly cached) probe result for `url`
    ///
    /// # Arguments
    ///
    /// * `url` - Absolute image URL
    /// * `referer` - Page the image appears on, sent as `Referer`
    /// * `limiter` - Image rate limiter; every request waits on it
    pub async fn probe(&self, url: &Url, referer: &Url, limiter: &RateLimiter) -> ProbeResult {
        if let Some(hit) = self.cache.get(url) {
            return hit;
        }
        let result = self.probe_uncached(url, referer, limiter).await;
        self.cache.insert(url, result.clone());
        result
    }

    async fn probe_uncached(&self, url: &Url, referer: &Url, limiter: &RateLimiter) -> ProbeResult {
        limiter.wait().await;
        let head = match self.request(self.client.head(url.clone()), referer).send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!("image probe failed for {}: {}", url, e);
                return ProbeResult::unreachable();
            }
        };

        let status = head.status().as_u16();
        let content_type = header_content_type(&head);
        if status != 200 || is_image_type(&content_type) {
            return ProbeResult::classify(status, content_type);
        }

        // 200 without an image type: look at the bytes themselves
        limiter.wait().await;
        match self.request(self.client.get(url.clone()), referer).send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                let header_type = header_content_type(&response);
                let prefix = read_prefix(response, self.probe_bytes).await;
                let resolved = sniff_image_type(&prefix)
                    .map(str::to_string)
                    .unwrap_or(header_type);
                ProbeResult::classify(status, resolved)
            }
            Err(e) => {
                tracing::debug!("image sniff failed for {}: {}", url, e);
                ProbeResult::classify(status, content_type)
            }
        }
    }

    fn request(&self, builder: RequestBuilder, referer: &Url) -> RequestBuilder {
        builder
            .header(ACCEPT, "image/avif,image/webp,image/*,*/*;q=0.8")
            .header(REFERER, referer.as_str())
            .timeout(self.timeout)
    }
}

fn header_content_type(response: &Response) -> String {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or_default().trim().to_ascii_lowercase())
        .unwrap_or_default()
}

/// Reads at most `limit` bytes of the body, stopping early on errors
async fn read_prefix(mut response: Response, limit: usize) -> Vec<u8> {
    let mut buffer = Vec::with_capacity(limit);
    while buffer.len() < limit {
        match response.chunk().await {
            Ok(Some(chunk)) => {
                let take = (limit - buffer.len()).min(chunk.len());
                buffer.extend_from_slice(&chunk[..take]);
            }
            Ok(None) | Err(_) => break,
        }
    }
    buffer
}

/// Returns true for `image/*` content types
pub fn is_image_type(content_type: &str) -> bool {
    content_type.trim().to_ascii_lowercase().starts_with("image/")
}

/// Classifies a body prefix by its magic bytes
pub fn sniff_image_type(bytes: &[u8]) -> Option<&'static str> {
    if let Ok(format) = image::guess_format(bytes) {
        return Some(format.to_mime_type());
    }

    let text = String::from_utf8_lossy(bytes);
    let text = text.trim_start_matches('\u{feff}').trim_start();
    let lowered = text.to_ascii_lowercase();
    if lowered.starts_with("<svg") || (lowered.starts_with("<?xml") && lowered.contains("<svg")) {
        return Some("image/svg+xml");
    }
    None
}

//! Robots.txt handling module
//!
//! The crawled site's robots.txt is fetched once per run. Its disallow rules feed the
//! frontier's admission policy and its `Crawl-delay` slows the page rate limiter.

mod rules;

pub use rules::RobotsRules;

use crate::crawler::RateLimiter;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use url::Url;

/// Fetches and parses robots.txt for the site `root` belongs to
///
/// Any failure (network error, non-200 status, unreadable body) yields permissive
/// rules; robots.txt problems never stop a crawl.
///
/// # Arguments
///
/// * `client` - The HTTP client to use
/// * `root` - Any URL on the site; only its origin is used
/// * `agent` - Product token to match `User-agent` lines against
/// * `limiter` - Page rate limiter; the robots.txt request counts as a page fetch
/// * `timeout` - Request timeout
pub async fn fetch_robots(
    client: &Client,
    root: &Url,
    agent: &str,
    limiter: &RateLimiter,
    timeout: Duration,
) -> RobotsRules {
    let Ok(robots_url) = root.join("/robots.txt") else {
        return RobotsRules::allow_all(agent);
    };

    limiter.wait().await;
    let response = match client.get(robots_url.clone()).timeout(timeout).send().await {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!("robots.txt unavailable at {}: {}", robots_url, e);
            return RobotsRules::allow_all(agent);
        }
    };

    if response.status() != StatusCode::OK {
        tracing::debug!(
            "robots.txt at {} returned {}, allowing everything",
            robots_url,
            response.status()
        );
        return RobotsRules::allow_all(agent);
    }

    match response.text().await {
        Ok(body) => {
            let rules = RobotsRules::from_content(&body, agent);
            tracing::info!(
                "Loaded robots.txt from {} (crawl-delay: {:?})",
                robots_url,
                rules.crawl_delay()
            );
            rules
        }
        Err(e) => {
            tracing::warn!("Failed to read robots.txt body from {}: {}", robots_url, e);
            RobotsRules::allow_all(agent)
        }
    }
}

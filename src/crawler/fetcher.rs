//! HTTP fetcher implementation
//!
//! This module handles all page requests for the crawler, including:
//! - Building the HTTP client with the configured user agent
//! - Following redirects manually so every hop can be recorded
//! - The retry state machine for timeouts, throttling and soft blocks
//! - Classifying responses into success, abort and drop outcomes

use crate::config::{RetryConfig, UserAgentConfig};
use crate::crawler::RateLimiter;
use crate::state::{FetchState, FetchTracker};
use crate::Result;
use rand::Rng;
use reqwest::header::{CONTENT_TYPE, LOCATION, RETRY_AFTER};
use reqwest::{redirect::Policy, Client, StatusCode};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Maximum redirect hops followed for one request
pub const MAX_REDIRECTS: usize = 10;

/// Why a single attempt did not produce a usable page
#[derive(Debug, Error)]
pub enum FetchError {
    /// Timeout, connection failure or broken body stream (retried)
    #[error("network error: {0}")]
    Network(String),

    /// HTTP 429 or 503 (retried, honoring Retry-After)
    #[error("throttled with HTTP {status}")]
    Throttle {
        status: u16,
        retry_after: Option<Duration>,
    },

    /// A 200 response whose body says we are being rate limited (retried)
    #[error("soft block marker found in response body")]
    SoftBlock,

    /// 200 response that is not HTML (aborted)
    #[error("content type '{0}' is not HTML")]
    ContentTypeMismatch(String),

    /// Any other status (aborted)
    #[error("unexpected HTTP {0}")]
    UnexpectedStatus(u16),

    /// Redirect chain longer than [`MAX_REDIRECTS`] (aborted)
    #[error("more than {0} redirects")]
    RedirectLimit(usize),
}

impl FetchError {
    /// Returns true if the attempt should be retried after a backoff
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::Throttle { .. } | Self::SoftBlock
        )
    }

    /// Server-requested delay, if any
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Throttle { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Reason recorded in the failures table when retries run out
    pub fn drop_reason(&self) -> String {
        match self {
            Self::Network(_) => "net-timeout after retries".to_string(),
            Self::Throttle { status, .. } => format!("{} after retries", status),
            Self::SoftBlock => "429 body after retries".to_string(),
            other => other.to_string(),
        }
    }
}

/// One hop of a redirect chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectHop {
    pub status: u16,
    pub from: String,
    pub to: String,
}

/// A successfully fetched HTML page
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// URL that was requested
    pub url: Url,
    /// URL that finally answered, after redirects
    pub final_url: Url,
    pub status: u16,
    pub content_type: String,
    pub body: String,
    pub redirect_chain: Vec<RedirectHop>,
}

/// Terminal result of fetching one URL
#[derive(Debug)]
pub enum FetchOutcome {
    Success(Box<FetchedPage>),
    /// Not processed, not a failure (non-HTML, unexpected status)
    Aborted { reason: String },
    /// Retries exhausted; recorded in the failures table
    Dropped { reason: String },
}

/// Backoff parameters for retryable failures
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base: f64,
    pub unit: Duration,
    pub cap: Duration,
    pub jitter: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries.max(1),
            base: config.backoff_base,
            unit: Duration::from_millis(config.backoff_unit_ms),
            cap: Duration::from_secs(config.backoff_cap_secs),
            jitter: Duration::from_millis(config.jitter_ms),
        }
    }

    /// Computed backoff after the given attempt, without jitter
    ///
    /// Attempts count from 1, so the first retry waits `unit * base^0`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(64) as i32;
        let secs = self.unit.as_secs_f64() * self.base.powi(exponent);
        if !secs.is_finite() || secs >= self.cap.as_secs_f64() {
            return self.cap;
        }
        Duration::from_secs_f64(secs)
    }

    /// Sleep before the next attempt
    ///
    /// A server-provided `Retry-After` replaces the computed backoff; either way the
    /// result never exceeds the cap.
    pub fn delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        match retry_after {
            Some(requested) => requested.min(self.cap),
            None => {
                let jitter_ms = self.jitter.as_millis() as u64;
                let jitter = if jitter_ms == 0 {
                    Duration::ZERO
                } else {
                    Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
                };
                (self.backoff(attempt) + jitter).min(self.cap)
            }
        }
    }
}

/// Builds an HTTP client with proper configuration
///
/// Redirects are disabled at the client level; [`FetchRetry`] follows them itself so
/// the chain can be recorded.
///
/// # Example
///
/// ```no_run
/// use sitesnap::config::UserAgentConfig;
/// use sitesnap::crawler::build_http_client;
///
/// let client = build_http_client(&UserAgentConfig::default()).unwrap();
/// ```
pub fn build_http_client(config: &UserAgentConfig) -> std::result::Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.header_value())
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::none())
        .gzip(true)
        .brotli(true)
        .build()
}

/// Builds the client used for image probes and asset downloads
///
/// Unlike the page client it follows up to [`MAX_REDIRECTS`] redirects itself, since
/// CDNs and archive replays routinely redirect subresources.
pub fn build_asset_client(config: &UserAgentConfig) -> std::result::Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.header_value())
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::limited(MAX_REDIRECTS))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Fetches pages with the bounded retry protocol
#[derive(Debug, Clone)]
pub struct FetchRetry {
    client: Client,
    policy: RetryPolicy,
    soft_block_markers: Vec<String>,
    timeout: Duration,
}

impl FetchRetry {
    pub fn new(
        client: Client,
        policy: RetryPolicy,
        soft_block_markers: Vec<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            policy,
            soft_block_markers,
            timeout,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Fetches one URL, retrying transient failures
    ///
    /// # Retry Logic
    ///
    /// | Condition | Action |
    /// |-----------|--------|
    /// | Timeout / connection error | Backoff, retry |
    /// | HTTP 429 / 503 | Retry-After or backoff, retry |
    /// | 200 with soft-block marker | Backoff, retry |
    /// | 200 non-HTML | Abort |
    /// | Any other status | Abort |
    /// | Retries exhausted | Drop |
    ///
    /// Every attempt first waits on `limiter`.
    ///
    /// # Returns
    ///
    /// The terminal [`FetchOutcome`]; `Err` only for an internal state machine fault.
    pub async fn fetch(&self, url: &Url, limiter: &RateLimiter) -> Result<FetchOutcome> {
        let mut tracker = FetchTracker::new(url.as_str());
        tracker.transition(FetchState::WaitBudget)?;

        loop {
            limiter.wait().await;
            tracker.transition(FetchState::Sent)?;

            match self.attempt(url).await {
                Ok(page) => {
                    tracker.transition(FetchState::Success)?;
                    return Ok(FetchOutcome::Success(Box::new(page)));
                }
                Err(e) if e.is_retryable() => {
                    let attempt = tracker.attempt();
                    if attempt >= self.policy.max_retries {
                        tracker.transition(FetchState::Dropped)?;
                        tracing::warn!("[drop] {} after {} attempts: {}", url, attempt, e);
                        return Ok(FetchOutcome::Dropped {
                            reason: e.drop_reason(),
                        });
                    }

                    tracker.transition(FetchState::RetryBackoff)?;
                    let delay = self.policy.delay(attempt, e.retry_after());
                    tracing::debug!(
                        "[retry {}/{}] {}: {}, sleeping {:.2}s",
                        attempt,
                        self.policy.max_retries,
                        url,
                        e,
                        delay.as_secs_f64()
                    );
                    tokio::time::sleep(delay).await;
                    tracker.transition(FetchState::WaitBudget)?;
                }
                Err(e) => {
                    tracker.transition(FetchState::Abort)?;
                    tracing::debug!("[skip] {}: {}", url, e);
                    return Ok(FetchOutcome::Aborted {
                        reason: e.to_string(),
                    });
                }
            }
        }
    }

    /// One attempt: the request plus any redirect hops
    async fn attempt(&self, url: &Url) -> std::result::Result<FetchedPage, FetchError> {
        let mut current = url.clone();
        let mut chain = Vec::new();

        loop {
            let response = self
                .client
                .get(current.clone())
                .timeout(self.timeout)
                .send()
                .await
                .map_err(|e| FetchError::Network(e.to_string()))?;
            let status = response.status();

            if status.is_redirection() {
                let target = response
                    .headers()
                    .get(LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|location| current.join(location).ok());
                let Some(target) = target else {
                    return Err(FetchError::UnexpectedStatus(status.as_u16()));
                };
                if chain.len() >= MAX_REDIRECTS {
                    return Err(FetchError::RedirectLimit(MAX_REDIRECTS));
                }
                chain.push(RedirectHop {
                    status: status.as_u16(),
                    from: current.to_string(),
                    to: target.to_string(),
                });
                current = target;
                continue;
            }

            if status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::SERVICE_UNAVAILABLE
            {
                let retry_after = response
                    .headers()
                    .get(RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(parse_retry_after);
                return Err(FetchError::Throttle {
                    status: status.as_u16(),
                    retry_after,
                });
            }

            if status != StatusCode::OK {
                return Err(FetchError::UnexpectedStatus(status.as_u16()));
            }

            let content_type = response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("")
                .to_string();
            if !is_html(&content_type) {
                return Err(FetchError::ContentTypeMismatch(content_type));
            }

            let body = response
                .text()
                .await
                .map_err(|e| FetchError::Network(e.to_string()))?;

            if self
                .soft_block_markers
                .iter()
                .any(|marker| body.contains(marker.as_str()))
            {
                return Err(FetchError::SoftBlock);
            }

            return Ok(FetchedPage {
                url: url.clone(),
                final_url: current,
                status: status.as_u16(),
                content_type,
                body,
                redirect_chain: chain,
            });
        }
    }
}

/// Returns true for HTML content types
pub fn is_html(content_type: &str) -> bool {
    let lowered = content_type.to_ascii_lowercase();
    lowered.contains("text/html") || lowered.contains("application/xhtml+xml")
}

/// Parses a `Retry-After` value: delay seconds or an HTTP date
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let value = value.trim();
    if !value.is_empty() && value.chars().all(|c| c.is_ascii_digit()) {
        return value.parse::<u64>().ok().map(Duration::from_secs);
    }

    let date = chrono::DateTime::parse_from_rfc2822(value).ok()?;
    let wait = date.with_timezone(&chrono::Utc) - chrono::Utc::now();
    Some(wait.to_std().unwrap_or(Duration::ZERO))
}

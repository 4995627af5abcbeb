//! Fixed-interval request pacing
//!
//! One [`RateLimiter`] exists per traffic class (pages, image probes, assets). Each
//! caller reserves the next free slot under a short lock and then sleeps outside it,
//! so concurrent workers are spread `1/rps` apart instead of bunching up.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug)]
struct Pacing {
    interval: Duration,
    /// Earliest instant the next slot may be granted
    next: Option<Instant>,
}

/// Paces calls to at most `rps` grants per second
#[derive(Debug)]
pub struct RateLimiter {
    name: &'static str,
    pacing: Mutex<Pacing>,
}

impl RateLimiter {
    /// Creates a limiter allowing `rps` grants per second
    ///
    /// Rates below 0.01 are clamped so a misconfiguration cannot stall a run forever.
    pub fn new(name: &'static str, rps: f64) -> Self {
        Self {
            name,
            pacing: Mutex::new(Pacing {
                interval: interval_for(rps),
                next: None,
            }),
        }
    }

    pub fn interval(&self) -> Duration {
        self.pacing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .interval
    }

    /// Widens the interval to at least `min_interval` (used for robots.txt crawl-delay)
    pub fn slow_to(&self, min_interval: Duration) {
        let mut pacing = self.pacing.lock().unwrap_or_else(PoisonError::into_inner);
        if min_interval > pacing.interval {
            tracing::info!(
                "{} rate slowed to one request every {:.2}s",
                self.name,
                min_interval.as_secs_f64()
            );
            pacing.interval = min_interval;
        }
    }

    /// Waits until this caller's slot comes up
    ///
    /// Slots are handed out in lock-acquisition order and never closer than one
    /// interval apart.
    pub async fn wait(&self) {
        let slot = self.reserve();
        tokio::time::sleep_until(slot).await;
    }

    /// Reserves the next slot without waiting for it
    fn reserve(&self) -> Instant {
        let now = Instant::now();
        let mut pacing = self.pacing.lock().unwrap_or_else(PoisonError::into_inner);
        let slot = match pacing.next {
            Some(eligible) if eligible > now => eligible,
            _ => now,
        };
        pacing.next = Some(slot + pacing.interval);
        slot
    }
}

fn interval_for(rps: f64) -> Duration {
    Duration::from_secs_f64(1.0 / rps.max(0.01))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_interval_from_rps() {
        assert_eq!(RateLimiter::new("page", 4.0).interval(), Duration::from_millis(250));
        assert_eq!(RateLimiter::new("page", 0.5).interval(), Duration::from_secs(2));
    }

    #[test]
    fn test_slow_to_only_widens() {
        let limiter = RateLimiter::new("page", 2.0);
        limiter.slow_to(Duration::from_millis(100));
        assert_eq!(limiter.interval(), Duration::from_millis(500));
        limiter.slow_to(Duration::from_secs(3));
        assert_eq!(limiter.interval(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_grant_is_immediate() {
        let limiter = RateLimiter::new("page", 1.0);
        let start = Instant::now();
        limiter.wait().await;
        assert_eq!(Instant::now(), start);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_grants_are_spaced() {
        let limiter = Arc::new(RateLimiter::new("asset", 10.0));
        let interval = limiter.interval();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let limiter = Arc::clone(&limiter);
            handles.push(tokio::spawn(async move {
                limiter.wait().await;
                Instant::now()
            }));
        }

        let mut grants = Vec::new();
        for handle in handles {
            grants.push(handle.await.unwrap());
        }
        grants.sort();

        for pair in grants.windows(2) {
            assert!(
                pair[1] - pair[0] >= interval,
                "grants {:?} apart, expected at least {:?}",
                pair[1] - pair[0],
                interval
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_limiter_does_not_bank_slots() {
        let limiter = RateLimiter::new("image", 2.0);
        limiter.wait().await;
        tokio::time::sleep(Duration::from_secs(10)).await;

        let before = Instant::now();
        limiter.wait().await;
        limiter.wait().await;
        // second call after the idle period still waits a full interval
        assert!(Instant::now() - before >= Duration::from_millis(500));
    }
}

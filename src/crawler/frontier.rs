//! Work queue with admission control and completion tracking
//!
//! The frontier owns three pieces of state behind a single lock: the FIFO queue, the
//! `in_queue` set mirroring it, and the `seen` set of URLs already handed to a worker.
//! An outstanding-task counter tracks every admitted entry until a worker marks it
//! done, so idle workers keep waiting while a busy peer may still enqueue children,
//! and all of them exit together once the counter reaches zero.

use crate::config::PageScope;
use crate::robots::RobotsRules;
use crate::url::{is_crawlable_path, scope_admits, LanguagePolicy, SiteRoot};
use std::collections::{HashSet, VecDeque};
use std::sync::{Mutex, PoisonError};
use tokio::sync::Notify;
use url::Url;

/// Outcome of offering a URL to the frontier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Queued for crawling
    Admitted,
    /// Not an http(s) URL on the crawled site
    OffSite,
    /// Looks like a non-English locale
    NonEnglish,
    /// Outside the configured landing/blog scope
    OutOfScope,
    /// Points at a download or endpoint that never serves HTML
    NotCrawlable,
    /// Disallowed by robots.txt
    RobotsDisallowed,
    /// Already queued or already visited
    Duplicate,
    /// The page ceiling has been reached
    CapacityReached,
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Self::Admitted)
    }
}

/// Pure, per-URL admission filters
///
/// The same policy instance judges the seed and every discovered link.
#[derive(Debug, Clone)]
pub struct AdmissionPolicy {
    root: SiteRoot,
    language: LanguagePolicy,
    scope: PageScope,
    robots: Option<RobotsRules>,
}

impl AdmissionPolicy {
    pub fn new(
        root: SiteRoot,
        language: LanguagePolicy,
        scope: PageScope,
        robots: Option<RobotsRules>,
    ) -> Self {
        Self {
            root,
            language,
            scope,
            robots,
        }
    }

    pub fn root(&self) -> &SiteRoot {
        &self.root
    }

    pub fn language(&self) -> &LanguagePolicy {
        &self.language
    }

    /// Applies every filter that does not depend on frontier membership
    pub fn check(&self, url: &Url) -> Admission {
        if !matches!(url.scheme(), "http" | "https") || !self.root.same_site(url) {
            return Admission::OffSite;
        }
        if !self.language.allows(url, &self.root) {
            return Admission::NonEnglish;
        }
        if !is_crawlable_path(url.path()) {
            return Admission::NotCrawlable;
        }
        if !scope_admits(self.scope, url.path()) {
            return Admission::OutOfScope;
        }
        if let Some(robots) = &self.robots {
            if !robots.allows(url) {
                return Admission::RobotsDisallowed;
            }
        }
        Admission::Admitted
    }
}

/// A URL waiting to be crawled
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontierEntry {
    pub url: Url,
    pub referer: Option<Url>,
}

#[derive(Debug, Default)]
struct FrontierState {
    queue: VecDeque<FrontierEntry>,
    in_queue: HashSet<String>,
    seen: HashSet<String>,
    /// Admitted entries not yet marked done
    outstanding: usize,
}

/// Shared crawl frontier
#[derive(Debug)]
pub struct Frontier {
    policy: AdmissionPolicy,
    max_pages: usize,
    state: Mutex<FrontierState>,
    changed: Notify,
}

impl Frontier {
    pub fn new(policy: AdmissionPolicy, max_pages: usize) -> Self {
        Self {
            policy,
            max_pages,
            state: Mutex::new(FrontierState::default()),
            changed: Notify::new(),
        }
    }

    pub fn policy(&self) -> &AdmissionPolicy {
        &self.policy
    }

    /// Offers a normalized URL to the frontier
    ///
    /// # Arguments
    ///
    /// * `url` - Candidate URL, already normalized and pinned to the root host
    /// * `referer` - Page the URL was found on (`None` for the seed)
    ///
    /// # Returns
    ///
    /// [`Admission::Admitted`] if the URL was queued, otherwise the first filter that
    /// refused it.
    pub fn enqueue(&self, url: Url, referer: Option<&Url>) -> Admission {
        let verdict = self.policy.check(&url);
        if !verdict.is_admitted() {
            return verdict;
        }

        let key = url.as_str().to_string();
        {
            let mut state = self.lock();
            if state.seen.contains(&key) || state.in_queue.contains(&key) {
                return Admission::Duplicate;
            }
            if state.seen.len() + state.in_queue.len() >= self.max_pages {
                return Admission::CapacityReached;
            }
            state.in_queue.insert(key);
            state.queue.push_back(FrontierEntry {
                url,
                referer: referer.cloned(),
            });
            state.outstanding += 1;
        }

        self.changed.notify_waiters();
        Admission::Admitted
    }

    /// Takes the next entry, waiting while other workers may still add work
    ///
    /// Returns `None` only once the queue is empty and every dequeued entry has been
    /// marked done, at which point no more work can appear.
    pub async fn dequeue(&self) -> Option<FrontierEntry> {
        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            // register before checking so a concurrent notify_waiters is not missed
            notified.as_mut().enable();

            {
                let mut state = self.lock();
                if let Some(entry) = state.queue.pop_front() {
                    let key = entry.url.as_str().to_string();
                    state.in_queue.remove(&key);
                    state.seen.insert(key);
                    return Some(entry);
                }
                if state.outstanding == 0 {
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Marks one dequeued entry as finished
    pub fn mark_done(&self) {
        let finished = {
            let mut state = self.lock();
            state.outstanding = state.outstanding.saturating_sub(1);
            state.outstanding == 0
        };
        if finished {
            self.changed.notify_waiters();
        }
    }

    /// Returns a guard that marks the entry done when dropped, even on panic
    pub fn complete_on_drop(&self) -> DoneGuard<'_> {
        DoneGuard { frontier: self }
    }

    /// Number of URLs handed to workers so far
    pub fn seen_count(&self) -> usize {
        self.lock().seen.len()
    }

    /// Number of URLs waiting in the queue
    pub fn queued_count(&self) -> usize {
        self.lock().queue.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FrontierState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Marks a frontier entry done on drop
pub struct DoneGuard<'a> {
    frontier: &'a Frontier,
}

impl Drop for DoneGuard<'_> {
    fn drop(&mut self) {
        self.frontier.mark_done();
    }
}

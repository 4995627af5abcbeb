/// Fetch state definitions for the page retry protocol
///
/// A page fetch starts in `Start`, waits for the page budget, sends the request and
/// then either finishes (`Success`, `Abort`, `Dropped`) or sleeps in `RetryBackoff`
/// before waiting for budget again.
use crate::{Result, SnapError};
use std::fmt;

/// Represents the current state of one URL's fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchState {
    /// Fetch has been created but nothing has happened yet
    Start,

    /// Waiting for the page-rate budget
    WaitBudget,

    /// Request is in flight (including redirect hops)
    Sent,

    /// Sleeping before the next attempt
    RetryBackoff,

    // ===== Terminal States =====
    /// 200 HTML response received
    Success,

    /// Response is not worth processing (non-HTML, unexpected status)
    Abort,

    /// Retries exhausted
    Dropped,
}

impl FetchState {
    /// Returns true if this is a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Abort | Self::Dropped)
    }

    /// Returns true if the state machine allows moving from `self` to `next`
    pub fn can_transition_to(&self, next: FetchState) -> bool {
        use FetchState::*;
        matches!(
            (self, next),
            (Start, WaitBudget)
                | (WaitBudget, Sent)
                | (Sent, Success)
                | (Sent, Abort)
                | (Sent, RetryBackoff)
                | (Sent, Dropped)
                | (RetryBackoff, WaitBudget)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::WaitBudget => "wait_budget",
            Self::Sent => "sent",
            Self::RetryBackoff => "retry_backoff",
            Self::Success => "success",
            Self::Abort => "abort",
            Self::Dropped => "dropped",
        }
    }
}

impl fmt::Display for FetchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Tracks one URL's progress through [`FetchState`]
#[derive(Debug)]
pub struct FetchTracker {
    url: String,
    state: FetchState,
    attempt: u32,
}

impl FetchTracker {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            state: FetchState::Start,
            attempt: 0,
        }
    }

    pub fn state(&self) -> FetchState {
        self.state
    }

    /// Number of requests sent so far (1-based once the first request is out)
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Moves to `next`, failing on a transition the protocol does not allow
    pub fn transition(&mut self, next: FetchState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(SnapError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        if next == FetchState::Sent {
            self.attempt += 1;
        }
        tracing::trace!(
            url = %self.url,
            attempt = self.attempt,
            "{} -> {}",
            self.state,
            next
        );
        self.state = next;
        Ok(())
    }
}

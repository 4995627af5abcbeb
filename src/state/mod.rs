//! State module for tracking per-URL fetch progress
//!
//! # Components
//!
//! - `FetchState`: the retry state machine a single page fetch moves through
//! - `FetchTracker`: records one URL's walk through those states and rejects illegal moves

mod fetch_state;

// Re-export main types
pub use fetch_state::{FetchState, FetchTracker};

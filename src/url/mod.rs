//! URL handling module for Sitesnap
//!
//! This module provides URL normalization, root-host pinning, same-site checks,
//! and the pure admission predicates (language, scope, crawlability) the frontier
//! applies to every candidate URL.

mod domain;
mod filters;
mod normalize;

// Re-export main functions
pub use domain::{extract_domain, strip_www, SiteRoot};
pub use filters::{is_blog_path, is_crawlable_path, scope_admits, LanguagePolicy};
pub use normalize::{
    normalize_parsed, normalize_url, resolve_href, with_default_scheme,
};

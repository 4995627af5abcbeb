//! Pure admission predicates: language, page scope and crawlability

use crate::config::{LanguageConfig, PageScope};
use crate::url::domain::SiteRoot;
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;
use url::Url;

/// Year/month date segments, as used by most blog permalink schemes
static DATE_SEGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/\d{4}/\d{2}/").expect("static date pattern"));

/// File extensions that never lead to crawlable HTML
static NON_PAGE_EXTENSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\.(png|jpe?g|gif|webp|svg|ico|bmp|avif|tiff?|mp4|webm|mp3|wav|ogg|mov|avi|pdf|docx?|xlsx?|pptx?|zip|rar|7z|gz|tar|css|js|mjs|woff2?|ttf|otf|eot|json|xml)$",
    )
    .expect("static extension pattern")
});

/// Path fragments that mark a page as blog-style content
const BLOG_HINTS: &[&str] = &[
    "/blog",
    "/article",
    "/news",
    "/posts",
    "/stories",
    "/insights",
    "/definition",
    "/definitions",
    "/review",
    "/reviews",
    "/how-to",
    "/how-tos",
    "/howto",
    "/guide",
    "/guides",
    "/tutorial",
    "/category",
];

/// Language admission policy over a fixed deny list of locale codes
#[derive(Debug, Clone)]
pub struct LanguagePolicy {
    english_only: bool,
    deny: HashSet<String>,
}

impl LanguagePolicy {
    pub fn new(config: &LanguageConfig) -> Self {
        Self {
            english_only: config.english_only,
            deny: config
                .deny_list
                .iter()
                .map(|code| code.trim().to_ascii_lowercase())
                .filter(|code| !code.is_empty() && code != "en")
                .collect(),
        }
    }

    /// Returns true if `url` does not look like a non-English locale of the site
    ///
    /// A URL is refused when the first label of a root subdomain is a denied locale
    /// (`fr.example.com`), or when the first path segment, or its part before `-`/`_`,
    /// is one (`/de/`, `/pt-br/`). `en` and `en-*` are always allowed.
    pub fn allows(&self, url: &Url, root: &SiteRoot) -> bool {
        if !self.english_only {
            return true;
        }

        if let Some(prefix) = root.subdomain_prefix(url) {
            let first = prefix.split('.').next().unwrap_or_default();
            if self.deny.contains(first) {
                return false;
            }
        }

        match locale_marker(url.path()) {
            Some(code) => !self.deny.contains(&code),
            None => true,
        }
    }
}

/// Core of the first path segment (`/pt-br/x` yields `pt`)
fn locale_marker(path: &str) -> Option<String> {
    let first = path.trim_start_matches('/').split('/').next()?;
    if first.is_empty() {
        return None;
    }
    let core = first.split(['-', '_']).next()?;
    Some(core.to_ascii_lowercase())
}

/// Returns true if the path looks like blog content
pub fn is_blog_path(path: &str) -> bool {
    let lowered = path.to_ascii_lowercase();
    DATE_SEGMENT.is_match(&lowered) || BLOG_HINTS.iter().any(|hint| lowered.contains(hint))
}

/// Returns true if a page with this path belongs in the configured scope
pub fn scope_admits(scope: PageScope, path: &str) -> bool {
    match scope {
        PageScope::Both => true,
        PageScope::Blog => is_blog_path(path),
        PageScope::Landing => !is_blog_path(path),
    }
}

/// Returns true if the path can plausibly serve an HTML page
///
/// Binary and document downloads and Cloudflare's `/cdn-cgi/` endpoints are skipped.
pub fn is_crawlable_path(path: &str) -> bool {
    !path.contains("/cdn-cgi/") && !NON_PAGE_EXTENSION.is_match(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root() -> SiteRoot {
        SiteRoot::new(&Url::parse("https://example.com/").unwrap(), true).unwrap()
    }

    fn policy() -> LanguagePolicy {
        LanguagePolicy::new(&LanguageConfig::default())
    }

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_language_path_segments() {
        let policy = policy();
        let root = root();
        assert!(policy.allows(&url("https://example.com/about/"), &root));
        assert!(policy.allows(&url("https://example.com/en/about/"), &root));
        assert!(policy.allows(&url("https://example.com/en-gb/"), &root));
        assert!(!policy.allows(&url("https://example.com/fr/"), &root));
        assert!(!policy.allows(&url("https://example.com/pt-br/produtos/"), &root));
        assert!(!policy.allows(&url("https://example.com/DE_de/"), &root));
        // only the first segment is inspected
        assert!(policy.allows(&url("https://example.com/docs/fr/"), &root));
        // words that merely start with a code are fine
        assert!(policy.allows(&url("https://example.com/french-press/"), &root));
    }

    #[test]
    fn test_language_subdomains() {
        let policy = policy();
        let root = root();
        assert!(!policy.allows(&url("https://fr.example.com/"), &root));
        assert!(!policy.allows(&url("https://de.shop.example.com/"), &root));
        assert!(policy.allows(&url("https://blog.example.com/"), &root));
        // unrelated hosts are judged by path only
        assert!(policy.allows(&url("https://fr.other.com/"), &root));
    }

    #[test]
    fn test_language_disabled() {
        let config = LanguageConfig {
            english_only: false,
            ..LanguageConfig::default()
        };
        let policy = LanguagePolicy::new(&config);
        assert!(policy.allows(&url("https://example.com/fr/"), &root()));
    }

    #[test]
    fn test_blog_detection() {
        assert!(is_blog_path("/blog/hello/"));
        assert!(is_blog_path("/2021/03/launch/"));
        assert!(is_blog_path("/resources/How-To/setup/"));
        assert!(!is_blog_path("/pricing/"));
        assert!(!is_blog_path("/2021/"));
    }

    #[test]
    fn test_scope_admits() {
        assert!(scope_admits(PageScope::Both, "/blog/x/"));
        assert!(scope_admits(PageScope::Blog, "/blog/x/"));
        assert!(!scope_admits(PageScope::Blog, "/pricing/"));
        assert!(scope_admits(PageScope::Landing, "/pricing/"));
        assert!(!scope_admits(PageScope::Landing, "/news/today/"));
    }

    #[test]
    fn test_crawlable_paths() {
        assert!(is_crawlable_path("/about/"));
        assert!(is_crawlable_path("/index.html"));
        assert!(!is_crawlable_path("/files/brochure.PDF"));
        assert!(!is_crawlable_path("/img/logo.png"));
        assert!(!is_crawlable_path("/cdn-cgi/l/email-protection"));
    }
}

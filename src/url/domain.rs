use crate::url::normalize::normalize_parsed;
use crate::UrlError;
use url::Url;

/// Extracts the lowercase host from a URL
///
/// # Examples
///
/// ```
/// use url::Url;
/// use sitesnap::url::extract_domain;
///
/// let url = Url::parse("https://EXAMPLE.COM/path").unwrap();
/// assert_eq!(extract_domain(&url), Some("example.com".to_string()));
/// ```
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Strips a leading `www.` label
pub fn strip_www(host: &str) -> &str {
    host.strip_prefix("www.").unwrap_or(host)
}

/// The site a crawl run is pinned to
///
/// Built once from the seed URL. It decides which URLs belong to the site and rewrites
/// `www`/apex variants of the root host to the host the user supplied, so
/// `example.com/x` and `www.example.com/x` collapse to one frontier entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteRoot {
    /// Host exactly as supplied (lowercase), e.g. `www.example.com`
    host: String,
    /// Host without its `www.` label, e.g. `example.com`
    bare: String,
    port: Option<u16>,
    allow_subdomains: bool,
}

impl SiteRoot {
    /// Creates a root from the (already parsed) seed URL
    pub fn new(seed: &Url, allow_subdomains: bool) -> Result<Self, UrlError> {
        let host = extract_domain(seed).ok_or(UrlError::MissingDomain)?;
        let bare = strip_www(&host).to_string();
        Ok(Self {
            host,
            bare,
            port: seed.port_or_known_default(),
            allow_subdomains,
        })
    }

    /// The pinned host, as supplied by the user
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The root host without `www.`
    pub fn bare_host(&self) -> &str {
        &self.bare
    }

    /// Returns true if `url` belongs to the crawled site
    ///
    /// `www.` is ignored on both sides; subdomains of the root count only when the run
    /// allows them.
    pub fn same_site(&self, url: &Url) -> bool {
        self.matches_host(url, self.allow_subdomains)
    }

    /// Returns true if `url` is on the root host or any subdomain of it
    ///
    /// Used for classification (internal vs external links, mirror scope), where
    /// subdomains always count as part of the site.
    pub fn same_site_or_subdomain(&self, url: &Url) -> bool {
        self.matches_host(url, true)
    }

    fn matches_host(&self, url: &Url, subdomains: bool) -> bool {
        let Some(host) = extract_domain(url) else {
            return false;
        };
        let host = strip_www(&host);
        host == self.bare || (subdomains && host.ends_with(&format!(".{}", self.bare)))
    }

    /// Returns the subdomain labels in front of the root host, if `url` is a subdomain
    ///
    /// `fr.blog.example.com` yields `Some("fr.blog")`; the root host itself yields `None`.
    pub fn subdomain_prefix(&self, url: &Url) -> Option<String> {
        let host = extract_domain(url)?;
        let host = strip_www(&host);
        host.strip_suffix(&format!(".{}", self.bare))
            .map(|prefix| prefix.to_string())
    }

    /// Rewrites `www`/apex variants of the root host to the supplied host
    pub fn pin(&self, mut url: Url) -> Url {
        let is_root_variant = extract_domain(&url)
            .map(|h| strip_www(&h) == self.bare && h != self.host)
            .unwrap_or(false);
        if is_root_variant && url.port_or_known_default() == self.port {
            // set_host only fails for cannot-be-a-base URLs, which never reach here
            let _ = url.set_host(Some(&self.host));
        }
        url
    }

    /// Normalizes an absolute URL and pins it to the root host
    pub fn normalize(&self, url_str: &str) -> Result<Url, UrlError> {
        let url = Url::parse(url_str.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;
        Ok(self.pin(normalize_parsed(url)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root(seed: &str, allow_subdomains: bool) -> SiteRoot {
        SiteRoot::new(&Url::parse(seed).unwrap(), allow_subdomains).unwrap()
    }

    #[test]
    fn test_extract_with_port() {
        let url = Url::parse("https://example.com:8080/").unwrap();
        assert_eq!(extract_domain(&url), Some("example.com".to_string()));
    }

    #[test]
    fn test_same_site_ignores_www() {
        let root = root("https://www.example.com/", false);
        assert!(root.same_site(&Url::parse("https://example.com/a").unwrap()));
        assert!(root.same_site(&Url::parse("http://www.example.com/b").unwrap()));
        assert!(!root.same_site(&Url::parse("https://other.com/").unwrap()));
    }

    #[test]
    fn test_subdomains_only_when_allowed() {
        let strict = root("https://example.com/", false);
        let loose = root("https://example.com/", true);
        let blog = Url::parse("https://blog.example.com/post").unwrap();

        assert!(!strict.same_site(&blog));
        assert!(loose.same_site(&blog));
        assert!(strict.same_site_or_subdomain(&blog));
        // suffix match must respect label boundaries
        let lookalike = Url::parse("https://notexample.com/").unwrap();
        assert!(!loose.same_site(&lookalike));
    }

    #[test]
    fn test_subdomain_prefix() {
        let root = root("https://example.com/", true);
        let url = Url::parse("https://fr.blog.example.com/").unwrap();
        assert_eq!(root.subdomain_prefix(&url), Some("fr.blog".to_string()));
        let apex = Url::parse("https://www.example.com/").unwrap();
        assert_eq!(root.subdomain_prefix(&apex), None);
    }

    #[test]
    fn test_pin_www_flip() {
        let root = root("https://example.com/", false);
        let pinned = root.normalize("https://www.example.com/about").unwrap();
        assert_eq!(pinned.as_str(), "https://example.com/about/");

        let www_root = root_with_www();
        let pinned = www_root.normalize("https://example.com/about").unwrap();
        assert_eq!(pinned.as_str(), "https://www.example.com/about/");
    }

    fn root_with_www() -> SiteRoot {
        root("https://www.example.com/", false)
    }

    #[test]
    fn test_pin_leaves_other_hosts() {
        let root = root("https://example.com/", true);
        let url = root.normalize("https://blog.example.com/x").unwrap();
        assert_eq!(url.host_str(), Some("blog.example.com"));
    }

    #[test]
    fn test_root_normalize_idempotent() {
        let root = root("http://example.com/", false);
        for input in ["http://www.example.com", "http://example.com//a/b.css?v=1"] {
            let once = root.normalize(input).unwrap();
            let twice = root.normalize(once.as_str()).unwrap();
            assert_eq!(once, twice);
        }
    }
}

use crate::UrlError;
use regex::Regex;
use std::sync::LazyLock;
use url::Url;

/// Matches a final path segment that carries a file extension (`/report.pdf`, `/a.tar.gz`)
static FILE_SEGMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"/[^/]+\.[A-Za-z0-9]{1,8}$").expect("static file segment pattern")
});

/// Normalizes a URL according to Sitesnap's dedup rules
///
/// # Normalization Steps
///
/// 1. Parse the URL; reject if malformed, not http(s), or host-less
/// 2. Lowercase scheme and host and drop default ports (done by the `url` crate)
/// 3. Remove the fragment
/// 4. Collapse repeated slashes in the path
/// 5. Append a trailing slash unless the last segment has a file extension
///
/// The query string is preserved as-is. The function is idempotent, so a normalized
/// URL can be fed back in and comes out unchanged.
///
/// # Examples
///
/// ```
/// use sitesnap::url::normalize_url;
///
/// let url = normalize_url("HTTP://Example.COM//about#team").unwrap();
/// assert_eq!(url.as_str(), "http://example.com/about/");
///
/// let url = normalize_url("https://example.com/files/report.pdf").unwrap();
/// assert_eq!(url.as_str(), "https://example.com/files/report.pdf");
/// ```
pub fn normalize_url(url_str: &str) -> Result<Url, UrlError> {
    let url = Url::parse(url_str.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;
    normalize_parsed(url)
}

/// Normalizes an already parsed URL (see [`normalize_url`])
pub fn normalize_parsed(mut url: Url) -> Result<Url, UrlError> {
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(url.scheme().to_string()));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(UrlError::MissingDomain);
    }

    url.set_fragment(None);

    let path = normalize_path(url.path());
    url.set_path(&path);

    Ok(url)
}

/// Collapses duplicate slashes and applies the trailing-slash rule
fn normalize_path(path: &str) -> String {
    let mut collapsed = String::with_capacity(path.len() + 1);
    for ch in path.chars() {
        if ch == '/' && collapsed.ends_with('/') {
            continue;
        }
        collapsed.push(ch);
    }

    if collapsed.is_empty() {
        return "/".to_string();
    }
    if !collapsed.starts_with('/') {
        collapsed.insert(0, '/');
    }

    if !collapsed.ends_with('/') && !FILE_SEGMENT.is_match(&collapsed) {
        collapsed.push('/');
    }

    collapsed
}

/// Resolves `href` against `base` as written, dropping only the fragment
///
/// Non-navigational references (`mailto:`, `tel:`, `javascript:`, bare fragments)
/// yield `None`. The path is left untouched; see [`normalize_parsed`] for the
/// frontier form.
pub fn resolve_href(base: &Url, href: &str) -> Option<Url> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }
    let lowered = href.to_ascii_lowercase();
    if ["mailto:", "tel:", "javascript:", "data:"]
        .iter()
        .any(|scheme| lowered.starts_with(scheme))
    {
        return None;
    }

    let mut joined = base.join(href).ok()?;
    joined.set_fragment(None);
    Some(joined)
}

/// Prefixes `http://` to a schemeless start URL such as `example.com`
pub fn with_default_scheme(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("http://{}", trimmed.trim_start_matches('/'))
    }
}

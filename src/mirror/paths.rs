//! Local paths for mirrored pages and assets
//!
//! All paths are relative to the archive root. Pages live under `site/<host>/` and
//! assets under `site/_assets/<bucket>/<host>/`, so an asset can never shadow a page.

use sha2::{Digest, Sha256};
use std::path::{Component, Path, PathBuf};
use url::Url;

/// Top-level directory of the mirror inside the archive
pub const SITE_DIR: &str = "site";

/// Asset directory under [`SITE_DIR`]
pub const ASSETS_DIR: &str = "_assets";

const IMAGE_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "webp", "svg", "ico", "bmp", "tif", "tiff", "avif",
];
const FONT_EXTENSIONS: &[&str] = &["woff", "woff2", "ttf", "otf", "eot"];
const MEDIA_EXTENSIONS: &[&str] = &["mp4", "webm", "mp3", "ogg", "wav", "mov", "avi", "m4a"];

/// How an asset was referenced, used when its URL has no telling extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetKind {
    Stylesheet,
    Script,
    Image,
    Font,
    Media,
    Other,
}

/// Mirror subdirectory an asset is stored in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bucket {
    Css,
    Js,
    Img,
    Font,
    Media,
    Misc,
}

impl Bucket {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Css => "css",
            Self::Js => "js",
            Self::Img => "img",
            Self::Font => "font",
            Self::Media => "media",
            Self::Misc => "misc",
        }
    }

    /// Extension given to directory-like URLs
    fn index_extension(&self) -> &'static str {
        match self {
            Self::Css => "css",
            Self::Js => "js",
            _ => "bin",
        }
    }

    fn from_hint(kind: AssetKind) -> Self {
        match kind {
            AssetKind::Stylesheet => Self::Css,
            AssetKind::Script => Self::Js,
            AssetKind::Image => Self::Img,
            AssetKind::Font => Self::Font,
            AssetKind::Media => Self::Media,
            AssetKind::Other => Self::Misc,
        }
    }
}

/// Picks the bucket by extension, falling back to the reference kind
pub fn bucket_for(url: &Url, hint: AssetKind) -> Bucket {
    match extension(url.path()).as_deref() {
        Some("css") => Bucket::Css,
        Some("js" | "mjs") => Bucket::Js,
        Some(e) if IMAGE_EXTENSIONS.contains(&e) => Bucket::Img,
        Some(e) if FONT_EXTENSIONS.contains(&e) => Bucket::Font,
        Some(e) if MEDIA_EXTENSIONS.contains(&e) => Bucket::Media,
        _ => Bucket::from_hint(hint),
    }
}

/// Lowercase extension of the last path segment, if any
fn extension(path: &str) -> Option<String> {
    let last = path.rsplit('/').next()?;
    let (stem, ext) = last.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Directory name for a URL's host, with `:` in `host:port` replaced
pub fn host_dir(url: &Url) -> String {
    let host = url.host_str().unwrap_or("site").to_ascii_lowercase();
    match url.port() {
        Some(port) => format!("{}_{}", host, port),
        None => host,
    }
}

/// Replaces characters that are not portable in file names
fn sanitize_segment(segment: &str) -> String {
    segment
        .chars()
        .map(|c| match c {
            ':' | '*' | '?' | '"' | '<' | '>' | '|' | '\\' => '_',
            c => c,
        })
        .collect()
}

fn path_segments(url: &Url) -> Vec<String> {
    url.path()
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != "." && *segment != "..")
        .map(sanitize_segment)
        .collect()
}

/// Archive-relative path for a mirrored asset
///
/// # Examples
///
/// ```
/// use sitesnap::mirror::{asset_path, AssetKind};
/// use url::Url;
///
/// let url = Url::parse("https://example.com/img/logo.png").unwrap();
/// assert_eq!(
///     asset_path(&url, AssetKind::Image).to_str(),
///     Some("site/_assets/img/example.com/img/logo.png")
/// );
/// ```
pub fn asset_path(url: &Url, hint: AssetKind) -> PathBuf {
    let bucket = bucket_for(url, hint);
    let mut segments = path_segments(url);

    let directory_like = url.path().ends_with('/') || segments.is_empty();
    if directory_like {
        segments.push(format!("index.{}", bucket.index_extension()));
    } else if extension(url.path()).is_none() && matches!(bucket, Bucket::Css | Bucket::Js) {
        if let Some(last) = segments.last_mut() {
            last.push('.');
            last.push_str(bucket.index_extension());
        }
    }

    if let Some(query) = url.query().filter(|q| !q.is_empty()) {
        if let Some(last) = segments.last_mut() {
            *last = with_query_suffix(last, query);
        }
    }

    let mut path = PathBuf::from(SITE_DIR);
    path.push(ASSETS_DIR);
    path.push(bucket.as_str());
    path.push(host_dir(url));
    path.extend(segments);
    path
}

/// `name.ext` becomes `name-<hash>.ext`, keyed by the query string
fn with_query_suffix(file_name: &str, query: &str) -> String {
    let digest = Sha256::digest(query.as_bytes());
    let suffix = &hex::encode(digest)[..8];
    match file_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{}-{}.{}", stem, suffix, ext),
        _ => format!("{}-{}", file_name, suffix),
    }
}

/// Archive-relative path a page is saved to
///
/// A trailing `/` maps to `index.html`; an extension-less last segment gets `.html`.
/// Query variants of one path get the same hash suffix as assets.
pub fn page_path(url: &Url) -> PathBuf {
    let mut segments = path_segments(url);
    if url.path().ends_with('/') || segments.is_empty() {
        segments.push("index.html".to_string());
    } else if extension(url.path()).is_none() {
        if let Some(last) = segments.last_mut() {
            last.push_str(".html");
        }
    }

    if let Some(query) = url.query().filter(|q| !q.is_empty()) {
        if let Some(last) = segments.last_mut() {
            *last = with_query_suffix(last, query);
        }
    }

    let mut path = PathBuf::from(SITE_DIR);
    path.push(host_dir(url));
    path.extend(segments);
    path
}

/// Relative reference from the document at `from_file` to `to_file`
///
/// Both paths are archive-relative; the result always uses `/`.
pub fn relative_reference(from_file: &Path, to_file: &Path) -> Option<String> {
    let from_dir = from_file.parent().unwrap_or_else(|| Path::new(""));
    let relative = pathdiff::diff_paths(to_file, from_dir)?;
    let parts: Vec<String> = relative
        .components()
        .map(|component| match component {
            Component::ParentDir => "..".to_string(),
            other => other.as_os_str().to_string_lossy().into_owned(),
        })
        .collect();
    Some(parts.join("/"))
}

/// Archive-relative path as written in the assets table
pub fn display_path(path: &Path) -> String {
    path.components()
        .map(|component| component.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

//! `url(...)` references inside stylesheets and inline styles

use regex::{Captures, Regex};
use std::collections::HashMap;
use std::sync::LazyLock;

/// `url(x)`, `url('x')` or `url("x")`; exactly one of the three groups matches
static CSS_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)url\(\s*(?:"([^"]*)"|'([^']*)'|([^)"'\s]+))\s*\)"#)
        .expect("static css url pattern")
});

const IGNORED_PREFIXES: &[&str] = &["data:", "blob:", "mailto:", "#"];

fn token<'t>(captures: &Captures<'t>) -> Option<&'t str> {
    captures
        .get(1)
        .or_else(|| captures.get(2))
        .or_else(|| captures.get(3))
        .map(|m| m.as_str().trim())
}

fn is_mirrorable(token: &str) -> bool {
    let lowered = token.to_ascii_lowercase();
    !token.is_empty() && !IGNORED_PREFIXES.iter().any(|p| lowered.starts_with(p))
}

/// Distinct `url(...)` tokens worth mirroring, in order of appearance
pub fn css_references(css: &str) -> Vec<String> {
    let mut seen = Vec::new();
    for captures in CSS_URL.captures_iter(css) {
        if let Some(token) = token(&captures).filter(|t| is_mirrorable(t)) {
            if !seen.iter().any(|s: &String| s == token) {
                seen.push(token.to_string());
            }
        }
    }
    seen
}

/// Replaces every `url(token)` whose token has a replacement with `url(replacement)`
///
/// Tokens without a replacement are left byte-for-byte untouched.
pub fn rewrite_css(css: &str, replacements: &HashMap<String, String>) -> String {
    CSS_URL
        .replace_all(css, |captures: &Captures<'_>| {
            match token(captures).and_then(|t| replacements.get(t)) {
                Some(local) => format!("url({})", local),
                None => captures[0].to_string(),
            }
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHEET: &str = r#"
        @font-face { font-family: X; src: url("../fonts/x.woff2") format("woff2"), url('../fonts/x.ttf'); }
        .hero { background: url( img/a.png ) no-repeat; }
        .dot { background: url(data:image/png;base64,AAAA); }
        .again { background-image: URL(img/a.png); }
        .svg { filter: url(#shadow); }
    "#;

    #[test]
    fn test_references_skip_inline_data() {
        assert_eq!(
            css_references(SHEET),
            vec!["../fonts/x.woff2", "../fonts/x.ttf", "img/a.png"]
        );
    }

    #[test]
    fn test_rewrite_only_known_tokens() {
        let mut replacements = HashMap::new();
        replacements.insert(
            "img/a.png".to_string(),
            "../../img/a.test/css/img/a.png".to_string(),
        );
        let rewritten = rewrite_css(SHEET, &replacements);

        assert_eq!(rewritten.matches("url(../../img/a.test/css/img/a.png)").count(), 2);
        assert!(rewritten.contains(r#"url("../fonts/x.woff2")"#));
        assert!(rewritten.contains("url(data:image/png;base64,AAAA)"));
        assert!(rewritten.contains("url(#shadow)"));
    }

    #[test]
    fn test_no_references() {
        assert!(css_references("body { color: red }").is_empty());
        assert_eq!(rewrite_css("p{}", &HashMap::new()), "p{}");
    }
}

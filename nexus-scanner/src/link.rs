// Link classification and canonical page identities

use url::Url;

const IGNORE_KEYWORDS: [&str; 5] = ["settings", "trash", "help", "support", "upgrade"];

/// True for root-relative hrefs and anything mentioning the workspace domain.
/// Fragments, external hosts and `javascript:` links fall through to false.
pub fn is_in_scope(href: &str, domain_marker: &str) -> bool {
    if href.is_empty() {
        return false;
    }
    href.starts_with('/') || (!domain_marker.is_empty() && href.contains(domain_marker))
}

/// Resolve `href` against `base` and reduce it to `origin + path`.
///
/// Never fails: input that cannot be parsed into a URL with a real origin is
/// cut at the first `?` or `#` instead.
pub fn canonicalize(href: &str, base: Option<&Url>) -> String {
    let href = href.trim();
    if href.is_empty() {
        return String::new();
    }

    let parsed = match base {
        Some(base) => base.join(href),
        None => Url::parse(href),
    };

    match parsed {
        Ok(url) if url.origin().is_tuple() => {
            format!("{}{}", url.origin().ascii_serialization(), url.path())
        }
        _ => strip_query(href).to_string(),
    }
}

/// Drop everything from the first `?` or `#` on.
pub fn strip_query(href: &str) -> &str {
    href.split(['?', '#']).next().unwrap_or(href)
}

/// Functional links (settings, trash, ...) that carry no content. Only the
/// snapshot export consults this; the live crawl records everything in scope.
pub fn should_ignore(href: &str, text: &str) -> bool {
    if href.is_empty() {
        return true;
    }
    let text = text.to_lowercase();
    IGNORE_KEYWORDS.iter().any(|keyword| text.contains(keyword))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://www.notion.so/workspace/root-123?pvs=4").unwrap()
    }

    #[test]
    fn test_scope_predicate() {
        assert!(is_in_scope("/child", "notion.so"));
        assert!(is_in_scope("https://www.notion.so/x", "notion.so"));
        assert!(!is_in_scope("https://example.com/x", "notion.so"));
        assert!(!is_in_scope("#heading", "notion.so"));
        assert!(!is_in_scope("javascript:void(0)", "notion.so"));
        assert!(!is_in_scope("", "notion.so"));
    }

    #[test]
    fn test_canonicalize_strips_query_and_fragment() {
        let base = base();
        assert_eq!(
            canonicalize("/a/b?x=1#y", Some(&base)),
            "https://www.notion.so/a/b"
        );
        assert_eq!(canonicalize("/a/b", Some(&base)), "https://www.notion.so/a/b");
        assert_eq!(
            canonicalize("https://www.notion.so/a/b#frag", None),
            "https://www.notion.so/a/b"
        );
    }

    #[test]
    fn test_canonicalize_is_idempotent() {
        let base = base();
        for href in [
            "/a/b?x=1#y",
            "child-page",
            "https://www.notion.so:443/A%20B?q",
            "not a url?q=1",
            "/",
        ] {
            let once = canonicalize(href, Some(&base));
            assert_eq!(canonicalize(&once, Some(&base)), once, "href: {}", href);
        }
    }

    #[test]
    fn test_canonicalize_falls_back_on_malformed_input() {
        assert_eq!(canonicalize("foo/bar?x#y", None), "foo/bar");
        assert_eq!(canonicalize("mailto:a@b.c?subject=x", None), "mailto:a@b.c");
        assert_eq!(canonicalize("", None), "");
    }

    #[test]
    fn test_should_ignore_keywords() {
        assert!(should_ignore("/settings", "Settings & members"));
        assert!(should_ignore("/x", "Get HELP"));
        assert!(should_ignore("", "Roadmap"));
        assert!(!should_ignore("/roadmap", "Roadmap"));
    }
}

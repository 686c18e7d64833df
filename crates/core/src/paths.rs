//! Archive-relative path arithmetic. Archive paths always use `/` and never
//! start with one.

use percent_encoding::percent_decode_str;

/// Directory part of an archive path, without a trailing slash.
pub fn dirname(path: &str) -> &str {
    path.rsplit_once('/').map_or("", |(dir, _)| dir)
}

pub fn basename(path: &str) -> &str {
    path.rsplit_once('/').map_or(path, |(_, name)| name)
}

/// Split `file.html#frag` into the file part and a non-empty fragment.
pub fn split_fragment(href: &str) -> (&str, Option<&str>) {
    match href.split_once('#') {
        Some((file, frag)) if !frag.is_empty() => (file, Some(frag)),
        Some((file, _)) => (file, None),
        None => (href, None),
    }
}

/// Split an href at its query or fragment, whichever comes first.
pub fn split_suffix(href: &str) -> (&str, &str) {
    match href.find(['?', '#']) {
        Some(at) => href.split_at(at),
        None => (href, ""),
    }
}

/// True for hrefs that do not name an archive entry: URLs with a scheme,
/// protocol-relative URLs and same-document fragments.
pub fn is_external(href: &str) -> bool {
    if href.is_empty() || href.starts_with('#') || href.starts_with("//") {
        return true;
    }
    match href.find(':') {
        Some(colon) => !href[..colon].contains('/'),
        None => false,
    }
}

/// Resolve `href` (percent-encoded, possibly with `.`/`..` segments) against
/// the archive directory `dir`.
pub fn join_path(dir: &str, href: &str) -> String {
    let decoded = percent_decode_str(href).decode_utf8_lossy();
    let mut segments: Vec<&str> = Vec::new();
    let base = if decoded.starts_with('/') { "" } else { dir };

    for segment in base.split('/').chain(decoded.split('/')) {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_against_directory() {
        assert_eq!(join_path("OEBPS", "text/c1.html"), "OEBPS/text/c1.html");
        assert_eq!(join_path("", "c1.html"), "c1.html");
        assert_eq!(join_path("OEBPS/text", "../images/a.png"), "OEBPS/images/a.png");
        assert_eq!(join_path("OEBPS", "./c1.html"), "OEBPS/c1.html");
    }

    #[test]
    fn decodes_percent_escapes() {
        assert_eq!(join_path("OEBPS", "my%20chapter.html"), "OEBPS/my chapter.html");
    }

    #[test]
    fn never_climbs_above_root() {
        assert_eq!(join_path("a", "../../b.html"), "b.html");
        assert_eq!(join_path("a", "/b.html"), "b.html");
    }

    #[test]
    fn splits_fragments() {
        assert_eq!(split_fragment("c1.html#s2"), ("c1.html", Some("s2")));
        assert_eq!(split_fragment("c1.html#"), ("c1.html", None));
        assert_eq!(split_fragment("c1.html"), ("c1.html", None));
        assert_eq!(split_suffix("a.png?v=1#x"), ("a.png", "?v=1#x"));
    }

    #[test]
    fn classifies_external_links() {
        assert!(is_external("http://example.com/a.png"));
        assert!(is_external("mailto:someone@example.com"));
        assert!(is_external("#note-1"));
        assert!(!is_external("images/a.png"));
        assert!(!is_external("../a:b.png"));
    }

    #[test]
    fn dir_and_base_names() {
        assert_eq!(dirname("OEBPS/content.opf"), "OEBPS");
        assert_eq!(dirname("content.opf"), "");
        assert_eq!(basename("OEBPS/images/a.png"), "a.png");
    }
}

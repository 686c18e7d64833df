//! Concatenates every spine document into one tree, dropping a marker element
//! wherever a navigation point starts a new chapter.

use tracing::{debug, warn};

use crate::chapters::{ChapterBreak, ChapterBreaks};
use crate::container::DocumentSource;
use crate::error::{AssemblyError, ConvertError};
use crate::markup::{concat_text, Element, ParserProfile, XHTML_NS};
use crate::package::{MediaRenameMap, Package};
use crate::paths;

pub const MARKER_CLASS_SPLIT: &str = "bookizip-marker--split";
pub const MARKER_CLASS_INFO: &str = "bookizip-marker--info";

const LINK_ATTRIBUTES: &[&str] = &["href", "src", "xlink:href", "poster", "data"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AssembleOptions {
    /// Add informational markers at file boundaries and in empty files.
    pub info_markers: bool,
    /// Fail on navigation fragments that match no element instead of
    /// anchoring the break at the start of the file.
    pub strict_anchors: bool,
}

/// An empty XHTML document, tagged with `lang` unless it is undetermined.
pub fn new_document(lang: Option<&str>) -> Element {
    let mut html = Element::new("html").with_attr("version", "XHTML 1.1");
    html.namespace = Some(XHTML_NS.to_string());
    html.namespace_decls.push((None, XHTML_NS.to_string()));
    if let Some(lang) = lang.filter(|l| !l.eq_ignore_ascii_case("und")) {
        html.set("xml:lang", lang);
        html.set("lang", lang);
    }
    html.with_child(Element::new("head"))
        .with_child(Element::new("body"))
}

pub fn assemble<S: DocumentSource + ?Sized>(
    source: &S,
    package: &Package,
    breaks: &ChapterBreaks<'_>,
    lang: Option<&str>,
    opts: &AssembleOptions,
) -> Result<Element, ConvertError> {
    let mut doc = new_document(lang);

    for id in &package.spine.items {
        let item = package.manifest.require(id)?;
        let mut root = if item.is_image() {
            let src = package.media_map.get(&item.path).unwrap_or(item.path.as_str());
            image_document(src)
        } else {
            source.get_tree(&item.path, ParserProfile::Html)?
        };

        rewrite_links(&mut root, paths::dirname(&item.path), &package.media_map);

        let body = root
            .find_descendant_mut("body")
            .ok_or_else(|| AssemblyError::MissingBody(item.path.clone()))?;
        let mut body = std::mem::take(body);

        let mut inserter = MarkerInserter::new(&mut body);
        if opts.info_markers && inserter.body.children.is_empty() {
            let marker = marker(
                &format!("bookizip-empty-file-{}", id),
                MARKER_CLASS_INFO,
                &[("title", item.path.as_str())],
            );
            inserter.body.children.push(marker);
        }

        for brk in breaks.for_file(&item.path) {
            inserter.insert_break(brk, lang, &item.path, opts)?;
        }

        if opts.info_markers {
            let marker = marker(
                &format!("bookizip-new-file-{}", id),
                MARKER_CLASS_INFO,
                &[("title", item.path.as_str())],
            );
            inserter.insert_at_start(marker);
        }

        let dest = doc
            .find_descendant_mut("body")
            .ok_or_else(|| AssemblyError::MissingBody("assembled document".into()))?;
        add_guts(body, dest);
        debug!(%id, path = %item.path, "appended spine document");
    }

    Ok(doc)
}

/// Append the content of `src` onto `dest`, keeping every run of text.
pub fn add_guts(src: Element, dest: &mut Element) {
    dest.append_text(src.text.as_deref());
    dest.children.extend(src.children);
    dest.tail = concat_text(dest.tail.take(), src.tail.as_deref());
}

fn image_document(src: &str) -> Element {
    let img = Element::new("img").with_attr("src", src).with_attr("alt", "");
    Element::new("html").with_child(Element::new("body").with_child(img))
}

fn rewrite_links(root: &mut Element, dir: &str, media_map: &MediaRenameMap) {
    root.for_each_mut(&mut |el| {
        for (name, value) in el.attributes.iter_mut() {
            if !LINK_ATTRIBUTES.contains(&name.as_str()) || paths::is_external(value) {
                continue;
            }
            let (path, suffix) = paths::split_suffix(value);
            if let Some(renamed) = media_map.get(&paths::join_path(dir, path)) {
                *value = format!("{}{}", renamed, suffix);
            }
        }
    });
}

fn marker(id: &str, class: &str, attrs: &[(&str, &str)]) -> Element {
    let mut hr = Element::new("hr").with_attr("id", id).with_attr("class", class);
    for (name, value) in attrs {
        hr.set(*name, *value);
    }
    hr
}

/// Places markers into one body. Markers that anchor at the start of the body
/// stack up in insertion order, and the body's leading text always follows
/// the last of them.
struct MarkerInserter<'b> {
    body: &'b mut Element,
    at_start: usize,
}

impl<'b> MarkerInserter<'b> {
    fn new(body: &'b mut Element) -> Self {
        Self { body, at_start: 0 }
    }

    fn insert_at_start(&mut self, mut marker: Element) {
        marker.tail = match self.at_start {
            0 => self.body.text.take(),
            n => self.body.children[n - 1].tail.take(),
        };
        self.body.children.insert(self.at_start, marker);
        self.at_start += 1;
    }

    fn insert_break(
        &mut self,
        brk: &ChapterBreak<'_>,
        lang: Option<&str>,
        path: &str,
        opts: &AssembleOptions,
    ) -> Result<(), AssemblyError> {
        let point = brk.point;
        let title = point
            .labels
            .find_good_label(lang)
            .unwrap_or_else(|| "untitled".to_string());
        let subsections = if point.children.is_empty() { "false" } else { "true" };
        let marker = marker(
            &point.id,
            MARKER_CLASS_SPLIT,
            &[("title", title.as_str()), ("subsections", subsections)],
        );

        let Some(fragment) = brk.fragment else {
            self.insert_at_start(marker);
            return Ok(());
        };

        match self.body.insert_before_id(fragment, marker) {
            Ok(()) => Ok(()),
            Err(_) if opts.strict_anchors => Err(AssemblyError::MissingAnchor {
                path: path.to_string(),
                fragment: fragment.to_string(),
            }),
            Err(marker) => {
                warn!(path, fragment, point = %point.id, "navigation fragment not found; anchoring at start of file");
                self.insert_at_start(marker);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chapters;
    use crate::error::ContainerError;
    use crate::markup::{parse, to_html_string};
    use crate::navigation::{Labels, NavPoint};
    use crate::package::{Manifest, ManifestItem, NamespacedMetadata, Spine};
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    struct Files(HashMap<String, Vec<u8>>);

    impl DocumentSource for Files {
        fn read_entry(&self, path: &str) -> Result<Vec<u8>, ContainerError> {
            self.0
                .get(path)
                .cloned()
                .ok_or_else(|| ContainerError::MissingEntry(path.to_string()))
        }
    }

    fn body_of(html: &str) -> Element {
        let mut root = parse(html.as_bytes(), ParserProfile::Html).unwrap();
        std::mem::take(root.find_descendant_mut("body").unwrap())
    }

    fn point(id: &str, label: &str, src: &str, children: Vec<NavPoint>) -> NavPoint {
        let mut labels = Labels::new();
        labels.insert(None, label);
        NavPoint {
            id: id.into(),
            class: None,
            play_order: None,
            content_src: src.into(),
            labels,
            children,
        }
    }

    fn package(items: &[(&str, &str, &str)], spine: &[&str]) -> Package {
        let mut manifest = Manifest::default();
        for (id, path, mimetype) in items {
            manifest.insert(ManifestItem {
                id: id.to_string(),
                path: path.to_string(),
                mimetype: mimetype.to_string(),
            });
        }
        Package {
            metadata: NamespacedMetadata::new(),
            media_map: MediaRenameMap::build(&manifest),
            manifest,
            spine: Spine {
                items: spine.iter().map(|s| s.to_string()).collect(),
                toc: None,
            },
            guide: None,
            path: "content.opf".into(),
        }
    }

    fn files(entries: &[(&str, &str)]) -> Files {
        Files(
            entries
                .iter()
                .map(|(k, v)| (k.to_string(), v.as_bytes().to_vec()))
                .collect(),
        )
    }

    #[test]
    fn splice_keeps_all_text() {
        let mut dest = body_of("<body>A</body>");
        add_guts(body_of("<body>B</body>"), &mut dest);
        assert_eq!(dest.text.as_deref(), Some("AB"));
        assert!(dest.children.is_empty());
    }

    #[test]
    fn splice_moves_leading_text_onto_last_tail() {
        let mut dest = body_of("<body><p>one</p></body>");
        add_guts(body_of("<body>lead<p>two</p>trail</body>"), &mut dest);
        assert_eq!(dest.children.len(), 2);
        assert_eq!(dest.children[0].tail.as_deref(), Some("lead"));
        assert_eq!(dest.children[1].tail.as_deref(), Some("trail"));
    }

    #[test]
    fn splice_adds_no_empty_text() {
        let mut dest = body_of("<body><p>one</p></body>");
        add_guts(body_of("<body><p>two</p></body>"), &mut dest);
        assert_eq!(dest.children[0].tail, None);
        assert_eq!(dest.text, None);
        assert_eq!(dest.tail, None);
    }

    #[test]
    fn inserts_markers_at_start_and_before_fragment() {
        let pkg = package(&[("c1", "c1.html", "application/xhtml+xml")], &["c1"]);
        let src = files(&[(
            "c1.html",
            r#"<html><body>intro<p id="s1">one</p><h2 id="s2">Two</h2><p>two</p></body></html>"#,
        )]);
        let points = vec![point(
            "n1",
            "One",
            "c1.html",
            vec![point("n2", "Two", "c1.html#s2", vec![])],
        )];
        let breaks = chapters::resolve(&points, "");
        let doc = assemble(&src, &pkg, &breaks, Some("en"), &AssembleOptions::default()).unwrap();

        let body = doc.find_child("body").unwrap();
        let ids: Vec<&str> = body.children.iter().filter_map(|c| c.get("id")).collect();
        assert_eq!(ids, ["n1", "s1", "n2", "s2"]);
        assert_eq!(body.text, None);
        assert_eq!(body.children[0].tail.as_deref(), Some("intro"));
        assert_eq!(body.children[0].get("class"), Some(MARKER_CLASS_SPLIT));
        assert_eq!(body.children[0].get("title"), Some("One"));
        assert_eq!(body.children[0].get("subsections"), Some("true"));
        assert_eq!(body.children[2].get("subsections"), Some("false"));
        assert_eq!(doc.get("xml:lang"), Some("en"));
    }

    #[test]
    fn several_start_markers_keep_navigation_order() {
        let pkg = package(&[("c1", "c1.html", "text/html")], &["c1"]);
        let src = files(&[("c1.html", "<body>text<p>x</p></body>")]);
        let points = vec![
            point("a", "A", "c1.html", vec![]),
            point("b", "B", "c1.html", vec![]),
        ];
        let breaks = chapters::resolve(&points, "");
        let doc = assemble(&src, &pkg, &breaks, None, &AssembleOptions::default()).unwrap();
        let body = doc.find_child("body").unwrap();
        assert_eq!(body.children[0].get("id"), Some("a"));
        assert_eq!(body.children[0].tail, None);
        assert_eq!(body.children[1].get("id"), Some("b"));
        assert_eq!(body.children[1].tail.as_deref(), Some("text"));
    }

    #[test]
    fn missing_fragment_falls_back_or_fails() {
        let pkg = package(&[("c1", "c1.html", "text/html")], &["c1"]);
        let src = files(&[("c1.html", "<body><p>x</p></body>")]);
        let points = vec![point("a", "A", "c1.html#nowhere", vec![])];
        let breaks = chapters::resolve(&points, "");

        let doc = assemble(&src, &pkg, &breaks, None, &AssembleOptions::default()).unwrap();
        assert_eq!(doc.find_child("body").unwrap().children[0].get("id"), Some("a"));

        let strict = AssembleOptions {
            strict_anchors: true,
            ..AssembleOptions::default()
        };
        let err = assemble(&src, &pkg, &breaks, None, &strict).unwrap_err();
        assert!(matches!(
            err,
            ConvertError::Assembly(AssemblyError::MissingAnchor { fragment, .. }) if fragment == "nowhere"
        ));
    }

    #[test]
    fn image_spine_items_become_img_documents() {
        let pkg = package(
            &[
                ("cover", "images/cover.jpg", "image/jpeg"),
                ("c1", "text/c1.html", "application/xhtml+xml"),
            ],
            &["cover", "c1"],
        );
        let src = files(&[(
            "text/c1.html",
            r#"<body><p><img src="../images/cover.jpg#x"/><a href="c2.html">next</a><a href="http://example.com/">out</a></p></body>"#,
        )]);
        let breaks = chapters::resolve(&[], "");
        let doc = assemble(&src, &pkg, &breaks, None, &AssembleOptions::default()).unwrap();
        let body = doc.find_child("body").unwrap();

        assert_eq!(body.children[0].name, "img");
        assert_eq!(body.children[0].get("src"), Some("static/cover.jpg"));
        assert_eq!(body.children[0].get("alt"), Some(""));

        let p = &body.children[1];
        assert_eq!(p.children[0].get("src"), Some("static/cover.jpg#x"));
        assert_eq!(p.children[1].get("href"), Some("c2.html"));
        assert_eq!(p.children[2].get("href"), Some("http://example.com/"));
    }

    #[test]
    fn info_markers_flag_file_boundaries() {
        let pkg = package(
            &[("c1", "c1.html", "text/html"), ("c2", "c2.html", "text/html")],
            &["c1", "c2"],
        );
        let src = files(&[("c1.html", "<body><p>x</p></body>"), ("c2.html", "<body></body>")]);
        let breaks = chapters::resolve(&[], "");
        let opts = AssembleOptions {
            info_markers: true,
            ..AssembleOptions::default()
        };
        let doc = assemble(&src, &pkg, &breaks, None, &opts).unwrap();
        let ids: Vec<&str> = doc
            .find_child("body")
            .unwrap()
            .children
            .iter()
            .filter(|c| c.get("class") == Some(MARKER_CLASS_INFO))
            .filter_map(|c| c.get("id"))
            .collect();
        assert_eq!(
            ids,
            ["bookizip-new-file-c1", "bookizip-new-file-c2", "bookizip-empty-file-c2"]
        );
    }

    #[test]
    fn dangling_spine_reference_fails() {
        let pkg = package(&[], &["ghost"]);
        let breaks = chapters::resolve(&[], "");
        let err = assemble(&files(&[]), &pkg, &breaks, None, &AssembleOptions::default()).unwrap_err();
        assert!(matches!(err, ConvertError::Package(_)));
    }

    #[test]
    fn assembled_document_serializes() {
        let pkg = package(&[("c1", "c1.html", "text/html")], &["c1"]);
        let src = files(&[("c1.html", "<body><p>Hi &amp; bye</p></body>")]);
        let breaks = chapters::resolve(&[], "");
        let doc = assemble(&src, &pkg, &breaks, None, &AssembleOptions::default()).unwrap();
        assert!(to_html_string(&doc).contains("<body><p>Hi &amp; bye</p></body>"));
    }
}

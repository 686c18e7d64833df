//! Split an assembled document into chapters at its split markers.

use tracing::debug;

use crate::assemble::MARKER_CLASS_SPLIT;
use crate::markup::Element;

/// Id given to content that precedes the first split marker.
pub const PREAMBLE_ID: &str = "preamble";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chapter {
    pub id: String,
    pub title: Option<String>,
    pub has_subsections: bool,
    /// A complete document: the root and every ancestor of the chapter's content.
    pub tree: Element,
}

/// Consume `doc` and cut it at every split marker. Ancestors open at a cut
/// are duplicated so that each chapter is a well-formed tree; the marker
/// itself is dropped and its tail starts the next chapter.
pub fn split_tree(doc: Element) -> Vec<Chapter> {
    let Element {
        name,
        namespace,
        prefix,
        attributes,
        namespace_decls,
        text,
        tail: _,
        children,
    } = doc;
    let root = Element {
        name,
        namespace,
        prefix,
        attributes,
        namespace_decls,
        text,
        ..Default::default()
    };

    let mut splitter = Splitter {
        stack: vec![root],
        chapters: Vec::new(),
        current: Heading {
            id: PREAMBLE_ID.to_string(),
            title: None,
            has_subsections: false,
        },
    };
    for child in children {
        splitter.walk(child);
    }
    splitter.finish()
}

/// Keep chapters holding non-whitespace text or an image.
pub fn drop_empty_chapters(chapters: Vec<Chapter>) -> Vec<Chapter> {
    chapters
        .into_iter()
        .filter(|chapter| {
            let keep = has_content(&chapter.tree);
            if !keep {
                debug!(id = %chapter.id, "dropping empty chapter");
            }
            keep
        })
        .collect()
}

fn has_content(tree: &Element) -> bool {
    let non_blank = |s: &Option<String>| s.as_deref().is_some_and(|s| !s.trim().is_empty());
    tree.descendants()
        .any(|e| non_blank(&e.text) || non_blank(&e.tail) || e.is("img"))
}

pub fn is_split_marker(el: &Element) -> bool {
    el.is("hr")
        && el
            .get("class")
            .is_some_and(|class| class.split_whitespace().any(|c| c == MARKER_CLASS_SPLIT))
}

struct Heading {
    id: String,
    title: Option<String>,
    has_subsections: bool,
}

impl Heading {
    fn into_chapter(self, tree: Element) -> Chapter {
        Chapter {
            id: self.id,
            title: self.title,
            has_subsections: self.has_subsections,
            tree,
        }
    }
}

struct Splitter {
    /// Open ancestors of the walk position within the current chapter.
    stack: Vec<Element>,
    chapters: Vec<Chapter>,
    current: Heading,
}

impl Splitter {
    fn append(&mut self, el: Element) {
        if let Some(top) = self.stack.last_mut() {
            top.children.push(el);
        }
    }

    fn walk(&mut self, el: Element) {
        if is_split_marker(&el) {
            self.cut(el);
            return;
        }
        if !el.descendants().any(is_split_marker) {
            self.append(el);
            return;
        }

        let mut open = el.shallow_copy();
        open.text = el.text;
        self.stack.push(open);
        for child in el.children {
            self.walk(child);
        }
        if let Some(mut closed) = self.stack.pop() {
            closed.tail = el.tail;
            self.append(closed);
        }
    }

    fn cut(&mut self, marker: Element) {
        let fresh = self.stack.iter().map(Element::shallow_copy).collect();
        let finished = std::mem::replace(&mut self.stack, fresh);
        let next = Heading {
            id: marker.get("id").unwrap_or_default().to_string(),
            title: marker.get("title").map(str::to_string),
            has_subsections: marker.get("subsections") == Some("true"),
        };
        let heading = std::mem::replace(&mut self.current, next);
        if let Some(tree) = fold(finished) {
            self.chapters.push(heading.into_chapter(tree));
        }
        if let Some(top) = self.stack.last_mut() {
            top.text = marker.tail;
        }
    }

    fn finish(mut self) -> Vec<Chapter> {
        let stack = std::mem::take(&mut self.stack);
        if let Some(tree) = fold(stack) {
            self.chapters.push(self.current.into_chapter(tree));
        }
        self.chapters
    }
}

/// Close every open element into its parent and return the root.
fn fold(mut stack: Vec<Element>) -> Option<Element> {
    let mut closed = stack.pop()?;
    while let Some(mut parent) = stack.pop() {
        parent.children.push(closed);
        closed = parent;
    }
    Some(closed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markup::{parse, ParserProfile};
    use pretty_assertions::assert_eq;

    fn split_html(html: &str) -> Vec<Chapter> {
        split_tree(parse(html.as_bytes(), ParserProfile::Html).unwrap())
    }

    fn body(chapter: &Chapter) -> &Element {
        chapter.tree.find_child("body").unwrap()
    }

    const MARKED: &str = r#"<html><body>
<hr class="bookizip-marker--split" id="n1" title="One" subsections="true">
<p>first</p>
<div><p>inner</p><hr class="bookizip-marker--split" id="n2" title="Two" subsections="false">tail<p>second</p></div>
<p>after</p>
</body></html>"#;

    #[test]
    fn cuts_at_every_marker() {
        let chapters = split_html(MARKED);
        let ids: Vec<&str> = chapters.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, ["preamble", "n1", "n2"]);
        assert_eq!(chapters[1].title.as_deref(), Some("One"));
        assert!(chapters[1].has_subsections);
        assert!(!chapters[2].has_subsections);
    }

    #[test]
    fn duplicates_open_ancestors() {
        let chapters = split_html(MARKED);

        let one = body(&chapters[1]);
        let div = one.find_child("div").unwrap();
        assert_eq!(div.children.len(), 1);
        assert_eq!(div.children[0].text.as_deref(), Some("inner"));

        let two = body(&chapters[2]);
        let div = two.find_child("div").unwrap();
        assert_eq!(div.text.as_deref(), Some("tail"));
        assert_eq!(div.children[0].text.as_deref(), Some("second"));
        assert_eq!(two.children.last().unwrap().text.as_deref(), Some("after"));
    }

    #[test]
    fn markers_do_not_survive() {
        for chapter in split_html(MARKED) {
            assert!(!chapter.tree.descendants().any(is_split_marker));
        }
    }

    #[test]
    fn document_without_markers_is_one_chapter() {
        let chapters = split_html("<html><body><p>x</p></body></html>");
        assert_eq!(chapters.len(), 1);
        assert_eq!(chapters[0].id, PREAMBLE_ID);
    }

    #[test]
    fn image_only_chapter_is_kept() {
        let chapters = split_html(
            r#"<html><body><hr class="bookizip-marker--split" id="c"><img src="static/a.png"></body></html>"#,
        );
        let kept = drop_empty_chapters(chapters);
        let ids: Vec<&str> = kept.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, ["c"]);
    }

    #[test]
    fn whitespace_only_chapter_is_dropped() {
        let chapters = split_html(
            "<html><body><hr class=\"bookizip-marker--split\" id=\"a\">  \n <p> </p>\
             <hr class=\"bookizip-marker--split\" id=\"b\"><p>text</p></body></html>",
        );
        let kept = drop_empty_chapters(chapters);
        let ids: Vec<&str> = kept.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, ["b"]);
    }

    #[test]
    fn filtering_is_idempotent() {
        let once = drop_empty_chapters(split_html(MARKED));
        let twice = drop_empty_chapters(once.clone());
        assert_eq!(once, twice);
    }
}

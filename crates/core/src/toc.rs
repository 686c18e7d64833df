//! Output table of contents, pointing at the per-chapter files.

use std::collections::HashSet;

use serde::Serialize;
use tracing::{debug, warn};

use crate::navigation::NavPoint;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TocNode {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TocNode>,
}

/// Output file name of a chapter.
pub fn chapter_url(id: &str) -> String {
    format!("{}.html", id)
}

/// Build the TOC in navigation document order. Points whose chapter did not
/// survive borrow the url of the next point that did.
pub fn build(points: &[NavPoint], chapter_ids: &[String], lang: Option<&str>) -> Vec<TocNode> {
    let chapters: HashSet<&str> = chapter_ids.iter().map(String::as_str).collect();
    let mut pending = PendingUrls::default();
    let mut path = Vec::new();

    let mut toc = write_level(points, &chapters, lang, &mut path, &mut pending);
    let unresolved = pending.apply(&mut toc);
    if unresolved > 0 {
        warn!(
            count = unresolved,
            "navigation points have no content anywhere after them; leaving them without a url"
        );
    }
    toc
}

fn write_level(
    points: &[NavPoint],
    chapters: &HashSet<&str>,
    lang: Option<&str>,
    path: &mut Vec<usize>,
    pending: &mut PendingUrls,
) -> Vec<TocNode> {
    let mut nodes = Vec::with_capacity(points.len());
    for (index, point) in points.iter().enumerate() {
        path.push(index);

        let mut node = TocNode {
            title: point.labels.find_good_label(lang).filter(|t| !t.is_empty()),
            ..TocNode::default()
        };
        if chapters.contains(point.id.as_str()) {
            let url = chapter_url(&point.id);
            pending.resolve(&url);
            node.url = Some(url);
        } else {
            pending.defer(path.clone());
        }
        node.children = write_level(&point.children, chapters, lang, path, pending);

        path.pop();
        nodes.push(node);
    }
    nodes
}

/// Nodes still waiting for a url, addressed by their index path in the tree.
#[derive(Debug, Default)]
struct PendingUrls {
    deferred: Vec<Vec<usize>>,
    resolved: Vec<(Vec<usize>, String)>,
}

impl PendingUrls {
    fn defer(&mut self, path: Vec<usize>) {
        self.deferred.push(path);
    }

    /// Hand `url` to every deferred node, most recently deferred first.
    fn resolve(&mut self, url: &str) {
        while let Some(path) = self.deferred.pop() {
            self.resolved.push((path, url.to_string()));
        }
    }

    /// Write resolved urls into `toc`; returns how many nodes stayed unresolved.
    fn apply(self, toc: &mut [TocNode]) -> usize {
        for (path, url) in self.resolved {
            if let Some(node) = node_at_mut(toc, &path) {
                debug!(title = ?node.title, %url, "toc entry takes deferred url");
                node.url = Some(url);
            }
        }
        self.deferred.len()
    }
}

fn node_at_mut<'a>(nodes: &'a mut [TocNode], path: &[usize]) -> Option<&'a mut TocNode> {
    let (first, rest) = path.split_first()?;
    let node = nodes.get_mut(*first)?;
    if rest.is_empty() {
        Some(node)
    } else {
        node_at_mut(&mut node.children, rest)
    }
}

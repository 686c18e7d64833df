//! Flattens the navigation tree and groups its points by the spine file they target.

use std::collections::HashMap;

use tracing::debug;

use crate::navigation::NavPoint;
use crate::paths;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChapterBreak<'a> {
    /// Nesting depth in the navigation tree, starting at 1.
    pub depth: usize,
    pub fragment: Option<&'a str>,
    pub point: &'a NavPoint,
}

#[derive(Debug, Default)]
pub struct ChapterBreaks<'a> {
    /// Every point in document order with its depth.
    pub serialized: Vec<(usize, &'a NavPoint)>,
    /// Archive path → breaks inside that file, in document order.
    pub by_file: HashMap<String, Vec<ChapterBreak<'a>>>,
}

impl<'a> ChapterBreaks<'a> {
    pub fn for_file(&self, path: &str) -> &[ChapterBreak<'a>] {
        self.by_file.get(path).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Pre-order walk of `points` starting at depth 1. Targets are resolved
/// against `nav_dir`, the navigation document's directory. `play_order`
/// is never consulted.
pub fn resolve<'a>(points: &'a [NavPoint], nav_dir: &str) -> ChapterBreaks<'a> {
    let mut breaks = ChapterBreaks::default();
    for point in points {
        serialise(point, 1, &mut breaks.serialized);
    }

    for &(depth, point) in &breaks.serialized {
        let (file, fragment) = point.content();
        if fragment.is_some() {
            debug!(point = %point.id, src = %point.content_src, "chapter break has a fragment");
        }
        breaks
            .by_file
            .entry(paths::join_path(nav_dir, file))
            .or_default()
            .push(ChapterBreak {
                depth,
                fragment,
                point,
            });
    }
    breaks
}

fn serialise<'a>(point: &'a NavPoint, depth: usize, out: &mut Vec<(usize, &'a NavPoint)>) {
    out.push((depth, point));
    for child in &point.children {
        serialise(child, depth + 1, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::navigation::Labels;
    use pretty_assertions::assert_eq;

    fn point(id: &str, src: &str, play_order: u32, children: Vec<NavPoint>) -> NavPoint {
        NavPoint {
            id: id.into(),
            class: None,
            play_order: Some(play_order),
            content_src: src.into(),
            labels: Labels::new(),
            children,
        }
    }

    #[test]
    fn follows_document_order_not_play_order() {
        let points = vec![
            point(
                "a",
                "a.html",
                4,
                vec![point("a1", "a.html#x", 3, vec![]), point("a2", "b.html", 2, vec![])],
            ),
            point("b", "c.html", 1, vec![]),
        ];
        let breaks = resolve(&points, "");
        let order: Vec<(usize, &str)> = breaks
            .serialized
            .iter()
            .map(|(depth, p)| (*depth, p.id.as_str()))
            .collect();
        assert_eq!(order, [(1, "a"), (2, "a1"), (2, "a2"), (1, "b")]);
    }

    #[test]
    fn groups_breaks_by_resolved_file() {
        let points = vec![point(
            "n1",
            "text/c1.html",
            1,
            vec![point("n2", "text/c1.html#s2", 2, vec![])],
        )];
        let breaks = resolve(&points, "OEBPS");
        let c1 = breaks.for_file("OEBPS/text/c1.html");
        assert_eq!(c1.len(), 2);
        assert_eq!((c1[0].depth, c1[0].fragment, c1[0].point.id.as_str()), (1, None, "n1"));
        assert_eq!((c1[1].depth, c1[1].fragment, c1[1].point.id.as_str()), (2, Some("s2"), "n2"));
        assert!(breaks.for_file("text/c1.html").is_empty());
    }
}

//! NCX navigation document parsing.

use std::collections::BTreeMap;

use serde::{Serialize, Serializer};
use tracing::{debug, warn};

use crate::error::NavigationError;
use crate::markup::Element;
use crate::paths;
use crate::security::{self, SecurityLimits};

/// Display labels keyed by language tag, in document order; `None` is the
/// unspecified language.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Labels(Vec<(Option<String>, String)>);

impl Labels {
    pub fn new() -> Self {
        Self::default()
    }

    /// Later labels for the same language replace earlier ones in place.
    pub fn insert(&mut self, lang: Option<String>, text: impl Into<String>) {
        let text = text.into();
        match self.0.iter().position(|(l, _)| *l == lang) {
            Some(index) => {
                let previous = std::mem::replace(&mut self.0[index].1, text);
                debug!(?lang, %previous, "duplicate label language; keeping the later label");
            }
            None => self.0.push((lang, text)),
        }
    }

    pub fn get(&self, lang: Option<&str>) -> Option<&str> {
        self.0
            .iter()
            .find(|(l, _)| l.as_deref() == lang)
            .map(|(_, text)| text.as_str())
    }

    /// The label for `lang`, else the unspecified-language label, else every
    /// label joined with ` | ` in document order.
    pub fn find_good_label(&self, lang: Option<&str>) -> Option<String> {
        if let Some(label) = lang.and_then(|l| self.get(Some(l))) {
            return Some(label.to_string());
        }
        if let Some(label) = self.get(None) {
            return Some(label.to_string());
        }
        if self.0.is_empty() {
            return None;
        }
        Some(
            self.0
                .iter()
                .map(|(_, text)| text.as_str())
                .collect::<Vec<_>>()
                .join(" | "),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for Labels {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter().map(|(k, v)| (k.as_deref().unwrap_or(""), v)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NavPoint {
    pub id: String,
    pub class: Option<String>,
    /// Informational only; output order follows document order.
    pub play_order: Option<u32>,
    /// Target as written in the navigation document, fragment included.
    pub content_src: String,
    pub labels: Labels,
    pub children: Vec<NavPoint>,
}

impl NavPoint {
    /// File part and fragment of the target.
    pub fn content(&self) -> (&str, Option<&str>) {
        paths::split_fragment(&self.content_src)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NavMap {
    pub info: Labels,
    pub labels: Labels,
    pub points: Vec<NavPoint>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NavTarget {
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub play_order: Option<u32>,
    pub content_src: Option<String>,
    pub labels: Labels,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

/// A `pageList` or `navList`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TargetList {
    pub info: Labels,
    pub labels: Labels,
    pub targets: Vec<NavTarget>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HeaderValue {
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheme: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NavTree {
    /// Every header value is kept, in document order.
    pub headers: BTreeMap<String, Vec<HeaderValue>>,
    pub navmap: NavMap,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_list: Option<TargetList>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub nav_lists: Vec<TargetList>,
}

impl NavTree {
    pub fn parse(tree: &Element, limits: &SecurityLimits) -> Result<Self, NavigationError> {
        if !tree.is("ncx") {
            return Err(NavigationError::MissingRoot(tree.name.clone()));
        }
        let navmap = tree
            .find_child("navMap")
            .ok_or(NavigationError::MissingNavMap)?;

        let mut parser = NavParser {
            limits,
            synthesized: 0,
        };

        Ok(Self {
            headers: parse_headers(tree),
            navmap: NavMap {
                info: labels_of(navmap, "navInfo"),
                labels: labels_of(navmap, "navLabel"),
                points: navmap
                    .children_named("navPoint")
                    .map(|p| parser.nav_point(p, 1))
                    .collect::<Result<_, _>>()?,
            },
            page_list: tree
                .find_child("pageList")
                .map(|e| target_list(e, "pageTarget")),
            nav_lists: tree
                .children_named("navList")
                .map(|e| target_list(e, "navTarget"))
                .collect(),
        })
    }

    pub fn points(&self) -> &[NavPoint] {
        &self.navmap.points
    }
}

struct NavParser<'a> {
    limits: &'a SecurityLimits,
    synthesized: usize,
}

impl NavParser<'_> {
    fn nav_point(&mut self, el: &Element, depth: u32) -> Result<NavPoint, NavigationError> {
        security::check_nav_depth(depth, self.limits)?;

        let id = match el.get("id") {
            Some(id) => id.to_string(),
            None => {
                self.synthesized += 1;
                let id = format!("navpoint-{}", self.synthesized);
                warn!(%id, "navPoint has no id; synthesized one");
                id
            }
        };

        let content_src = match el.find_child("content").and_then(|c| c.get("src")) {
            Some(src) => src.to_string(),
            None => {
                warn!(%id, "navPoint has no content target");
                String::new()
            }
        };

        let children = el
            .children_named("navPoint")
            .map(|child| self.nav_point(child, depth + 1))
            .collect::<Result<_, _>>()?;

        Ok(NavPoint {
            play_order: play_order(el, &id),
            class: el.get("class").map(str::to_string),
            labels: labels_of(el, "navLabel"),
            content_src,
            children,
            id,
        })
    }
}

fn play_order(el: &Element, id: &str) -> Option<u32> {
    let raw = el.get("playOrder")?;
    match raw.trim().parse() {
        Ok(order) => Some(order),
        Err(_) => {
            debug!(id, raw, "ignoring unparsable playOrder");
            None
        }
    }
}

/// Trimmed text of the `<text>` inside an NCX label-like element.
fn ncx_text(el: &Element) -> String {
    el.find_descendant("text")
        .map(|t| t.text_content().trim().to_string())
        .unwrap_or_default()
}

fn labels_of(el: &Element, tag: &str) -> Labels {
    let mut labels = Labels::new();
    for label in el.children_named(tag) {
        labels.insert(label.get("xml:lang").map(str::to_string), ncx_text(label));
    }
    labels
}

fn target_list(el: &Element, target_tag: &str) -> TargetList {
    TargetList {
        info: labels_of(el, "navInfo"),
        labels: labels_of(el, "navLabel"),
        targets: el
            .children_named(target_tag)
            .map(|t| NavTarget {
                id: t.get("id").map(str::to_string),
                kind: t.get("type").map(str::to_string),
                play_order: play_order(t, t.get("id").unwrap_or_default()),
                content_src: t
                    .find_child("content")
                    .and_then(|c| c.get("src"))
                    .map(str::to_string),
                labels: labels_of(t, "navLabel"),
                value: t.get("value").map(str::to_string),
            })
            .collect(),
    }
}

fn parse_headers(root: &Element) -> BTreeMap<String, Vec<HeaderValue>> {
    let mut headers: BTreeMap<String, Vec<HeaderValue>> = BTreeMap::new();
    let mut set = |name: &str, content: String, scheme: Option<String>| {
        headers
            .entry(name.to_string())
            .or_default()
            .push(HeaderValue { content, scheme });
    };

    if let Some(head) = root.find_child("head") {
        for meta in head.children_named("meta") {
            if let Some(name) = meta.get("name") {
                set(
                    name,
                    meta.get("content").unwrap_or_default().to_string(),
                    meta.get("scheme").map(str::to_string),
                );
            }
        }
    }
    for tag in ["docTitle", "docAuthor"] {
        for el in root.children_named(tag) {
            set(tag, ncx_text(el), None);
        }
    }
    if let Some(dir) = root.get("dir") {
        set("dir", dir.to_string(), None);
    }
    if let Some(lang) = root.get("xml:lang") {
        set("lang", lang.to_string(), None);
    }
    headers
}

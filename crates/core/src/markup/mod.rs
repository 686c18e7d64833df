//! Owned markup tree shared by every stage.
//!
//! Text follows the element-tree model: `text` is the character data before
//! the first child, `tail` is the character data after an element's end tag
//! and before its next sibling. Splicing and splitting rely on this to keep
//! inter-element whitespace intact.

mod html;
mod serialize;
mod xml;

pub use serialize::to_html_string;

use crate::error::MarkupError;

pub const XHTML_NS: &str = "http://www.w3.org/1999/xhtml";
pub const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

/// Which parser handles a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserProfile {
    /// Namespace-aware, fails on malformed input.
    Xml,
    /// HTML5 tree building, tolerates anything.
    Html,
}

/// Element nesting accepted when the caller sets no limit of its own.
pub const DEFAULT_MAX_DEPTH: u32 = 1024;

/// Parse a document into an owned tree rooted at its document element.
pub fn parse(bytes: &[u8], profile: ParserProfile) -> Result<Element, MarkupError> {
    parse_with_limit(bytes, profile, DEFAULT_MAX_DEPTH)
}

/// Like [`parse`], failing with [`MarkupError::TooDeep`] once elements nest
/// deeper than `max_depth`. The root element is at depth 1.
pub fn parse_with_limit(
    bytes: &[u8],
    profile: ParserProfile,
    max_depth: u32,
) -> Result<Element, MarkupError> {
    match profile {
        ParserProfile::Xml => xml::parse(bytes, max_depth),
        ParserProfile::Html => html::parse(bytes, max_depth),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    /// Local name.
    pub name: String,
    /// Resolved namespace URI, if the element is bound to one.
    pub namespace: Option<String>,
    pub prefix: Option<String>,
    /// Attributes by qualified name as written (`xml:lang`, `opf:role`).
    pub attributes: Vec<(String, String)>,
    /// `xmlns` declarations made on this element; `None` is the default namespace.
    pub namespace_decls: Vec<(Option<String>, String)>,
    pub text: Option<String>,
    pub tail: Option<String>,
    pub children: Vec<Element>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(name, value);
        self
    }

    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    /// A copy carrying only the element's identity: name, namespace and attributes.
    pub fn shallow_copy(&self) -> Self {
        Self {
            name: self.name.clone(),
            namespace: self.namespace.clone(),
            prefix: self.prefix.clone(),
            attributes: self.attributes.clone(),
            namespace_decls: self.namespace_decls.clone(),
            ..Default::default()
        }
    }

    pub fn is(&self, local: &str) -> bool {
        self.name == local
    }

    /// Attribute by exact qualified name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Attribute by local name, ignoring any prefix.
    pub fn get_local(&self, local: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| local_part(k) == local)
            .map(|(_, v)| v.as_str())
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|(k, _)| *k == name) {
            Some(slot) => slot.1 = value,
            None => self.attributes.push((name, value)),
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        let index = self.attributes.iter().position(|(k, _)| k == name)?;
        Some(self.attributes.remove(index).1)
    }

    pub fn find_child(&self, local: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.is(local))
    }

    pub fn children_named<'a>(&'a self, local: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.is(local))
    }

    /// Pre-order walk over this element and everything below it.
    pub fn descendants(&self) -> Descendants<'_> {
        Descendants { stack: vec![self] }
    }

    pub fn find_descendant(&self, local: &str) -> Option<&Element> {
        self.descendants().find(|e| e.is(local))
    }

    pub fn find_descendant_mut(&mut self, local: &str) -> Option<&mut Element> {
        if self.is(local) {
            return Some(self);
        }
        self.children
            .iter_mut()
            .find_map(|child| child.find_descendant_mut(local))
    }

    pub fn contains_id(&self, id: &str) -> bool {
        self.descendants().any(|e| e.get("id") == Some(id))
    }

    /// Insert `new` as the preceding sibling of the first element whose `id`
    /// equals `id`. Hands `new` back when no such element exists below `self`.
    pub fn insert_before_id(&mut self, id: &str, new: Element) -> Result<(), Element> {
        let mut new = new;
        for index in 0..self.children.len() {
            if self.children[index].get("id") == Some(id) {
                self.children.insert(index, new);
                return Ok(());
            }
            match self.children[index].insert_before_id(id, new) {
                Ok(()) => return Ok(()),
                Err(back) => new = back,
            }
        }
        Err(new)
    }

    /// Concatenated character data of this subtree, excluding this element's tail.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        if let Some(text) = &self.text {
            out.push_str(text);
        }
        for child in &self.children {
            child.collect_text(out);
            if let Some(tail) = &child.tail {
                out.push_str(tail);
            }
        }
    }

    /// Append character data at the current end of this element's content.
    pub fn append_text(&mut self, text: Option<&str>) {
        match self.children.last_mut() {
            Some(last) => last.tail = concat_text(last.tail.take(), text),
            None => self.text = concat_text(self.text.take(), text),
        }
    }

    /// Apply `f` to this element and every element below it.
    pub fn for_each_mut(&mut self, f: &mut impl FnMut(&mut Element)) {
        f(self);
        for child in &mut self.children {
            child.for_each_mut(f);
        }
    }
}

pub struct Descendants<'a> {
    stack: Vec<&'a Element>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = &'a Element;

    fn next(&mut self) -> Option<Self::Item> {
        let next = self.stack.pop()?;
        self.stack.extend(next.children.iter().rev());
        Some(next)
    }
}

/// Join two optional text runs. `None` counts as empty on input; an empty
/// result is stored as `None` so no empty text nodes appear.
pub fn concat_text(a: Option<String>, b: Option<&str>) -> Option<String> {
    let mut joined = a.unwrap_or_default();
    if let Some(b) = b {
        joined.push_str(b);
    }
    if joined.is_empty() {
        None
    } else {
        Some(joined)
    }
}

pub(crate) fn local_part(qualified: &str) -> &str {
    qualified.rsplit_once(':').map_or(qualified, |(_, local)| local)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concat_text_treats_none_as_empty() {
        assert_eq!(concat_text(None, None), None);
        assert_eq!(concat_text(Some(String::new()), Some("")), None);
        assert_eq!(concat_text(None, Some("b")), Some("b".to_string()));
        assert_eq!(concat_text(Some("a".into()), None), Some("a".to_string()));
        assert_eq!(concat_text(Some("a".into()), Some("b")), Some("ab".to_string()));
    }

    #[test]
    fn descendants_are_pre_order() {
        let tree = Element::new("a")
            .with_child(Element::new("b").with_child(Element::new("c")))
            .with_child(Element::new("d"));
        let names: Vec<&str> = tree.descendants().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["a", "b", "c", "d"]);
    }

    #[test]
    fn insert_before_id_finds_nested_target() {
        let mut tree = Element::new("body").with_child(
            Element::new("div")
                .with_child(Element::new("p"))
                .with_child(Element::new("h2").with_attr("id", "s2")),
        );
        assert!(tree.insert_before_id("s2", Element::new("hr")).is_ok());
        let names: Vec<&str> = tree.children[0]
            .children
            .iter()
            .map(|e| e.name.as_str())
            .collect();
        assert_eq!(names, ["p", "hr", "h2"]);
    }

    #[test]
    fn insert_before_id_returns_element_when_missing() {
        let mut tree = Element::new("body").with_child(Element::new("p"));
        let back = tree.insert_before_id("nope", Element::new("hr")).unwrap_err();
        assert_eq!(back.name, "hr");
        assert_eq!(tree.children.len(), 1);
    }

    #[test]
    fn append_text_goes_to_last_child_tail() {
        let mut el = Element::new("body");
        el.append_text(Some("lead"));
        assert_eq!(el.text.as_deref(), Some("lead"));
        el.children.push(Element::new("p"));
        el.append_text(Some("after"));
        assert_eq!(el.children[0].tail.as_deref(), Some("after"));
        el.append_text(None);
        assert_eq!(el.children[0].tail.as_deref(), Some("after"));
    }

    #[test]
    fn attribute_lookup_by_local_name() {
        let el = Element::new("dc:creator").with_attr("opf:role", "aut");
        assert_eq!(el.get("opf:role"), Some("aut"));
        assert_eq!(el.get("role"), None);
        assert_eq!(el.get_local("role"), Some("aut"));
    }
}

use scraper::node::Node;
use scraper::{ElementRef, Html};

use super::Element;
use crate::error::MarkupError;

pub(super) fn parse(bytes: &[u8], max_depth: u32) -> Result<Element, MarkupError> {
    let source = String::from_utf8_lossy(bytes);
    let document = Html::parse_document(&source);
    convert(document.root_element(), 1, max_depth)
}

fn convert(node: ElementRef<'_>, depth: u32, max_depth: u32) -> Result<Element, MarkupError> {
    if depth > max_depth {
        return Err(MarkupError::TooDeep {
            depth,
            limit: max_depth,
        });
    }

    let value = node.value();
    let mut element = Element::new(value.name());
    element.attributes = value
        .attrs()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    for child in node.children() {
        match child.value() {
            Node::Text(text) => element.append_text(Some(&**text)),
            Node::Element(_) => {
                if let Some(child) = ElementRef::wrap(child) {
                    element.children.push(convert(child, depth + 1, max_depth)?);
                }
            }
            _ => {}
        }
    }
    Ok(element)
}

use quick_xml::events::{BytesStart, Event};
use quick_xml::name::{PrefixDeclaration, ResolveResult};
use quick_xml::NsReader;

use super::Element;
use crate::error::MarkupError;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

pub(super) fn parse(bytes: &[u8], max_depth: u32) -> Result<Element, MarkupError> {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    let mut reader = NsReader::from_reader(bytes);

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        let (ns, event) = reader.read_resolved_event()?;
        match event {
            Event::Start(ref e) => {
                check_depth(stack.len(), max_depth)?;
                stack.push(start_element(e, &ns)?);
            }
            Event::Empty(ref e) => {
                check_depth(stack.len(), max_depth)?;
                let element = start_element(e, &ns)?;
                attach(&mut stack, &mut root, element);
            }
            Event::End(_) => {
                if let Some(element) = stack.pop() {
                    attach(&mut stack, &mut root, element);
                }
            }
            Event::Text(ref e) => {
                if let Some(top) = stack.last_mut() {
                    let text = e
                        .unescape_with(resolve_entity)
                        .map_err(quick_xml::Error::from)?;
                    top.append_text(Some(&text));
                }
            }
            Event::CData(e) => {
                if let Some(top) = stack.last_mut() {
                    let raw = e.into_inner();
                    top.append_text(Some(&String::from_utf8_lossy(&raw)));
                }
            }
            Event::Eof => break,
            // declarations, doctype, comments, processing instructions
            _ => {}
        }
    }

    if let Some(open) = stack.pop() {
        return Err(MarkupError::Unclosed(open.name));
    }
    root.ok_or(MarkupError::NoRoot)
}

/// `open` elements are already on the stack; one more is about to start.
fn check_depth(open: usize, max_depth: u32) -> Result<(), MarkupError> {
    let depth = u32::try_from(open + 1).unwrap_or(u32::MAX);
    if depth > max_depth {
        return Err(MarkupError::TooDeep {
            depth,
            limit: max_depth,
        });
    }
    Ok(())
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None => {
            if root.is_none() {
                *root = Some(element);
            }
        }
    }
}

fn start_element(e: &BytesStart<'_>, ns: &ResolveResult<'_>) -> Result<Element, MarkupError> {
    let mut element = Element::new(String::from_utf8_lossy(e.local_name().as_ref()));
    element.prefix = e
        .name()
        .prefix()
        .map(|p| String::from_utf8_lossy(p.as_ref()).into_owned());
    if let ResolveResult::Bound(uri) = ns {
        element.namespace = Some(String::from_utf8_lossy(uri.as_ref()).into_owned());
    }

    for attr in e.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        let value = attr
            .unescape_value()
            .map_err(quick_xml::Error::from)?
            .into_owned();
        match attr.key.as_namespace_binding() {
            Some(PrefixDeclaration::Default) => element.namespace_decls.push((None, value)),
            Some(PrefixDeclaration::Named(prefix)) => element
                .namespace_decls
                .push((Some(String::from_utf8_lossy(prefix).into_owned()), value)),
            None => {
                let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
                element.attributes.push((key, value));
            }
        }
    }

    Ok(element)
}

/// The handful of HTML entities that show up in hand-written XHTML without a DTD.
fn resolve_entity(name: &str) -> Option<&'static str> {
    match name {
        "nbsp" => Some("\u{a0}"),
        "shy" => Some("\u{ad}"),
        "copy" => Some("\u{a9}"),
        "reg" => Some("\u{ae}"),
        "trade" => Some("\u{2122}"),
        "mdash" => Some("\u{2014}"),
        "ndash" => Some("\u{2013}"),
        "hellip" => Some("\u{2026}"),
        "lsquo" => Some("\u{2018}"),
        "rsquo" => Some("\u{2019}"),
        "ldquo" => Some("\u{201c}"),
        "rdquo" => Some("\u{201d}"),
        _ => None,
    }
}

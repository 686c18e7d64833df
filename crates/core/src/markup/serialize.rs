use quick_xml::escape::{escape, partial_escape};

use super::Element;

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style"];

/// Serialize a document tree as HTML, preceded by an HTML5 doctype.
pub fn to_html_string(root: &Element) -> String {
    let mut out = String::from("<!DOCTYPE html>\n");
    write_element(root, &mut out);
    out
}

fn write_element(el: &Element, out: &mut String) {
    let tag = match &el.prefix {
        Some(prefix) => format!("{}:{}", prefix, el.name),
        None => el.name.clone(),
    };

    out.push('<');
    out.push_str(&tag);
    for (prefix, uri) in &el.namespace_decls {
        match prefix {
            Some(prefix) => write_attr(out, &format!("xmlns:{}", prefix), uri),
            None => write_attr(out, "xmlns", uri),
        }
    }
    for (name, value) in &el.attributes {
        write_attr(out, name, value);
    }
    out.push('>');

    let is_void = VOID_ELEMENTS.contains(&el.name.as_str());
    if is_void && el.text.is_none() && el.children.is_empty() {
        return;
    }

    let raw = RAW_TEXT_ELEMENTS.contains(&el.name.as_str());
    if let Some(text) = &el.text {
        write_text(out, text, raw);
    }
    for child in &el.children {
        write_element(child, out);
        if let Some(tail) = &child.tail {
            write_text(out, tail, raw);
        }
    }

    out.push_str("</");
    out.push_str(&tag);
    out.push('>');
}

fn write_attr(out: &mut String, name: &str, value: &str) {
    out.push(' ');
    out.push_str(name);
    out.push_str("=\"");
    out.push_str(&escape(value));
    out.push('"');
}

fn write_text(out: &mut String, text: &str, raw: bool) {
    if raw {
        out.push_str(text);
    } else {
        out.push_str(&partial_escape(text));
    }
}

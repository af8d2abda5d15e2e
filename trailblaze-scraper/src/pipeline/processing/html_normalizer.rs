use ego_tree::NodeRef;
use scraper::node::Element;
use scraper::{Html, Node, Selector};
use std::fmt::Write;

// Chrome that never carries event data.
const DROP_TAGS: &[&str] = &[
    "script", "style", "noscript", "iframe", "svg", "template", "meta", "link", "title", "head",
];

const VOID_TAGS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "param", "source", "track", "wbr",
];

/// Pure bytes → normalized-HTML transform applied between fetch and
/// parse. Strips scripts, styles, comments, and presentation-only
/// attributes while keeping tag structure, text, links, and the
/// attributes the parser anchors on. Idempotent:
/// `normalize(normalize(x)) == normalize(x)`.
pub fn normalize(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    let document = Html::parse_document(&text);
    let body_selector = Selector::parse("body").expect("static selector");

    let mut out = String::new();
    if let Some(body) = document.select(&body_selector).next() {
        for child in body.children() {
            serialize_node(child, &mut out);
        }
    }
    out.trim().to_string()
}

fn serialize_node(node: NodeRef<'_, Node>, out: &mut String) {
    match node.value() {
        Node::Text(text) => out.push_str(&escape_text(&collapse_whitespace(text))),
        Node::Element(element) => serialize_element(node, element, out),
        // comments, doctypes, processing instructions all drop
        _ => {}
    }
}

fn serialize_element(node: NodeRef<'_, Node>, element: &Element, out: &mut String) {
    let name = element.name();
    if DROP_TAGS.contains(&name) {
        return;
    }
    if name == "img" && is_tracking_pixel(element) {
        return;
    }

    out.push('<');
    out.push_str(name);

    let mut attrs: Vec<(&str, &str)> = element
        .attrs()
        .filter(|(key, _)| keep_attribute(key))
        .collect();
    attrs.sort();
    for (key, value) in attrs {
        let _ = write!(out, " {key}=\"{}\"", escape_attribute(value));
    }
    out.push('>');

    if VOID_TAGS.contains(&name) {
        return;
    }
    for child in node.children() {
        serialize_node(child, out);
    }
    let _ = write!(out, "</{name}>");
}

/// `href`/`id`/`class`/`data-*` carry parser anchors; `name` survives
/// for `<a name="ride-NNN">` identity anchors.
fn keep_attribute(key: &str) -> bool {
    matches!(key, "href" | "id" | "class" | "name") || key.starts_with("data-")
}

fn is_tracking_pixel(element: &Element) -> bool {
    element.attr("width") == Some("1") || element.attr("height") == Some("1")
}

/// Collapse runs of spaces and tabs but keep line breaks: date ranges in
/// the calendar sometimes only separate per-day rows with newlines.
fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;
    for c in text.chars() {
        match c {
            ' ' | '\t' | '\r' | '\u{a0}' => pending_space = true,
            '\n' => {
                pending_space = false;
                out.push('\n');
            }
            other => {
                if pending_space {
                    out.push(' ');
                    pending_space = false;
                }
                out.push(other);
            }
        }
    }
    if pending_space {
        out.push(' ');
    }
    out
}

fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn escape_attribute(value: &str) -> String {
    escape_text(value).replace('"', "&quot;")
}

//! HTML cleaning for fetched pages.
//!
//! Keeps document structure but drops everything that does not carry
//! content: non-content tags and their subtrees, comments, every attribute,
//! and elements left empty once their text is stripped. The result is the
//! cleaned `<body>` inner HTML with whitespace runs collapsed to one space.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Node};

/// Tags removed together with their subtree.
const DROPPED_TAGS: &[&str] = &[
    "script", "style", "noscript", "iframe", "svg", "meta", "link", "img", "button", "input", "video", "audio",
    "canvas", "map", "object", "select", "textarea", "nav", "footer", "aside",
];

/// Tags kept even when empty.
const VOID_KEPT: &[&str] = &["br", "hr"];

/// Tags whose direct text is kept verbatim instead of trimmed.
const PREFORMATTED: &[&str] = &["pre", "code"];

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("invalid whitespace pattern"));

/// Clean an HTML page or fragment down to its content-bearing markup.
pub fn clean_html(html: &str) -> String {
    let document = Html::parse_document(html);
    let Some(body) = document
        .root_element()
        .children()
        .filter_map(ElementRef::wrap)
        .find(|e| e.value().name() == "body")
    else {
        return String::new();
    };

    let mut out = String::new();
    for child in body.children() {
        match child.value() {
            Node::Text(text) => out.push_str(&escape_text(text.trim())),
            Node::Element(_) => {
                if let Some(element) = ElementRef::wrap(child)
                    && let Some(rendered) = render_element(element)
                {
                    out.push_str(&rendered);
                }
            }
            _ => {}
        }
    }

    WHITESPACE.replace_all(&out, " ").trim().to_string()
}

/// Render an element without attributes, or `None` when it is dropped or empty.
///
/// Bottom-up: an element survives if it is `br`/`hr`, has a surviving child
/// element, or has non-whitespace text of its own.
fn render_element(element: ElementRef<'_>) -> Option<String> {
    let name = element.value().name();
    if DROPPED_TAGS.contains(&name) {
        return None;
    }

    let preformatted = PREFORMATTED.contains(&name);
    let mut inner = String::new();
    let mut has_child = false;
    let mut has_text = false;

    for child in element.children() {
        match child.value() {
            Node::Text(text) => {
                let raw: &str = text;
                let text = if preformatted { raw } else { raw.trim() };
                has_text |= !text.trim().is_empty();
                inner.push_str(&escape_text(text));
            }
            Node::Element(_) => {
                if let Some(rendered) = ElementRef::wrap(child).and_then(render_element) {
                    has_child = true;
                    inner.push_str(&rendered);
                }
            }
            _ => {}
        }
    }

    if VOID_KEPT.contains(&name) {
        return Some(format!("<{name}/>"));
    }
    if !has_child && !has_text {
        return None;
    }
    Some(format!("<{name}>{inner}</{name}>"))
}

fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

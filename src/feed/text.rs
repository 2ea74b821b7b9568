//! Text extraction for feed-supplied text constructs.
//!
//! feed-rs has already decoded the XML layer, so plain-text content is used
//! as-is. Only HTML content goes through markup removal.

use feed_rs::model::Text;
use quick_xml::escape::{resolve_predefined_entity, unescape_with};

/// Text of a construct, with markup removed when it is HTML.
///
/// Returns `None` when nothing but whitespace is left.
pub fn readable_text(text: &Text) -> Option<String> {
    let content = if is_html(text) {
        html_to_text(&text.content)
    } else {
        text.content.clone()
    };

    if content.trim().is_empty() {
        None
    } else {
        Some(content)
    }
}

/// Atom `type="html"` and `type="xhtml"` both arrive as `text/html`.
fn is_html(text: &Text) -> bool {
    text.content_type.subty() == "html"
}

/// Drops every tag from an HTML fragment and decodes its entities.
///
/// Script and style bodies are removed with their tags. Whitespace is left
/// for the status composer to collapse.
pub fn html_to_text(html: &str) -> String {
    // Tags separate words: "<p>a</p><p>b</p>" reads as "a b"
    let spaced = html.replace('<', " <");
    let cleaned = ammonia::Builder::empty().clean(&spaced).to_string();

    // The sanitiser re-escapes the text it emits
    unescape_with(&cleaned, resolve_entity)
        .map(|text| text.into_owned())
        .unwrap_or(cleaned)
}

fn resolve_entity(name: &str) -> Option<&'static str> {
    match name {
        "nbsp" => Some("\u{a0}"),
        _ => resolve_predefined_entity(name),
    }
}

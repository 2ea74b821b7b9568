use std::collections::btree_map::{BTreeMap, Entry as MapEntry};

use feed_rs::model::{self, FeedType};
use feed_rs::parser;

use super::text::readable_text;
use super::types::{Feed, FeedEntry, FeedError};

/// Parses a raw RSS/Atom document into a [`Feed`].
///
/// `source` is the URI the document was loaded from. It is the last-resort
/// feed identity when the document carries neither an Atom `<id>` nor a
/// feed-level link.
///
/// # Errors
///
/// - [`FeedError::Parse`] if the bytes are not a recognizable feed
/// - [`FeedError::Schema`] if the feed identity, feed title, or any entry's
///   id, link or title is missing
pub fn parse_feed(bytes: &[u8], source: &str) -> Result<Feed, FeedError> {
    // Entries without an id must fail schema validation rather than receive
    // a generated one, so the id generator always yields an empty string.
    let parsed = parser::Builder::new()
        .id_generator(|_links, _title, _uri| String::new())
        .build()
        .parse(bytes)
        .map_err(|e| FeedError::Parse(e.to_string()))?;

    let version = version_string(&parsed.feed_type);
    let format = format_tag(version);

    let id = feed_identity(&parsed, source)?;
    let title = text_content(parsed.title.as_ref())
        .ok_or_else(|| FeedError::Schema(format!("feed '{}' has no title", id)))?;

    let mut entries = BTreeMap::new();
    for entry in parsed.entries {
        let entry = convert_entry(entry, &format, &id)?;
        match entries.entry(entry.id.clone()) {
            MapEntry::Vacant(slot) => {
                slot.insert(entry);
            }
            MapEntry::Occupied(_) => {
                tracing::warn!(
                    feed = %id,
                    entry = %entry.id,
                    "Duplicate entry id in feed, keeping first occurrence"
                );
            }
        }
    }

    tracing::debug!(
        feed = %id,
        format = %format,
        entries = entries.len(),
        "Parsed feed"
    );

    Ok(Feed {
        id,
        title,
        version,
        format,
        entries,
    })
}

/// Version string for a parsed feed type, in the conventional
/// `<family><version>` spelling (`atom10`, `rss20`, ...).
fn version_string(feed_type: &FeedType) -> &'static str {
    match feed_type {
        FeedType::Atom => "atom10",
        FeedType::RSS0 => "rss09",
        FeedType::RSS1 => "rss10",
        FeedType::RSS2 => "rss20",
        FeedType::JSON => "json11",
    }
}

/// Lower-cases a version string and strips its digits: `"Atom10"` → `"atom"`.
pub fn format_tag(version: &str) -> String {
    version
        .chars()
        .filter(|c| !c.is_ascii_digit())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Resolves the feed identity: Atom `<id>`, then feed-level link, then the
/// source URI.
fn feed_identity(feed: &model::Feed, source: &str) -> Result<String, FeedError> {
    let atom_id = match feed.feed_type {
        FeedType::Atom => non_empty(&feed.id),
        _ => None,
    };

    atom_id
        .or_else(|| feed.links.iter().find_map(|l| non_empty(&l.href)))
        .or_else(|| non_empty(source))
        .ok_or_else(|| FeedError::Schema("feed has no id, link, or source URI".to_string()))
}

fn convert_entry(entry: model::Entry, format: &str, feed_id: &str) -> Result<FeedEntry, FeedError> {
    let id = entry_id(entry.id.clone())
        .ok_or_else(|| FeedError::Schema(format!("entry in feed '{}' has no id", feed_id)))?;

    let link = preferred_link(&entry.links).ok_or_else(|| {
        FeedError::Schema(format!("entry '{}' in feed '{}' has no link", id, feed_id))
    })?;

    let title = text_content(entry.title.as_ref()).ok_or_else(|| {
        FeedError::Schema(format!("entry '{}' in feed '{}' has no title", id, feed_id))
    })?;

    let summary = if format == "atom" {
        entry
            .summary
            .as_ref()
            .and_then(readable_text)
            .or_else(|| entry.content.and_then(content_text))
    } else {
        None
    };

    Ok(FeedEntry {
        id,
        link,
        title,
        summary,
        tooted: false,
    })
}

/// Picks the entry's alternate link (no `rel` or `rel="alternate"`), falling
/// back to the first link with a non-empty href.
fn preferred_link(links: &[model::Link]) -> Option<String> {
    links
        .iter()
        .filter(|l| matches!(l.rel.as_deref(), None | Some("alternate")))
        .chain(links.iter())
        .find_map(|l| non_empty(&l.href))
}

/// Entry ids are the cache sort key and are kept exactly as supplied; only
/// a blank id is rejected.
fn entry_id(id: String) -> Option<String> {
    if id.trim().is_empty() {
        None
    } else {
        Some(id)
    }
}

/// Inline `<content>` body, read with the same typing rules as a summary.
fn content_text(content: model::Content) -> Option<String> {
    let body = content.body?;
    readable_text(&model::Text {
        content_type: content.content_type,
        src: None,
        content: body,
    })
}

fn text_content(text: Option<&model::Text>) -> Option<String> {
    text.and_then(|t| non_empty(&t.content))
}

fn non_empty(s: &str) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

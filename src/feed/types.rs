use std::collections::BTreeMap;
use thiserror::Error;

use super::fetcher::FetchError;

// ============================================================================
// Error Types
// ============================================================================

/// Errors raised while loading a feed. All of them abort a run before any
/// entry is examined.
#[derive(Debug, Error)]
pub enum FeedError {
    /// The document could not be retrieved
    #[error("Failed to fetch feed: {0}")]
    Fetch(#[from] FetchError),
    /// The document is not a parseable RSS/Atom feed
    #[error("Parse error: {0}")]
    Parse(String),
    /// The document parsed but a required field is missing
    #[error("Schema error: {0}")]
    Schema(String),
}

// ============================================================================
// Data Structures
// ============================================================================

/// A parsed feed. Built once per run and only ever shared by reference.
#[derive(Debug, Clone)]
pub struct Feed {
    /// Feed identity, used as the cache partition key
    pub id: String,
    pub title: String,
    /// Version string, e.g. `atom10` or `rss20`
    pub version: &'static str,
    /// Version with digits stripped, e.g. `atom` or `rss`
    pub format: String,
    /// Entries keyed by entry id; iterates in ascending id order
    pub entries: BTreeMap<String, FeedEntry>,
}

/// A single feed item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedEntry {
    /// Feed-supplied id, used verbatim as the cache sort key
    pub id: String,
    pub link: String,
    pub title: String,
    /// Only populated for Atom feeds
    pub summary: Option<String>,
    /// Placeholder set at parse time. The cache is authoritative.
    pub tooted: bool,
}

//! Feed loading and parsing for RSS/Atom documents.
//!
//! - [`parse_feed`] turns raw bytes into a [`Feed`] using the `feed-rs` crate,
//!   enforcing that every required field is present
//! - [`FeedFetcher`] is the fetch capability; [`HttpFetcher`] serves
//!   `http(s)://` URLs, `file://` URIs, and plain filesystem paths
//! - [`load`] combines the two
//!
//! # Example
//!
//! ```ignore
//! use feedtoot::feed::{load, HttpFetcher};
//!
//! let feed = load(&HttpFetcher::default(), "https://your.blog/index.xml").await?;
//! for entry in feed.entries.values() {
//!     println!("{} {}", entry.id, entry.title);
//! }
//! ```

mod fetcher;
mod parser;
mod text;
mod types;

pub use fetcher::{load, FeedFetcher, FetchError, HttpFetcher};
pub use parser::{format_tag, parse_feed};
pub use types::{Feed, FeedEntry, FeedError};

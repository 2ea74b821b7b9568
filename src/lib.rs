//! Toots new entries of an RSS/Atom feed to Mastodon, once each.
//!
//! A run loads the feed ([`feed`]), then for every entry consults the feed
//! cache ([`storage`]) and either skips it, posts it ([`publish`]) and
//! records it, or only records it. The cache is the single source of truth
//! for what has been posted, which makes runs safe to repeat.
//!
//! Running two instances against the same feed at the same time is not
//! supported: cache writes are unconditional, so the deployment must make
//! sure runs do not overlap.

pub mod config;
pub mod feed;
pub mod logging;
pub mod publish;
pub mod reconcile;
pub mod storage;

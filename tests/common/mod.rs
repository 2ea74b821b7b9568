//! Shared test doubles for the fetch, store and publish capabilities.
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use feedtoot::feed::{FeedFetcher, FetchError};
use feedtoot::publish::{PublishError, PublishReceipt, Publisher, Visibility};
use feedtoot::storage::{CacheRecord, CacheStore, SqliteCacheStore, StoreError, TableSpec};

/// Fresh in-memory SQLite cache with its table created.
pub async fn memory_store() -> SqliteCacheStore {
    let store = SqliteCacheStore::open(":memory:", TableSpec::default())
        .await
        .unwrap();
    store.ensure_schema(true).await.unwrap();
    store
}

/// Serves a fixed document for every URI.
pub struct StaticFetcher {
    pub body: String,
}

impl StaticFetcher {
    pub fn new(body: impl Into<String>) -> Self {
        Self { body: body.into() }
    }
}

#[async_trait]
impl FeedFetcher for StaticFetcher {
    async fn fetch(&self, _uri: &str) -> Result<Vec<u8>, FetchError> {
        Ok(self.body.clone().into_bytes())
    }
}

/// Wraps a store and counts calls.
pub struct CountingStore<S> {
    pub inner: S,
    pub gets: AtomicUsize,
    pub puts: AtomicUsize,
    /// Fail every `put` once this many have succeeded
    pub fail_puts_after: Option<usize>,
}

impl<S> CountingStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            gets: AtomicUsize::new(0),
            puts: AtomicUsize::new(0),
            fail_puts_after: None,
        }
    }

    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn puts(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<S: CacheStore> CacheStore for CountingStore<S> {
    async fn get(&self, feed: &str, entry_id: &str) -> Result<Option<CacheRecord>, StoreError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get(feed, entry_id).await
    }

    async fn put(&self, record: &CacheRecord) -> Result<(), StoreError> {
        if let Some(limit) = self.fail_puts_after {
            if self.puts() >= limit {
                return Err(StoreError::Unavailable(sqlx::Error::PoolTimedOut));
            }
        }
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.inner.put(record).await
    }
}

/// Plain map-backed store, for tests that only care about final state.
#[derive(Default)]
pub struct MapStore {
    pub records: Mutex<BTreeMap<(String, String), CacheRecord>>,
}

impl MapStore {
    pub fn snapshot(&self) -> Vec<CacheRecord> {
        self.records.lock().unwrap().values().cloned().collect()
    }
}

#[async_trait]
impl CacheStore for MapStore {
    async fn get(&self, feed: &str, entry_id: &str) -> Result<Option<CacheRecord>, StoreError> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .get(&(feed.to_string(), entry_id.to_string()))
            .cloned())
    }

    async fn put(&self, record: &CacheRecord) -> Result<(), StoreError> {
        self.records.lock().unwrap().insert(
            (record.feed.clone(), record.entry_id.clone()),
            record.clone(),
        );
        Ok(())
    }
}

/// Records every status it is asked to post. Texts containing any of the
/// `fail_on` markers are rejected.
#[derive(Default)]
pub struct RecordingPublisher {
    pub sent: Mutex<Vec<(String, Visibility)>>,
    pub fail_on: HashSet<String>,
    next_id: AtomicUsize,
}

impl RecordingPublisher {
    pub fn failing_on(markers: &[&str]) -> Self {
        Self {
            fail_on: markers.iter().map(|m| m.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn texts(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(t, _)| t.clone())
            .collect()
    }

    pub fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(
        &self,
        text: &str,
        visibility: Visibility,
    ) -> Result<PublishReceipt, PublishError> {
        self.sent
            .lock()
            .unwrap()
            .push((text.to_string(), visibility));

        if self.fail_on.iter().any(|m| text.contains(m.as_str())) {
            return Err(PublishError::HttpStatus(503));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        Ok(PublishReceipt {
            id: id.to_string(),
            url: None,
        })
    }
}

/// RSS document whose items are `(guid, title, link)` triples.
pub fn rss_feed(link: &str, items: &[(&str, &str, &str)]) -> String {
    let items: String = items
        .iter()
        .map(|(guid, title, link)| {
            format!(
                "<item><guid>{}</guid><title>{}</title><link>{}</link></item>",
                guid, title, link
            )
        })
        .collect();
    format!(
        r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>Test Feed</title><link>{}</link>{}</channel></rss>"#,
        link, items
    )
}

/// Count how often each entry title appears across the sent texts.
pub fn title_counts(texts: &[String], titles: &[&str]) -> HashMap<String, usize> {
    titles
        .iter()
        .map(|t| {
            let quoted = format!("\"{}\"", t);
            (t.to_string(), texts.iter().filter(|s| s.contains(&quoted)).count())
        })
        .collect()
}

//! Per-entry reconciliation between a feed and the feed cache.
//!
//! For every entry, in ascending entry-id order, the engine reads the cache
//! record, decides what to do, acts, and writes the result back. Entries are
//! independent: a run that stops halfway leaves finished entries recorded and
//! the rest untouched for the next run.
//!
//! | cache record          | mode       | action                         |
//! |-----------------------|------------|--------------------------------|
//! | absent / `tooted=false` | publish  | publish, then record `tooted`  |
//! | absent / `tooted=false` | cache-only | record `tooted`, no publish  |
//! | `tooted=true`         | any        | nothing (no publish, no write) |
//!
//! Cache-only mode marks entries `tooted` even though nothing was posted.
//! It exists to seed the cache when a feed is first onboarded so its back
//! catalogue is not posted.

use serde::Deserialize;
use thiserror::Error;

use crate::feed::{self, Feed, FeedEntry, FeedError, FeedFetcher};
use crate::publish::{compose_status, Publisher, Visibility};
use crate::storage::{CacheRecord, CacheStore, StoreError};

// ============================================================================
// Error Types
// ============================================================================

/// Errors that abort a run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Feed(#[from] FeedError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

// ============================================================================
// Run Configuration
// ============================================================================

/// Whether a run posts statuses or only seeds the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Publish,
    CacheOnly,
}

impl RunMode {
    pub fn from_cache_only(cache_only: bool) -> Self {
        if cache_only {
            RunMode::CacheOnly
        } else {
            RunMode::Publish
        }
    }
}

/// What to record after a publish attempt fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishFailurePolicy {
    /// Record the entry as tooted anyway; it will not be retried.
    #[default]
    MarkPosted,
    /// Leave the cache untouched so the next run tries again.
    RetryNextRun,
}

/// Outcome of the per-entry decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Already tooted; no publish and no write
    Skip,
    /// Publish the entry, then record it
    PublishThenRecord,
    /// Record the entry without publishing
    RecordOnly,
}

/// Decide what to do with one entry given its cache record.
pub fn decide(record: Option<&CacheRecord>, mode: RunMode) -> Decision {
    match record {
        Some(r) if r.tooted => Decision::Skip,
        _ => match mode {
            RunMode::Publish => Decision::PublishThenRecord,
            RunMode::CacheOnly => Decision::RecordOnly,
        },
    }
}

/// Counters accumulated over one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Entries examined
    pub processed: usize,
    /// Statuses actually posted
    pub posted: usize,
    /// Cache records written
    pub cached: usize,
    /// Publish attempts that failed
    pub failed: usize,
}

// ============================================================================
// Reconciler
// ============================================================================

/// Drives the read-decide-act-write cycle over a feed's entries.
pub struct Reconciler<'a, S: ?Sized, P: ?Sized> {
    store: &'a S,
    publisher: &'a P,
    visibility: Visibility,
    on_publish_failure: PublishFailurePolicy,
}

impl<'a, S, P> Reconciler<'a, S, P>
where
    S: CacheStore + ?Sized,
    P: Publisher + ?Sized,
{
    pub fn new(store: &'a S, publisher: &'a P) -> Self {
        Self {
            store,
            publisher,
            visibility: Visibility::default(),
            on_publish_failure: PublishFailurePolicy::default(),
        }
    }

    pub fn visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn on_publish_failure(mut self, policy: PublishFailurePolicy) -> Self {
        self.on_publish_failure = policy;
        self
    }

    /// Reconcile every entry of `feed`, in ascending entry-id order.
    ///
    /// # Errors
    ///
    /// A store failure aborts the run immediately. Entries handled before the
    /// failure keep their records. Publish failures never abort; they are
    /// logged and counted in [`RunSummary::failed`].
    pub async fn reconcile(&self, feed: &Feed, mode: RunMode) -> Result<RunSummary, StoreError> {
        let mut summary = RunSummary::default();

        tracing::info!(
            feed = %feed.id,
            title = %feed.title,
            entries = feed.entries.len(),
            mode = ?mode,
            "Reconciling feed"
        );

        // BTreeMap iteration is ascending by entry id
        for entry in feed.entries.values() {
            self.reconcile_entry(feed, entry, mode, &mut summary).await?;
        }

        tracing::info!(
            feed = %feed.id,
            processed = summary.processed,
            posted = summary.posted,
            cached = summary.cached,
            failed = summary.failed,
            "Feed reconciled"
        );

        Ok(summary)
    }

    async fn reconcile_entry(
        &self,
        feed: &Feed,
        entry: &FeedEntry,
        mode: RunMode,
        summary: &mut RunSummary,
    ) -> Result<(), StoreError> {
        summary.processed += 1;

        let record = self.store.get(&feed.id, &entry.id).await?;

        match decide(record.as_ref(), mode) {
            Decision::Skip => {
                tracing::debug!(feed = %feed.id, entry = %entry.id, "Already tooted, skipping");
            }
            Decision::RecordOnly => {
                tracing::debug!(feed = %feed.id, entry = %entry.id, "Cache-only: recording without posting");
                self.record(feed, entry, summary).await?;
            }
            Decision::PublishThenRecord => {
                let text = compose_status(
                    &feed.title,
                    &entry.title,
                    entry.summary.as_deref(),
                    &entry.link,
                );

                match self.publisher.publish(&text, self.visibility).await {
                    Ok(receipt) => {
                        summary.posted += 1;
                        tracing::info!(
                            feed = %feed.id,
                            entry = %entry.id,
                            status_id = %receipt.id,
                            "Tooted entry"
                        );
                        self.record(feed, entry, summary).await?;
                    }
                    Err(e) => {
                        summary.failed += 1;
                        match self.on_publish_failure {
                            PublishFailurePolicy::MarkPosted => {
                                tracing::warn!(
                                    feed = %feed.id,
                                    entry = %entry.id,
                                    error = %e,
                                    "Publish failed, marking entry tooted anyway"
                                );
                                self.record(feed, entry, summary).await?;
                            }
                            PublishFailurePolicy::RetryNextRun => {
                                tracing::warn!(
                                    feed = %feed.id,
                                    entry = %entry.id,
                                    error = %e,
                                    "Publish failed, leaving entry for the next run"
                                );
                            }
                        }
                    }
                }
            }
        }

        Ok(())
    }

    async fn record(
        &self,
        feed: &Feed,
        entry: &FeedEntry,
        summary: &mut RunSummary,
    ) -> Result<(), StoreError> {
        let record = CacheRecord {
            feed: feed.id.clone(),
            entry_id: entry.id.clone(),
            link: entry.link.clone(),
            title: entry.title.clone(),
            tooted: true,
        };
        self.store.put(&record).await?;
        summary.cached += 1;
        Ok(())
    }
}

// ============================================================================
// Pipeline
// ============================================================================

/// One feed source wired to its fetch, store and publish capabilities.
pub struct Pipeline<'a, F: ?Sized, S: ?Sized, P: ?Sized> {
    fetcher: &'a F,
    reconciler: Reconciler<'a, S, P>,
}

impl<'a, F, S, P> Pipeline<'a, F, S, P>
where
    F: FeedFetcher + ?Sized,
    S: CacheStore + ?Sized,
    P: Publisher + ?Sized,
{
    pub fn new(fetcher: &'a F, reconciler: Reconciler<'a, S, P>) -> Self {
        Self {
            fetcher,
            reconciler,
        }
    }

    /// Load the feed at `source` and reconcile it.
    ///
    /// # Errors
    ///
    /// Returns [`RunError::Feed`] if the feed cannot be fetched or parsed, in
    /// which case neither the store nor the publisher has been called, and
    /// [`RunError::Store`] if the cache fails mid-run.
    pub async fn run_once(&self, source: &str, mode: RunMode) -> Result<RunSummary, RunError> {
        let feed = feed::load(self.fetcher, source).await?;
        Ok(self.reconciler.reconcile(&feed, mode).await?)
    }
}

//! Integration tests for a full run: feed → cache → publish.
//!
//! Each test builds its own in-memory SQLite cache and a recording
//! publisher, so the exact sequence of posts and cache writes can be checked.

mod common;

use common::{
    memory_store, rss_feed, title_counts, CountingStore, MapStore, RecordingPublisher,
    StaticFetcher,
};
use feedtoot::feed::{parse_feed, FeedError};
use feedtoot::publish::Visibility;
use feedtoot::reconcile::{
    Pipeline, PublishFailurePolicy, Reconciler, RunError, RunMode, RunSummary,
};
use feedtoot::storage::{CacheRecord, CacheStore, StoreError};
use pretty_assertions::assert_eq;

const BLOG_ATOM: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <id>urn:feed:blog</id>
  <title>My Blog</title>
  <updated>2024-01-02T00:00:00Z</updated>
  <entry>
    <id>2024-e2</id>
    <title>Post Two</title>
    <link href="https://x/2"/>
    <updated>2024-01-02T00:00:00Z</updated>
  </entry>
  <entry>
    <id>2024-e1</id>
    <title>Post One</title>
    <link href="https://x/1"/>
    <updated>2024-01-01T00:00:00Z</updated>
  </entry>
</feed>"#;

const SOURCE: &str = "https://blog.example/atom.xml";

// ============================================================================
// Concrete Scenario
// ============================================================================

#[tokio::test]
async fn test_new_feed_posts_every_entry() {
    let store = CountingStore::new(memory_store().await);
    let publisher = RecordingPublisher::default();
    let fetcher = StaticFetcher::new(BLOG_ATOM);

    let summary = Pipeline::new(&fetcher, Reconciler::new(&store, &publisher))
        .run_once(SOURCE, RunMode::Publish)
        .await
        .unwrap();

    assert_eq!(
        summary,
        RunSummary {
            processed: 2,
            posted: 2,
            cached: 2,
            failed: 0,
        }
    );

    let texts = publisher.texts();
    assert_eq!(texts.len(), 2);
    assert!(texts[0].contains("Post One") && texts[0].contains("https://x/1"));
    assert!(texts[1].contains("Post Two") && texts[1].contains("https://x/2"));
    assert!(texts.iter().all(|t| t.contains("My Blog")));

    for (id, link, title) in [
        ("2024-e1", "https://x/1", "Post One"),
        ("2024-e2", "https://x/2", "Post Two"),
    ] {
        let rec = store.get("urn:feed:blog", id).await.unwrap().unwrap();
        assert_eq!(
            rec,
            CacheRecord {
                feed: "urn:feed:blog".to_string(),
                entry_id: id.to_string(),
                link: link.to_string(),
                title: title.to_string(),
                tooted: true,
            }
        );
    }
}

#[tokio::test]
async fn test_visibility_is_passed_through() {
    let store = memory_store().await;
    let publisher = RecordingPublisher::default();
    let feed = parse_feed(BLOG_ATOM.as_bytes(), SOURCE).unwrap();

    Reconciler::new(&store, &publisher)
        .visibility(Visibility::Direct)
        .reconcile(&feed, RunMode::Publish)
        .await
        .unwrap();

    let sent = publisher.sent.lock().unwrap();
    assert!(sent.iter().all(|(_, v)| *v == Visibility::Direct));
}

#[tokio::test]
async fn test_summaries_follow_their_declared_type() {
    let doc = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <id>urn:feed:math</id>
  <title>Math Notes</title>
  <updated>2024-01-02T00:00:00Z</updated>
  <entry>
    <id>m-1</id>
    <title>Math</title>
    <link href="https://x/1"/>
    <updated>2024-01-01T00:00:00Z</updated>
    <summary type="text">Why 1 &lt; 2 holds for every reader of this blog</summary>
  </entry>
  <entry>
    <id>m-2</id>
    <title>Markup</title>
    <link href="https://x/2"/>
    <updated>2024-01-02T00:00:00Z</updated>
    <summary type="html">&lt;p&gt;Proof &amp;amp; &lt;em&gt;counterexample&lt;/em&gt;&lt;/p&gt;</summary>
  </entry>
</feed>"#;

    let store = memory_store().await;
    let publisher = RecordingPublisher::default();
    Pipeline::new(&StaticFetcher::new(doc), Reconciler::new(&store, &publisher))
        .run_once(SOURCE, RunMode::Publish)
        .await
        .unwrap();

    let texts = publisher.texts();
    assert_eq!(
        texts[0],
        "I just published a new post on Math Notes. Check it out!\n\n\"Math\"\n\n\
         Why 1 < 2 holds for every reader of this blog\n\nhttps://x/1"
    );
    assert!(texts[1].contains("\n\nProof & counterexample\n\n"));
    assert!(!texts[1].contains('<'));
}

// ============================================================================
// Idempotency
// ============================================================================

#[tokio::test]
async fn test_second_run_posts_nothing() {
    let store = memory_store().await;
    let publisher = RecordingPublisher::default();
    let fetcher = StaticFetcher::new(BLOG_ATOM);
    let pipeline = Pipeline::new(&fetcher, Reconciler::new(&store, &publisher));

    pipeline.run_once(SOURCE, RunMode::Publish).await.unwrap();
    let first_run = publisher.texts();

    let second = pipeline.run_once(SOURCE, RunMode::Publish).await.unwrap();

    assert_eq!(second.processed, 2);
    assert_eq!(second.posted, 0);
    assert_eq!(second.cached, 0);
    assert_eq!(publisher.texts(), first_run);
}

#[tokio::test]
async fn test_new_entry_after_first_run_is_posted_alone() {
    let store = memory_store().await;
    let publisher = RecordingPublisher::default();

    let before = rss_feed("https://e/", &[("a-1", "First", "https://e/1")]);
    let after = rss_feed(
        "https://e/",
        &[("a-1", "First", "https://e/1"), ("a-2", "Second", "https://e/2")],
    );

    let reconciler = Reconciler::new(&store, &publisher);
    reconciler
        .reconcile(&parse_feed(before.as_bytes(), "src").unwrap(), RunMode::Publish)
        .await
        .unwrap();
    let summary = reconciler
        .reconcile(&parse_feed(after.as_bytes(), "src").unwrap(), RunMode::Publish)
        .await
        .unwrap();

    assert_eq!(summary.posted, 1);
    let counts = title_counts(&publisher.texts(), &["First", "Second"]);
    assert_eq!(counts["First"], 1);
    assert_eq!(counts["Second"], 1);
}

// ============================================================================
// Already-posted and Untooted Records
// ============================================================================

#[tokio::test]
async fn test_tooted_record_is_neither_posted_nor_rewritten() {
    let store = CountingStore::new(memory_store().await);
    store
        .inner
        .put(&CacheRecord {
            feed: "urn:feed:blog".to_string(),
            entry_id: "2024-e1".to_string(),
            link: "https://x/1".to_string(),
            title: "Post One".to_string(),
            tooted: true,
        })
        .await
        .unwrap();

    let publisher = RecordingPublisher::default();
    let feed = parse_feed(BLOG_ATOM.as_bytes(), SOURCE).unwrap();

    for mode in [RunMode::Publish, RunMode::CacheOnly] {
        Reconciler::new(&store, &publisher)
            .reconcile(&feed, mode)
            .await
            .unwrap();
    }

    // Only 2024-e2 was ever acted on: posted once, written once
    assert_eq!(publisher.count(), 1);
    assert!(publisher.texts()[0].contains("Post Two"));
    assert_eq!(store.puts(), 1);
}

#[tokio::test]
async fn test_untooted_record_is_posted() {
    let store = memory_store().await;
    store
        .put(&CacheRecord {
            feed: "urn:feed:blog".to_string(),
            entry_id: "2024-e1".to_string(),
            link: "https://x/1".to_string(),
            title: "Post One".to_string(),
            tooted: false,
        })
        .await
        .unwrap();

    let publisher = RecordingPublisher::default();
    let feed = parse_feed(BLOG_ATOM.as_bytes(), SOURCE).unwrap();
    let summary = Reconciler::new(&store, &publisher)
        .reconcile(&feed, RunMode::Publish)
        .await
        .unwrap();

    assert_eq!(summary.posted, 2);
    assert!(store.get("urn:feed:blog", "2024-e1").await.unwrap().unwrap().tooted);
}

// ============================================================================
// Cache-only Mode
// ============================================================================

#[tokio::test]
async fn test_cache_only_records_without_posting() {
    let store = memory_store().await;
    let publisher = RecordingPublisher::default();
    let fetcher = StaticFetcher::new(BLOG_ATOM);
    let pipeline = Pipeline::new(&fetcher, Reconciler::new(&store, &publisher));

    let summary = pipeline.run_once(SOURCE, RunMode::CacheOnly).await.unwrap();

    assert_eq!(
        summary,
        RunSummary {
            processed: 2,
            posted: 0,
            cached: 2,
            failed: 0,
        }
    );
    assert_eq!(publisher.count(), 0);
    for id in ["2024-e1", "2024-e2"] {
        assert!(store.get("urn:feed:blog", id).await.unwrap().unwrap().tooted);
    }

    // A normal run afterwards has nothing left to post
    let summary = pipeline.run_once(SOURCE, RunMode::Publish).await.unwrap();
    assert_eq!(summary.posted, 0);
    assert_eq!(publisher.count(), 0);
}

// ============================================================================
// Ordering
// ============================================================================

#[tokio::test]
async fn test_entries_posted_in_ascending_id_order() {
    let doc = rss_feed(
        "https://e/",
        &[
            ("b-2", "Bee", "https://e/b"),
            ("a-1", "Ay", "https://e/a"),
            ("c-3", "Cee", "https://e/c"),
        ],
    );
    let store = memory_store().await;
    let publisher = RecordingPublisher::default();
    let feed = parse_feed(doc.as_bytes(), "src").unwrap();

    Reconciler::new(&store, &publisher)
        .reconcile(&feed, RunMode::Publish)
        .await
        .unwrap();

    let links: Vec<String> = publisher
        .texts()
        .iter()
        .map(|t| t.lines().last().unwrap_or_default().to_string())
        .collect();
    assert_eq!(links, vec!["https://e/a", "https://e/b", "https://e/c"]);
}

// ============================================================================
// Failure Handling
// ============================================================================

#[tokio::test]
async fn test_malformed_feed_touches_nothing() {
    let store = CountingStore::new(MapStore::default());
    let publisher = RecordingPublisher::default();
    let fetcher = StaticFetcher::new("<not valid xml");

    let err = Pipeline::new(&fetcher, Reconciler::new(&store, &publisher))
        .run_once(SOURCE, RunMode::Publish)
        .await
        .unwrap_err();

    assert!(matches!(err, RunError::Feed(FeedError::Parse(_))));
    assert_eq!(store.gets(), 0);
    assert_eq!(store.puts(), 0);
    assert_eq!(publisher.count(), 0);
}

#[tokio::test]
async fn test_schema_error_touches_nothing() {
    let doc = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>T</title><link>https://e/</link>
  <item><guid>1</guid><title>Fine</title><link>https://e/1</link></item>
  <item><guid>2</guid><link>https://e/2</link></item>
</channel></rss>"#;
    let store = CountingStore::new(MapStore::default());
    let publisher = RecordingPublisher::default();
    let fetcher = StaticFetcher::new(doc);

    let err = Pipeline::new(&fetcher, Reconciler::new(&store, &publisher))
        .run_once(SOURCE, RunMode::Publish)
        .await
        .unwrap_err();

    assert!(matches!(err, RunError::Feed(FeedError::Schema(_))));
    assert_eq!(store.gets(), 0);
    assert_eq!(publisher.count(), 0);
}

#[tokio::test]
async fn test_publish_failure_marks_posted_by_default() {
    let store = memory_store().await;
    let publisher = RecordingPublisher::failing_on(&["Post One"]);
    let feed = parse_feed(BLOG_ATOM.as_bytes(), SOURCE).unwrap();

    let summary = Reconciler::new(&store, &publisher)
        .reconcile(&feed, RunMode::Publish)
        .await
        .unwrap();

    assert_eq!(
        summary,
        RunSummary {
            processed: 2,
            posted: 1,
            cached: 2,
            failed: 1,
        }
    );
    // The failed entry is recorded and will not be retried
    assert!(store.get("urn:feed:blog", "2024-e1").await.unwrap().unwrap().tooted);

    let again = Reconciler::new(&store, &publisher)
        .reconcile(&feed, RunMode::Publish)
        .await
        .unwrap();
    assert_eq!(again.posted + again.failed, 0);
}

#[tokio::test]
async fn test_publish_failure_retry_next_run_leaves_entry() {
    let store = memory_store().await;
    let failing = RecordingPublisher::failing_on(&["Post One"]);
    let feed = parse_feed(BLOG_ATOM.as_bytes(), SOURCE).unwrap();

    let summary = Reconciler::new(&store, &failing)
        .on_publish_failure(PublishFailurePolicy::RetryNextRun)
        .reconcile(&feed, RunMode::Publish)
        .await
        .unwrap();

    assert_eq!(summary.posted, 1);
    assert_eq!(summary.cached, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(store.get("urn:feed:blog", "2024-e1").await.unwrap(), None);

    // Next run with a healthy publisher picks up only the failed entry
    let healthy = RecordingPublisher::default();
    let retry = Reconciler::new(&store, &healthy)
        .on_publish_failure(PublishFailurePolicy::RetryNextRun)
        .reconcile(&feed, RunMode::Publish)
        .await
        .unwrap();
    assert_eq!(retry.posted, 1);
    assert!(healthy.texts()[0].contains("Post One"));
}

#[tokio::test]
async fn test_store_failure_aborts_and_keeps_earlier_records() {
    let doc = rss_feed(
        "https://e/",
        &[
            ("a-1", "Ay", "https://e/a"),
            ("b-2", "Bee", "https://e/b"),
            ("c-3", "Cee", "https://e/c"),
        ],
    );
    let feed = parse_feed(doc.as_bytes(), "src").unwrap();

    let mut store = CountingStore::new(memory_store().await);
    store.fail_puts_after = Some(1);
    let publisher = RecordingPublisher::default();

    let err = Reconciler::new(&store, &publisher)
        .reconcile(&feed, RunMode::Publish)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Unavailable(_)));

    // a-1 fully handled, b-2 posted but its write failed, c-3 never reached
    assert_eq!(publisher.count(), 2);
    assert!(store.inner.get("https://e/", "a-1").await.unwrap().unwrap().tooted);
    assert_eq!(store.inner.get("https://e/", "b-2").await.unwrap(), None);
    assert_eq!(store.inner.get("https://e/", "c-3").await.unwrap(), None);

    // A rerun with a healthy store finishes the rest
    let rerun = Reconciler::new(&store.inner, &publisher)
        .reconcile(&feed, RunMode::Publish)
        .await
        .unwrap();
    assert_eq!(rerun.posted, 2);
}

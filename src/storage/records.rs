use async_trait::async_trait;

use super::schema::SqliteCacheStore;
use super::types::{CacheRecord, CacheStore, StoreError};

/// Row type for record queries: (partition key, sort key, link, title, tooted)
type RecordRow = (String, String, String, String, bool);

fn record_from_row((feed, entry_id, link, title, tooted): RecordRow) -> CacheRecord {
    CacheRecord {
        feed,
        entry_id,
        link,
        title,
        tooted,
    }
}

#[async_trait]
impl CacheStore for SqliteCacheStore {
    async fn get(&self, feed: &str, entry_id: &str) -> Result<Option<CacheRecord>, StoreError> {
        let row: Option<RecordRow> = sqlx::query_as(&self.sql.select_one)
            .bind(feed)
            .bind(entry_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::from_sqlx)?;

        Ok(row.map(record_from_row))
    }

    async fn put(&self, record: &CacheRecord) -> Result<(), StoreError> {
        let now = chrono::Utc::now().timestamp();

        sqlx::query(&self.sql.upsert)
            .bind(&record.feed)
            .bind(&record.entry_id)
            .bind(&record.link)
            .bind(&record.title)
            .bind(record.tooted)
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(StoreError::from_sqlx)?;

        tracing::trace!(
            feed = %record.feed,
            entry = %record.entry_id,
            tooted = record.tooted,
            "Wrote cache record"
        );
        Ok(())
    }
}

impl SqliteCacheStore {
    /// All records for one feed, ordered by entry id.
    pub async fn scan(&self, feed: &str) -> Result<Vec<CacheRecord>, StoreError> {
        let rows: Vec<RecordRow> = sqlx::query_as(&self.sql.scan_feed)
            .bind(feed)
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::from_sqlx)?;

        Ok(rows.into_iter().map(record_from_row).collect())
    }
}

use async_trait::async_trait;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Feed cache errors. Every variant is fatal for the current run.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store could not be reached or rejected the request
    #[error("Feed cache unavailable: {0}")]
    Unavailable(#[source] sqlx::Error),

    /// Another process holds the cache database lock
    #[error("Feed cache is locked by another process. Is another run in progress?")]
    Locked,

    /// The cache table does not exist and creating it was not allowed
    #[error("Feed cache table '{table}' does not exist (enable create_if_missing to create it)")]
    Missing { table: String },

    /// A configured table or key name cannot be used as an identifier
    #[error("Invalid feed cache identifier: {0}")]
    InvalidIdentifier(String),
}

impl StoreError {
    /// Classify a sqlx error, separating lock contention from other failures.
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        let error_string = err.to_string().to_lowercase();

        // SQLITE_BUSY (5): database is locked
        // SQLITE_LOCKED (6): database table is locked
        if error_string.contains("database is locked")
            || error_string.contains("database table is locked")
            || error_string.contains("sqlite_busy")
            || error_string.contains("sqlite_locked")
        {
            return StoreError::Locked;
        }

        StoreError::Unavailable(err)
    }
}

// ============================================================================
// Data Structures
// ============================================================================

/// One row of the dedup ledger, keyed by (feed identity, entry id).
///
/// Presence means the entry has been examined; `tooted` means a publish
/// attempt completed and must not be repeated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheRecord {
    /// Partition key: the feed identity
    pub feed: String,
    /// Sort key: the entry id
    pub entry_id: String,
    pub link: String,
    pub title: String,
    pub tooted: bool,
}

/// Names of the backing table and its composite key columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSpec {
    pub table_name: String,
    pub partition_key: String,
    pub sort_key: String,
}

impl Default for TableSpec {
    fn default() -> Self {
        Self {
            table_name: "blog-feed-cache".to_string(),
            partition_key: "feed".to_string(),
            sort_key: "item_id".to_string(),
        }
    }
}

// ============================================================================
// Store Capability
// ============================================================================

/// Durable key-value store of [`CacheRecord`]s.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Point lookup. `Ok(None)` means the entry has never been seen.
    async fn get(&self, feed: &str, entry_id: &str) -> Result<Option<CacheRecord>, StoreError>;

    /// Create or unconditionally overwrite a record.
    async fn put(&self, record: &CacheRecord) -> Result<(), StoreError>;
}

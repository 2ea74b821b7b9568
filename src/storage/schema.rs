use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;

use super::types::{StoreError, TableSpec};

/// Attempts made while waiting for a freshly created table to appear.
const READY_POLL_ATTEMPTS: u32 = 10;
const READY_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Columns every cache table carries besides its two key columns.
const VALUE_COLUMNS: [&str; 4] = ["link", "title", "tooted", "recorded_at"];

// ============================================================================
// SqliteCacheStore
// ============================================================================

/// Feed cache persisted in a SQLite table with a composite
/// (partition key, sort key) primary key.
#[derive(Clone)]
pub struct SqliteCacheStore {
    pub(crate) pool: SqlitePool,
    pub(crate) spec: TableSpec,
    pub(crate) sql: Arc<Statements>,
    schema_ready: Arc<OnceCell<()>>,
}

/// SQL text specialised for the configured table and key names.
pub(crate) struct Statements {
    pub(crate) select_one: String,
    pub(crate) upsert: String,
    pub(crate) scan_feed: String,
    create_table: String,
}

impl Statements {
    fn new(spec: &TableSpec) -> Self {
        let table = quote(&spec.table_name);
        let pk = quote(&spec.partition_key);
        let sk = quote(&spec.sort_key);

        Self {
            select_one: format!(
                "SELECT {pk}, {sk}, link, title, tooted FROM {table} WHERE {pk} = ? AND {sk} = ?"
            ),
            upsert: format!(
                "INSERT OR REPLACE INTO {table} ({pk}, {sk}, link, title, tooted, recorded_at) \
                 VALUES (?, ?, ?, ?, ?, ?)"
            ),
            scan_feed: format!(
                "SELECT {pk}, {sk}, link, title, tooted FROM {table} WHERE {pk} = ? ORDER BY {sk}"
            ),
            create_table: format!(
                r#"
                CREATE TABLE IF NOT EXISTS {table} (
                    {pk} TEXT NOT NULL,
                    {sk} TEXT NOT NULL,
                    link TEXT NOT NULL,
                    title TEXT NOT NULL,
                    tooted INTEGER NOT NULL DEFAULT 0,
                    recorded_at INTEGER NOT NULL,
                    PRIMARY KEY ({pk}, {sk})
                )
            "#
            ),
        }
    }
}

impl SqliteCacheStore {
    /// Open the cache database at `path` (`:memory:` for an ephemeral store).
    ///
    /// Does not touch the table; call [`ensure_schema`](Self::ensure_schema)
    /// before the first read or write.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::InvalidIdentifier` if a table or key name is
    /// unusable, `StoreError::Locked` if another process holds the database,
    /// and `StoreError::Unavailable` for any other connection failure.
    pub async fn open(path: &str, spec: TableSpec) -> Result<Self, StoreError> {
        validate_spec(&spec)?;

        let url = format!("sqlite:{}?mode=rwc", path);

        // busy_timeout=5000: wait up to 5 seconds for a competing writer before SQLITE_BUSY
        let options = SqliteConnectOptions::from_str(&url)
            .map_err(StoreError::from_sqlx)?
            .pragma("busy_timeout", "5000");

        // Every connection to ":memory:" is a separate database, so an
        // in-memory store must stay on one connection.
        let max_connections = if path == ":memory:" { 1 } else { 2 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(StoreError::from_sqlx)?;

        tracing::debug!(path = %path, table = %spec.table_name, "Opened feed cache");

        Ok(Self {
            pool,
            sql: Arc::new(Statements::new(&spec)),
            spec,
            schema_ready: Arc::new(OnceCell::new()),
        })
    }

    /// Names of the backing table and key columns.
    pub fn table_spec(&self) -> &TableSpec {
        &self.spec
    }

    /// Make sure the cache table exists.
    ///
    /// When the table is missing it is created if `create_if_missing` is set,
    /// after which this waits until the table is visible. The check runs at
    /// most once per store; later calls return immediately.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Missing` when the table is absent and
    /// `create_if_missing` is false, or when a created table never appears.
    pub async fn ensure_schema(&self, create_if_missing: bool) -> Result<(), StoreError> {
        self.schema_ready
            .get_or_try_init(|| self.provision(create_if_missing))
            .await
            .map(|_| ())
    }

    async fn provision(&self, create_if_missing: bool) -> Result<(), StoreError> {
        let table = &self.spec.table_name;

        if self.table_exists().await? {
            tracing::debug!(table = %table, "Feed cache table present");
            return Ok(());
        }

        if !create_if_missing {
            tracing::error!(table = %table, "Feed cache table missing and creation disabled");
            return Err(StoreError::Missing {
                table: table.clone(),
            });
        }

        tracing::info!(table = %table, "Creating feed cache table");
        sqlx::query(&self.sql.create_table)
            .execute(&self.pool)
            .await
            .map_err(StoreError::from_sqlx)?;

        for attempt in 1..=READY_POLL_ATTEMPTS {
            if self.table_exists().await? {
                tracing::info!(table = %table, attempt, "Feed cache table ready");
                return Ok(());
            }
            tokio::time::sleep(READY_POLL_INTERVAL).await;
        }

        Err(StoreError::Missing {
            table: table.clone(),
        })
    }

    async fn table_exists(&self) -> Result<bool, StoreError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?")
                .bind(&self.spec.table_name)
                .fetch_optional(&self.pool)
                .await
                .map_err(StoreError::from_sqlx)?;
        Ok(row.is_some())
    }
}

// ============================================================================
// Identifier Handling
// ============================================================================

fn validate_spec(spec: &TableSpec) -> Result<(), StoreError> {
    for name in [&spec.table_name, &spec.partition_key, &spec.sort_key] {
        validate_identifier(name)?;
    }

    if spec.partition_key == spec.sort_key {
        return Err(StoreError::InvalidIdentifier(format!(
            "partition key and sort key are both '{}'",
            spec.partition_key
        )));
    }

    for key in [&spec.partition_key, &spec.sort_key] {
        if VALUE_COLUMNS.contains(&key.as_str()) {
            return Err(StoreError::InvalidIdentifier(format!(
                "key name '{}' collides with a value column",
                key
            )));
        }
    }

    Ok(())
}

/// Accepts ASCII letters, digits, `_` and `-`, starting with a letter or `_`.
fn validate_identifier(name: &str) -> Result<(), StoreError> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');

    if valid_start && valid_rest && !name.starts_with("sqlite_") {
        Ok(())
    } else {
        Err(StoreError::InvalidIdentifier(name.to_string()))
    }
}

fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier)
}

//! Configuration file parser for ~/.config/feedtoot/config.toml.
//!
//! The config file is optional: a missing file yields `Config::default()`,
//! and command-line flags (or their environment variables) fill in or
//! override any value. Unknown keys are accepted but logged as warnings.
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

use crate::publish::Visibility;
use crate::reconcile::PublishFailurePolicy;
use crate::storage::TableSpec;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file too large: {0}")]
    TooLarge(String),

    /// A value required for the requested run is missing or unusable
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// URL (or local path) of the RSS/Atom feed to watch.
    pub feed_url: Option<String>,

    /// Record entries as tooted without posting them.
    pub cache_only: bool,

    /// What to record when posting an entry fails.
    pub on_publish_failure: PublishFailurePolicy,

    pub cache: CacheConfig,

    pub mastodon: MastodonConfig,
}

/// `[cache]` section: where the dedup ledger lives.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// SQLite database path.
    pub database: String,
    pub table_name: String,
    /// Partition key column (holds the feed identity).
    pub partition_key: String,
    /// Sort key column (holds the entry id).
    pub sort_key: String,
    /// Create the cache table when it does not exist.
    pub create_if_missing: bool,
}

/// `[mastodon]` section.
///
/// Custom Debug impl masks `access_token`.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct MastodonConfig {
    pub base_url: String,
    pub access_token: Option<String>,
    /// One of direct, private, unlisted, public. Use direct while testing.
    pub visibility: Visibility,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            feed_url: None,
            cache_only: false,
            on_publish_failure: PublishFailurePolicy::MarkPosted,
            cache: CacheConfig::default(),
            mastodon: MastodonConfig::default(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        let spec = TableSpec::default();
        Self {
            database: "feedtoot.db".to_string(),
            table_name: spec.table_name,
            partition_key: spec.partition_key,
            sort_key: spec.sort_key,
            create_if_missing: false,
        }
    }
}

impl Default for MastodonConfig {
    fn default() -> Self {
        Self {
            base_url: "https://mastodon.social".to_string(),
            access_token: None,
            visibility: Visibility::Public,
        }
    }
}

impl std::fmt::Debug for MastodonConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MastodonConfig")
            .field("base_url", &self.base_url)
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("visibility", &self.visibility)
            .finish()
    }
}

impl CacheConfig {
    pub fn table_spec(&self) -> TableSpec {
        TableSpec {
            table_name: self.table_name.clone(),
            partition_key: self.partition_key.clone(),
            sort_key: self.sort_key.clone(),
        }
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // File deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            warn_unknown_keys(&raw);
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Check that everything the run needs is present.
    ///
    /// The feed URL is always required; an access token only when the run
    /// will actually post.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.feed_url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => {}
            _ => {
                return Err(ConfigError::Invalid(
                    "no feed URL configured (set feed_url or pass --feed-url)".to_string(),
                ))
            }
        }

        if !self.cache_only {
            match self.mastodon.access_token.as_deref().map(str::trim) {
                Some(token) if !token.is_empty() => {}
                _ => {
                    return Err(ConfigError::Invalid(
                        "no Mastodon access token configured (required unless cache_only)"
                            .to_string(),
                    ))
                }
            }
        }

        if self.cache.database.trim().is_empty() {
            return Err(ConfigError::Invalid("cache database path is empty".to_string()));
        }

        Ok(())
    }
}

fn warn_unknown_keys(raw: &toml::Table) {
    const TOP_LEVEL: [&str; 5] = [
        "feed_url",
        "cache_only",
        "on_publish_failure",
        "cache",
        "mastodon",
    ];
    const CACHE: [&str; 5] = [
        "database",
        "table_name",
        "partition_key",
        "sort_key",
        "create_if_missing",
    ];
    const MASTODON: [&str; 3] = ["base_url", "access_token", "visibility"];

    for (key, value) in raw {
        let known_children: Option<&[&str]> = match key.as_str() {
            "cache" => Some(&CACHE),
            "mastodon" => Some(&MASTODON),
            _ => None,
        };

        if !TOP_LEVEL.contains(&key.as_str()) {
            tracing::warn!(key = %key, "Unknown key in config file, ignoring");
            continue;
        }

        if let (Some(children), Some(table)) = (known_children, value.as_table()) {
            for child in table.keys() {
                if !children.contains(&child.as_str()) {
                    tracing::warn!(key = %format!("{}.{}", key, child), "Unknown key in config file, ignoring");
                }
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

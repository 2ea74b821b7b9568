use anyhow::{Context, Result};
use clap::Parser;
use secrecy::SecretString;
use std::path::PathBuf;

use feedtoot::config::Config;
use feedtoot::feed::HttpFetcher;
use feedtoot::logging::{self, Verbosity};
use feedtoot::publish::{MastodonPublisher, Publisher, PublishError, PublishReceipt, Visibility};
use feedtoot::reconcile::{Pipeline, Reconciler, RunMode, RunSummary};
use feedtoot::storage::{SqliteCacheStore, StoreError};

/// Get the default config file path (~/.config/feedtoot/config.toml)
fn default_config_path() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home)
        .join(".config")
        .join("feedtoot")
        .join("config.toml"))
}

#[derive(Parser, Debug)]
#[command(
    name = "feedtoot",
    about = "Toot new RSS/Atom feed entries to Mastodon"
)]
struct Args {
    /// Config file (default: ~/.config/feedtoot/config.toml)
    #[arg(long, value_name = "FILE", env = "FEEDTOOT_CONFIG")]
    config: Option<PathBuf>,

    /// URL or path of the feed to watch
    #[arg(long, value_name = "URL", env = "FEED_URL")]
    feed_url: Option<String>,

    /// Record entries as tooted without posting (seed the cache for a new feed)
    #[arg(long)]
    cache_only: bool,

    /// Create the cache table if it does not exist
    #[arg(long)]
    create_table: bool,

    /// SQLite file holding the feed cache
    #[arg(long, value_name = "FILE", env = "FEEDTOOT_DATABASE")]
    database: Option<String>,

    /// Base URL of the Mastodon instance
    #[arg(long, value_name = "URL", env = "MASTODON_BASE_URL")]
    mastodon_base_url: Option<String>,

    /// Mastodon API access token
    #[arg(long, value_name = "TOKEN", env = "MASTODON_ACCESS_TOKEN", hide_env_values = true)]
    mastodon_access_token: Option<String>,

    /// Status visibility: direct, private, unlisted or public
    #[arg(long, value_name = "LEVEL", env = "MASTODON_STATUS_VISIBILITY")]
    visibility: Option<Visibility>,

    /// Print cached records for the feed and exit
    #[arg(long)]
    list_cache: bool,

    /// Only log errors
    #[arg(short, long)]
    quiet: bool,

    /// Log per-entry detail
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    /// Overlay command-line (and environment) values onto the file config.
    fn apply(self, config: &mut Config) {
        if let Some(url) = self.feed_url {
            config.feed_url = Some(url);
        }
        if self.cache_only {
            config.cache_only = true;
        }
        if self.create_table {
            config.cache.create_if_missing = true;
        }
        if let Some(database) = self.database {
            config.cache.database = database;
        }
        if let Some(base_url) = self.mastodon_base_url {
            config.mastodon.base_url = base_url;
        }
        if let Some(token) = self.mastodon_access_token {
            config.mastodon.access_token = Some(token);
        }
        if let Some(visibility) = self.visibility {
            config.mastodon.visibility = visibility;
        }
    }
}

/// Stand-in publisher for cache-only runs, which never post.
struct NoPublisher;

#[async_trait::async_trait]
impl Publisher for NoPublisher {
    async fn publish(&self, _text: &str, _visibility: Visibility) -> Result<PublishReceipt, PublishError> {
        Err(PublishError::InvalidResponse(
            "publishing is disabled in cache-only mode".to_string(),
        ))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    logging::init(Verbosity::from_flags(args.quiet, args.verbose));

    let config_path = match &args.config {
        Some(path) => path.clone(),
        None => default_config_path()?,
    };
    let mut config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    let list_cache = args.list_cache;
    args.apply(&mut config);

    // Listing needs no credentials
    if list_cache {
        config.cache_only = true;
    }
    config.validate()?;

    let feed_url = config.feed_url.clone().unwrap_or_default();

    let store = match SqliteCacheStore::open(&config.cache.database, config.cache.table_spec()).await {
        Ok(store) => store,
        Err(StoreError::Locked) => {
            eprintln!("Error: the feed cache is locked. Another feedtoot run appears to be in progress.");
            std::process::exit(1);
        }
        Err(e) => return Err(e).context("Failed to open feed cache"),
    };
    store
        .ensure_schema(config.cache.create_if_missing)
        .await
        .context("Feed cache is not ready")?;

    let client = reqwest::Client::builder()
        .user_agent(concat!("feedtoot/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to create HTTP client")?;
    let fetcher = HttpFetcher::new(client.clone());

    if list_cache {
        let feed = feedtoot::feed::load(&fetcher, &feed_url)
            .await
            .context("Failed to load feed")?;
        let records = store.scan(&feed.id).await.context("Failed to read feed cache")?;
        for record in &records {
            println!(
                "{}\t{}\t{}",
                if record.tooted { "tooted" } else { "pending" },
                record.entry_id,
                record.title
            );
        }
        println!("{} cached entries for {}", records.len(), feed.id);
        return Ok(());
    }

    let mode = RunMode::from_cache_only(config.cache_only);

    let summary = match mode {
        RunMode::CacheOnly => run(&fetcher, &store, &NoPublisher, &config, &feed_url, mode).await?,
        RunMode::Publish => {
            let token = config.mastodon.access_token.clone().unwrap_or_default();
            let publisher =
                MastodonPublisher::new(client, &config.mastodon.base_url, SecretString::from(token))
                    .context("Invalid Mastodon settings")?;
            run(&fetcher, &store, &publisher, &config, &feed_url, mode).await?
        }
    };

    println!(
        "Processed {} entries: {} posted, {} cached{}",
        summary.processed,
        summary.posted,
        summary.cached,
        if summary.failed > 0 {
            format!(", {} failed to post", summary.failed)
        } else {
            String::new()
        }
    );
    Ok(())
}

async fn run<P: Publisher>(
    fetcher: &HttpFetcher,
    store: &SqliteCacheStore,
    publisher: &P,
    config: &Config,
    feed_url: &str,
    mode: RunMode,
) -> Result<RunSummary> {
    let reconciler = Reconciler::new(store, publisher)
        .visibility(config.mastodon.visibility)
        .on_publish_failure(config.on_publish_failure);

    Pipeline::new(fetcher, reconciler)
        .run_once(feed_url, mode)
        .await
        .with_context(|| format!("Run failed for {}", feed_url))
}

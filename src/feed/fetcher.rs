use async_trait::async_trait;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use super::parser::parse_feed;
use super::types::{Feed, FeedError};

const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors that can occur while retrieving a feed document.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Request exceeded the 30-second timeout
    #[error("Request timed out")]
    Timeout,
    /// Response body or feed file exceeded the 10MB size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
    /// A local feed file could not be read
    #[error("Failed to read '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    /// The source is neither a usable URL nor a file path
    #[error("Unsupported feed source: {0}")]
    UnsupportedSource(String),
}

/// Capability to retrieve a raw feed document.
#[async_trait]
pub trait FeedFetcher: Send + Sync {
    async fn fetch(&self, uri: &str) -> Result<Vec<u8>, FetchError>;
}

/// Fetches and parses the feed at `source` in a single call.
///
/// # Errors
///
/// - [`FeedError::Fetch`] if the document cannot be retrieved
/// - [`FeedError::Parse`] / [`FeedError::Schema`] from [`parse_feed`]
pub async fn load<F>(fetcher: &F, source: &str) -> Result<Feed, FeedError>
where
    F: FeedFetcher + ?Sized,
{
    let bytes = fetcher.fetch(source).await?;
    tracing::debug!(source = %source, bytes = bytes.len(), "Fetched feed document");
    parse_feed(&bytes, source)
}

/// Where a feed document lives.
#[derive(Debug, PartialEq, Eq)]
enum Source {
    Http(url::Url),
    File(PathBuf),
}

fn classify_source(uri: &str) -> Result<Source, FetchError> {
    match url::Url::parse(uri) {
        Ok(url) => match url.scheme() {
            "http" | "https" => Ok(Source::Http(url)),
            "file" => url
                .to_file_path()
                .map(Source::File)
                .map_err(|_| FetchError::UnsupportedSource(uri.to_string())),
            // Windows drive letters parse as a one-letter scheme
            s if s.len() == 1 => Ok(Source::File(PathBuf::from(uri))),
            _ => Err(FetchError::UnsupportedSource(uri.to_string())),
        },
        Err(url::ParseError::RelativeUrlWithoutBase) => Ok(Source::File(PathBuf::from(uri))),
        Err(_) => Err(FetchError::UnsupportedSource(uri.to_string())),
    }
}

/// Fetches feeds over HTTP(S), or from disk for `file://` URIs and plain paths.
#[derive(Clone, Default)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl FeedFetcher for HttpFetcher {
    async fn fetch(&self, uri: &str) -> Result<Vec<u8>, FetchError> {
        match classify_source(uri)? {
            Source::Http(url) => fetch_http(&self.client, url).await,
            Source::File(path) => read_limited_file(&path, MAX_FEED_SIZE).await,
        }
    }
}

async fn fetch_http(client: &reqwest::Client, url: url::Url) -> Result<Vec<u8>, FetchError> {
    let response = tokio::time::timeout(FETCH_TIMEOUT, client.get(url.clone()).send())
        .await
        .map_err(|_| FetchError::Timeout)?
        .map_err(FetchError::Network)?;

    if !response.status().is_success() {
        tracing::warn!(feed = %url, status = %response.status(), "Feed request failed");
        return Err(FetchError::HttpStatus(response.status().as_u16()));
    }

    read_limited_bytes(response, MAX_FEED_SIZE).await
}

async fn read_limited_file(path: &Path, limit: usize) -> Result<Vec<u8>, FetchError> {
    let io_error = |e: std::io::Error| FetchError::Io {
        path: path.display().to_string(),
        source: e,
    };

    let len = tokio::fs::metadata(path).await.map_err(io_error)?.len();
    if len > limit as u64 {
        tracing::warn!(path = %path.display(), bytes = len, "Feed file exceeds size limit");
        return Err(FetchError::ResponseTooLarge);
    }

    tokio::fs::read(path).await.map_err(io_error)
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    let expected_length = response.content_length();

    // Fast path: check Content-Length header
    if let Some(len) = expected_length {
        if len as usize > limit {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(FetchError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(FetchError::IncompleteResponse {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::Duration;

use super::types::{PublishError, PublishReceipt, Publisher, Visibility};

const PUBLISH_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Serialize)]
struct StatusRequest<'a> {
    status: &'a str,
    visibility: Visibility,
}

#[derive(Deserialize)]
struct StatusResponse {
    id: String,
    url: Option<String>,
}

/// Posts statuses through the Mastodon REST API.
pub struct MastodonPublisher {
    client: reqwest::Client,
    statuses_url: url::Url,
    access_token: SecretString,
}

impl std::fmt::Debug for MastodonPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MastodonPublisher")
            .field("statuses_url", &self.statuses_url.as_str())
            .field("access_token", &"[REDACTED]")
            .finish()
    }
}

impl MastodonPublisher {
    /// Create a publisher for the instance at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::InvalidBaseUrl`] if `base_url` does not parse,
    /// and [`PublishError::InsecureBaseUrl`] if it is not HTTPS. Plain HTTP is
    /// allowed for localhost only, so the token never crosses the network in
    /// the clear.
    pub fn new(
        client: reqwest::Client,
        base_url: &str,
        access_token: SecretString,
    ) -> Result<Self, PublishError> {
        let mut base = url::Url::parse(base_url)
            .map_err(|e| PublishError::InvalidBaseUrl(format!("{}: {}", base_url, e)))?;

        // Instances served under a path prefix need it kept when joining
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        if base.scheme() != "https" {
            let is_localhost = base.scheme() == "http"
                && matches!(base.host_str(), Some("localhost") | Some("127.0.0.1"));
            if !is_localhost {
                tracing::error!(base_url = %base_url, "Rejecting non-HTTPS Mastodon base URL");
                return Err(PublishError::InsecureBaseUrl);
            }
            tracing::warn!(base_url = %base_url, "Using non-HTTPS Mastodon base URL (localhost only)");
        }

        let statuses_url = base
            .join("api/v1/statuses")
            .map_err(|e| PublishError::InvalidBaseUrl(format!("{}: {}", base_url, e)))?;

        Ok(Self {
            client,
            statuses_url,
            access_token,
        })
    }
}

/// Idempotency key for a status: the same text maps to the same key, so the
/// server can drop a resubmission of an identical post.
fn idempotency_key(text: &str) -> String {
    format!("{:x}", Sha256::digest(text.as_bytes()))
}

#[async_trait]
impl Publisher for MastodonPublisher {
    async fn publish(
        &self,
        text: &str,
        visibility: Visibility,
    ) -> Result<PublishReceipt, PublishError> {
        let request = self
            .client
            .post(self.statuses_url.clone())
            .bearer_auth(self.access_token.expose_secret())
            .header("Idempotency-Key", idempotency_key(text))
            .json(&StatusRequest {
                status: text,
                visibility,
            });

        let response = tokio::time::timeout(PUBLISH_TIMEOUT, request.send())
            .await
            .map_err(|_| PublishError::Timeout)?
            .map_err(PublishError::Network)?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(status = %status, "Mastodon rejected status");
            return Err(PublishError::HttpStatus(status.as_u16()));
        }

        let body: StatusResponse = response
            .json()
            .await
            .map_err(|e| PublishError::InvalidResponse(e.to_string()))?;

        Ok(PublishReceipt {
            id: body.id,
            url: body.url,
        })
    }
}

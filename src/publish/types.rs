use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Errors raised by a status publish attempt.
#[derive(Debug, Error)]
pub enum PublishError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// Request exceeded the 30-second timeout
    #[error("Request timed out")]
    Timeout,
    /// The server rejected the status
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    #[error("Insecure base URL: HTTPS required (except localhost for testing)")]
    InsecureBaseUrl,
    #[error("Invalid base URL: {0}")]
    InvalidBaseUrl(String),
    /// The server accepted the request but its reply was unusable
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

// ============================================================================
// Visibility
// ============================================================================

/// Who can see a posted status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    /// Only mentioned users
    Direct,
    /// Followers only
    Private,
    /// Public but kept out of public timelines
    Unlisted,
    #[default]
    Public,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Direct => "direct",
            Visibility::Private => "private",
            Visibility::Unlisted => "unlisted",
            Visibility::Public => "public",
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("Unknown visibility '{0}' (expected direct, private, unlisted or public)")]
pub struct ParseVisibilityError(String);

impl FromStr for Visibility {
    type Err = ParseVisibilityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "direct" => Ok(Visibility::Direct),
            "private" => Ok(Visibility::Private),
            "unlisted" => Ok(Visibility::Unlisted),
            "public" => Ok(Visibility::Public),
            _ => Err(ParseVisibilityError(s.to_string())),
        }
    }
}

// ============================================================================
// Publish Capability
// ============================================================================

/// What the server reported back for a posted status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReceipt {
    pub id: String,
    pub url: Option<String>,
}

/// Capability to post a status update.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(
        &self,
        text: &str,
        visibility: Visibility,
    ) -> Result<PublishReceipt, PublishError>;
}

//! Status composition and posting.
//!
//! [`compose_status`] owns the message template; [`Publisher`] is the
//! capability that sends it, implemented for Mastodon by
//! [`MastodonPublisher`].

mod mastodon;
mod message;
mod types;

pub use mastodon::MastodonPublisher;
pub use message::{compose_status, single_line, MAX_STATUS_CHARS};
pub use types::{ParseVisibilityError, PublishError, PublishReceipt, Publisher, Visibility};

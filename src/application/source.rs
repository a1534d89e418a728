//! Remote data source seam for the posts demo.

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("request to posts API failed: {0}")]
    Transport(String),
    #[error("posts API responded with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("posts API returned an unusable body: {0}")]
    Body(String),
}

impl SourceError {
    pub fn transport(err: impl std::fmt::Display) -> Self {
        Self::Transport(err.to_string())
    }
}

/// Produces the raw posts payload on a cache miss.
///
/// Implementations return the body exactly as it should be cached; a payload
/// that does not decode as posts must be reported as [`SourceError::Body`]
/// so that it never reaches the store.
#[async_trait]
pub trait PostsSource: Send + Sync {
    async fn fetch_posts(&self) -> Result<Bytes, SourceError>;
}

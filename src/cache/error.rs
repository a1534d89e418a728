use std::time::Duration;

use thiserror::Error;

/// Why a remote fetch produced no payload. Never cached.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("remote fetch failed: {0}")]
    Source(String),
    #[error("remote fetch timed out after {0:?}")]
    TimedOut(Duration),
}

impl FetchError {
    pub fn failed(err: impl std::fmt::Display) -> Self {
        Self::Source(err.to_string())
    }

    pub(crate) fn reason(&self) -> &'static str {
        match self {
            FetchError::Source(_) => "source",
            FetchError::TimedOut(_) => "timeout",
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("store backend unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }
}

/// Errors surfaced by [`CacheAside`](super::CacheAside).
///
/// Cloneable so that every caller waiting on the same flight receives the
/// owner's outcome.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error(transparent)]
    FetchFailed(#[from] FetchError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("tag index references key `{key}` that is absent from the store")]
    InconsistentIndex { key: String },
}

impl CacheError {
    pub fn inconsistent_index(key: impl Into<String>) -> Self {
        Self::InconsistentIndex { key: key.into() }
    }

    pub fn is_fetch_failure(&self) -> bool {
        matches!(self, CacheError::FetchFailed(_))
    }
}

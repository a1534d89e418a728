use thiserror::Error;

use crate::{cache::CacheError, domain::error::DomainError, infra::error::InfraError};

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    /// Short operator-facing description of the failure class.
    pub fn presentation_message(&self) -> &'static str {
        match self {
            AppError::Cache(CacheError::FetchFailed(_)) => "Posts API unavailable",
            AppError::Cache(CacheError::Store(_)) => "Cache backend unavailable",
            AppError::Cache(CacheError::InconsistentIndex { .. }) => "Cache index inconsistent",
            AppError::Domain(DomainError::MalformedPayload { .. }) => "Posts payload malformed",
            AppError::Validation(_) => "Request could not be processed",
            AppError::Infra(InfraError::Remote { .. }) => "Posts API unavailable",
            AppError::Infra(InfraError::Configuration { .. }) => "Service misconfigured",
            AppError::Infra(InfraError::Telemetry(_)) => "Logging subsystem could not start",
            AppError::Infra(InfraError::Io(_)) => "I/O failure",
            AppError::Unexpected(_) => "Unexpected error occurred",
        }
    }
}

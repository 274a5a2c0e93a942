//! Provider error types

use std::time::Duration;
use thiserror::Error;

/// Errors a provider can return from `generate`
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("transient provider failure: {0}")]
    Transient(String),

    #[error("rate limited{}", retry_after.map(|d| format!(", retry after {:?}", d)).unwrap_or_default())]
    RateLimited { retry_after: Option<Duration> },

    #[error("unrecoverable provider failure: {0}")]
    Unrecoverable(String),

    #[error("provider timed out after {0:?}")]
    Timeout(Duration),
}

impl ProviderError {
    /// Unrecoverable errors take the provider out of the chain for good;
    /// everything else only degrades it for the cooldown window.
    pub fn is_unrecoverable(&self) -> bool {
        matches!(self, ProviderError::Unrecoverable(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ProviderError::Transient(_) => "transient",
            ProviderError::RateLimited { .. } => "rate_limited",
            ProviderError::Unrecoverable(_) => "unrecoverable",
            ProviderError::Timeout(_) => "timeout",
        }
    }
}

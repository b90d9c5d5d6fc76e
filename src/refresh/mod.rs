//! Refresh policy
//!
//! [`RefreshGate`] decides whether the provider may be called, runs the
//! fetch, and commits the result to the review store. [`RefreshHandle`]
//! drives the gate on a schedule. Every failure surfaces as a
//! [`RefreshError`]; nothing from the transport or the store leaks past here.

pub(crate) mod gate;
mod schedule;

pub use gate::{availability_at, Availability, RefreshGate, RefreshOutcome, SEARCH_RESULT_LIMIT};
pub use schedule::{try_recv, RefreshHandle, RefreshMessage, RefreshSchedule};

use thiserror::Error;

use crate::cache::StoreError;
use crate::config::ConfigError;
use crate::data::ProviderError;

/// Why a refresh (or search) attempt did not succeed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RefreshError {
    #[error("Not configured: no provider API key is set")]
    NotConfigured,

    #[error("No business selected")]
    NoBusinessSelected,

    #[error("Please wait {hours_remaining} hours before fetching reviews again")]
    RateLimited { hours_remaining: i64 },

    #[error("A refresh is already in progress")]
    RefreshInProgress,

    #[error("Could not reach the reviews provider: {0}")]
    ProviderUnreachable(String),

    #[error("Reviews provider error: {status_or_code}")]
    ProviderError { status_or_code: String },

    #[error("The provider returned no reviews")]
    EmptyResult,

    #[error("Refusing to replace the cache with an empty review set")]
    EmptyInput,

    #[error("Malformed provider response: {0}")]
    MalformedResponse(String),

    /// Reading or writing the cache or settings failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// The background refresh task died before reporting
    #[error("Refresh interrupted: {0}")]
    Interrupted(String),
}

impl RefreshError {
    /// Whether the attempt was turned away by policy rather than failing
    pub fn is_skip(&self) -> bool {
        matches!(
            self,
            RefreshError::RateLimited { .. } | RefreshError::RefreshInProgress
        )
    }
}

impl From<ProviderError> for RefreshError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Unreachable(msg) => RefreshError::ProviderUnreachable(msg),
            ProviderError::Status(code) => RefreshError::ProviderError {
                status_or_code: code,
            },
            ProviderError::Malformed(msg) => RefreshError::MalformedResponse(msg),
        }
    }
}

impl From<StoreError> for RefreshError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::EmptyInput => RefreshError::EmptyInput,
            invalid @ StoreError::InvalidReview { .. } => {
                RefreshError::MalformedResponse(invalid.to_string())
            }
            other => RefreshError::Storage(other.to_string()),
        }
    }
}

impl From<ConfigError> for RefreshError {
    fn from(err: ConfigError) -> Self {
        RefreshError::Storage(err.to_string())
    }
}

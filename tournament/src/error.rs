//! Tournament error taxonomy with retry classification.
//!
//! | Variant      | Raised by                      | Retried | Effect                         |
//! |--------------|--------------------------------|---------|--------------------------------|
//! | `Validation` | config checks, store appends   | never   | rejected at creation           |
//! | `Provider`   | generator / reviewer calls     | backoff | lane round marked degraded     |
//! | `Conflict`   | optimistic champion promotion  | once    | lane re-reads champion         |
//! | `NotFound`   | queries for unproduced state   | never   | surfaced to the caller         |
//!
//! Provider failures are classified by [`ProviderErrorKind`] so the retry
//! helper never has to string-match error messages.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result alias used across the engine.
pub type TournamentResult<T> = Result<T, TournamentError>;

/// Classification of an external provider failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorKind {
    /// Network failure or backend crash.
    Transient,
    /// The provider asked us to slow down (HTTP 429).
    RateLimited,
    /// No answer within the per-call timeout.
    Timeout,
    /// The provider answered, but not with the expected schema.
    InvalidResponse,
    /// Authentication, bad request or other non-recoverable failure.
    Permanent,
}

impl ProviderErrorKind {
    pub fn is_retriable(self) -> bool {
        !matches!(self, Self::Permanent)
    }
}

impl fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient => write!(f, "transient"),
            Self::RateLimited => write!(f, "rate_limited"),
            Self::Timeout => write!(f, "timeout"),
            Self::InvalidResponse => write!(f, "invalid_response"),
            Self::Permanent => write!(f, "permanent"),
        }
    }
}

/// Failure of a single generator or reviewer call.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{provider} failed ({kind}): {message}")]
pub struct ProviderError {
    /// Which provider / operation failed (e.g. `generate`, `review:clinical`).
    pub provider: String,
    pub kind: ProviderErrorKind,
    pub message: String,
}

impl ProviderError {
    pub fn new(
        provider: impl Into<String>,
        kind: ProviderErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            provider: provider.into(),
            kind,
            message: message.into(),
        }
    }

    pub fn transient(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(provider, ProviderErrorKind::Transient, message)
    }

    pub fn rate_limited(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(provider, ProviderErrorKind::RateLimited, message)
    }

    pub fn timeout(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(provider, ProviderErrorKind::Timeout, message)
    }

    pub fn invalid_response(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(provider, ProviderErrorKind::InvalidResponse, message)
    }

    pub fn permanent(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(provider, ProviderErrorKind::Permanent, message)
    }

    pub fn is_retriable(&self) -> bool {
        self.kind.is_retriable()
    }
}

/// Unified error type for engine operations.
#[derive(Debug, Error)]
pub enum TournamentError {
    /// Bad configuration or a record that violates store invariants.
    #[error("Validation error: {0}")]
    Validation(String),

    /// An external provider call failed after exhausting retries.
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Optimistic concurrency check failed, or a terminal record was touched.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Query for state that was never produced.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The tournament was cancelled before the operation could commit.
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// Snapshot file could not be read or written.
    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Lock poisoned")]
    LockPoisoned,
}

impl TournamentError {
    /// Machine-readable code used in API error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::Provider(_) => "provider_error",
            Self::Conflict(_) => "conflict",
            Self::NotFound(_) => "not_found",
            Self::Cancelled(_) => "cancelled",
            Self::Persistence(_) => "persistence_error",
            Self::LockPoisoned => "internal_error",
        }
    }

    /// Whether a caller may retry the same operation.
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::Provider(e) => e.is_retriable(),
            Self::Conflict(_) => true,
            _ => false,
        }
    }
}

//! Error taxonomy for the analysis pipeline.
//!
//! Adapter-level failures ([`SourceError`]) are absorbed inside the adapters
//! and never cross the HTTP boundary; they exist so that callers in unit
//! tests (and the adapters' own logging) can distinguish a rate-limited
//! upstream from a generic outage. [`SummarizeError`] is the one category
//! that is fatal for a request. Cache failures are not represented here at
//! all — the cache layer swallows them.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Failure talking to one of the external data sources.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The upstream reported quota exhaustion. Carries the reset time so
    /// callers can log a retry-after hint.
    #[error("{service} rate limit exceeded, resets at {reset}")]
    RateLimited {
        service: &'static str,
        reset: DateTime<Utc>,
    },

    /// A non-success HTTP status that is not a rate limit.
    #[error("{service} returned HTTP {status}: {message}")]
    Status {
        service: &'static str,
        status: u16,
        message: String,
    },

    /// Network-level failure (connect, timeout, TLS).
    #[error("request to {service} failed: {source}")]
    Http {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },

    /// No canonical identity could be resolved for the tool. A valid
    /// "unknown" outcome, not an upstream fault.
    #[error("no {service} identity resolved for '{tool}'")]
    NotFound {
        service: &'static str,
        tool: String,
    },

    /// The upstream answered but the payload did not have the expected shape.
    #[error("unexpected {service} response: {message}")]
    Decode {
        service: &'static str,
        message: String,
    },
}

/// Failure producing the analysis text. Infrastructure failures and
/// malformed model output are kept distinct so logs can tell them apart,
/// but both abort the request.
#[derive(Debug, Error)]
pub enum SummarizeError {
    #[error("summarization API error ({status}): {detail}")]
    Api { status: u16, detail: String },

    #[error("summarization request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("summarization output did not match the expected schema: {detail}")]
    Parse { detail: String },
}

/// Request-level failure surfaced to callers of the orchestrator.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error(transparent)]
    Summarization(#[from] SummarizeError),
}

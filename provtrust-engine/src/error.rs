//! Error types for provtrust-engine
//!
//! Two families, matching how failures are absorbed:
//! - [`LookupError`]: an external source timed out or misbehaved. Always
//!   resolved to a documented "uncertain" score by the stage that made the call.
//! - [`StageError`]: something unexpected inside a stage. Caught at the
//!   orchestrator boundary, recorded on the record, replaced by the stage default.

use std::time::Duration;
use thiserror::Error;

/// External lookup failure (registry, geocoder, billing activity)
#[derive(Debug, Clone, Error, PartialEq)]
pub enum LookupError {
    /// No response within the bounded timeout
    #[error("lookup timed out after {0} ms")]
    Timeout(u64),

    /// Transport failure (DNS, connect, TLS, reset)
    #[error("network error: {0}")]
    Network(String),

    /// Non-success HTTP status
    #[error("API returned status {status}")]
    Api { status: u16 },

    /// Response body could not be decoded
    #[error("parse error: {0}")]
    Parse(String),

    /// Source rejected the request for quota reasons (HTTP 429)
    #[error("rate limited by source")]
    RateLimited,
}

impl LookupError {
    /// Classify a transport error from a client built with `timeout`
    pub fn from_reqwest(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            LookupError::Timeout(timeout.as_millis() as u64)
        } else if err.is_decode() {
            LookupError::Parse(err.to_string())
        } else if let Some(status) = err.status() {
            if status.as_u16() == 429 {
                return LookupError::RateLimited;
            }
            LookupError::Api {
                status: status.as_u16(),
            }
        } else {
            LookupError::Network(err.to_string())
        }
    }
}

/// Failure inside a pipeline stage
#[derive(Debug, Clone, Error)]
pub enum StageError {
    /// An input the stage requires was absent
    #[error("missing input: {0}")]
    MissingInput(String),

    /// Input present but unusable
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Lookup failure that the stage chose not to absorb
    #[error("lookup failed: {0}")]
    Lookup(#[from] LookupError),

    /// The stage panicked; the panic was contained at the orchestrator boundary
    #[error("stage panicked: {0}")]
    Panicked(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type StageResult<T> = Result<T, StageError>;

use serde_json::{Map, Value};
use thiserror::Error;

/// One record as returned by the remote service for a single entity. The
/// structure is an arbitrarily nested tree of mappings, sequences, and
/// scalars; it is never interpreted beyond the fields the pipeline names.
pub type RawRecord = Value;

/// A flattened record: every value is a scalar. Key insertion order is
/// preserved (serde_json's `preserve_order` feature), which is what makes
/// first-seen column discovery deterministic.
pub type FlatRecord = Map<String, Value>;

/// One bounded batch of records plus the continuation token issued by the
/// remote listing. The token is an opaque provider cursor; only its
/// presence or absence carries meaning.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub records: Vec<RawRecord>,
    pub next_token: Option<String>,
}

impl Page {
    pub fn new(records: Vec<RawRecord>, next_token: Option<String>) -> Self {
        Self {
            records,
            next_token,
        }
    }

    /// A page with no continuation token, signalling end-of-stream.
    pub fn last(records: Vec<RawRecord>) -> Self {
        Self::new(records, None)
    }
}

/// Failure reported by the remote service for a single call.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ServiceError {
    /// The service rejected the call due to rate limiting.
    #[error("request throttled: {0}")]
    Throttled(String),

    /// The service reported a transient fault.
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// Any other failure surfaced by the provider.
    #[error("service error: {0}")]
    Other(String),
}

impl ServiceError {
    /// Transient failures are retried with backoff; everything else
    /// terminates the affected branch immediately.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Throttled(_) | Self::Unavailable(_))
    }
}

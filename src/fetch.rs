use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::model::{Page, RawRecord, ServiceError};

/// Default identifier batch bound, dictated by the remote API's own
/// per-request cap on bulk-identifier queries.
pub const DEFAULT_CHUNK_SIZE: usize = 40;

/// Retry policy for transient remote failures: a bounded attempt count with
/// linear backoff. One policy value is passed to every network-calling
/// component instead of duplicating the loop per call site.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 20,
            base_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    /// Wait before the retry following failed attempt number `attempt`
    /// (1-based): `attempt × base_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }
}

/// Drives a token-based pagination loop to completion, accumulating every
/// record the operation yields.
///
/// The first call passes no token; each subsequent call passes the token
/// from the previous page. Pagination stops when a page carries no token.
/// A zero-record page with a token present does not terminate the loop.
///
/// Failures are a branch-level concern: a transient error is retried per
/// `policy`, and once retries are exhausted (or a non-transient error
/// arrives) the branch stops paginating and whatever was accumulated so far
/// is returned. One failing branch must not abort the whole report.
pub fn fetch_all<F>(mut operation: F, policy: &RetryPolicy) -> Vec<RawRecord>
where
    F: FnMut(Option<&str>) -> Result<Page, ServiceError>,
{
    let mut records = Vec::new();
    let mut token: Option<String> = None;
    loop {
        let Some(page) = call_with_retry(&mut operation, token.as_deref(), policy) else {
            return records;
        };
        records.extend(page.records);
        match page.next_token {
            Some(next) => token = Some(next),
            None => return records,
        }
    }
}

/// Runs the full pagination loop independently for each contiguous
/// `chunk_size` slice of `ids`, concatenating the results in input order.
/// No reordering and no deduplication happen across chunks.
pub fn fetch_chunked<F>(
    mut operation: F,
    ids: &[String],
    chunk_size: usize,
    policy: &RetryPolicy,
) -> Vec<RawRecord>
where
    F: FnMut(&[String], Option<&str>) -> Result<Page, ServiceError>,
{
    let mut records = Vec::new();
    for chunk in ids.chunks(chunk_size.max(1)) {
        debug!(chunk_len = chunk.len(), "fetching identifier chunk");
        records.extend(fetch_all(|token| operation(chunk, token), policy));
    }
    records
}

/// One page request with the retry policy applied. `None` means the branch
/// is abandoned: retries exhausted or an unclassified failure.
fn call_with_retry<F>(operation: &mut F, token: Option<&str>, policy: &RetryPolicy) -> Option<Page>
where
    F: FnMut(Option<&str>) -> Result<Page, ServiceError>,
{
    for attempt in 1..=policy.max_attempts {
        match operation(token) {
            Ok(page) => return Some(page),
            Err(error) if error.is_transient() => {
                if attempt == policy.max_attempts {
                    warn!(%error, attempt, "retries exhausted, abandoning branch");
                    return None;
                }
                let wait = policy.delay_for(attempt);
                warn!(
                    %error,
                    attempt,
                    wait_secs = wait.as_secs_f64(),
                    "transient service error, backing off"
                );
                thread::sleep(wait);
            }
            Err(error) => {
                warn!(%error, "unexpected service error, abandoning branch");
                return None;
            }
        }
    }
    None
}

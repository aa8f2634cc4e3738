//! External collaborators: where sources come from and where records go.
//!
//! # Architecture
//!
//! - [`SourceRegistry`]: yields the entry URLs to scan
//! - [`RecordQueue`]: accepts a batch of [`ScheduledRecord`]s
//! - [`RetryQueue`]: decorator adding exponential backoff to any queue
//! - [`Registry`] / [`Sink`]: the implementation picked from configuration
//!
//! # Implementations
//!
//! | Type | Registry | Queue |
//! |------|----------|-------|
//! | [`supabase::SupabaseClient`] | `sources` table | `to_process` table |
//! | [`file::SourcesFile`] | newline-delimited file | |
//! | [`json::JsonDirQueue`] | | dated JSON batch files |

pub mod file;
pub mod json;
pub mod supabase;

use crate::error::QueueError;
use crate::models::ScheduledRecord;
use rand::{Rng, rng};
use std::fmt;
use std::time::{Duration as StdDuration, Instant};
use tokio::time::sleep;
use tracing::{error, instrument, warn};

/// Read-only list of source entry URLs.
pub trait SourceRegistry {
    async fn list_sources(&self) -> Result<Vec<String>, QueueError>;
}

/// Downstream consumer of scheduled records.
pub trait RecordQueue {
    /// Insert the whole batch and return how many records were accepted.
    async fn insert_batch(&self, records: &[ScheduledRecord]) -> Result<usize, QueueError>;
}

/// Wrapper that retries a failed batch insert with exponential backoff.
///
/// Only [`QueueError::is_transient`] failures are retried; anything else is
/// returned at once.
///
/// The delay between attempts follows:
/// ```text
/// delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..250ms)
/// ```
pub struct RetryQueue<Q> {
    inner: Q,
    max_retries: usize,
    base_delay: StdDuration,
    max_delay: StdDuration,
}

impl<Q> RetryQueue<Q>
where
    Q: RecordQueue,
{
    /// # Example
    ///
    /// ```ignore
    /// let queue = RetryQueue::new(supabase, 3, Duration::from_secs(1));
    /// ```
    pub fn new(inner: Q, max_retries: usize, base_delay: StdDuration) -> Self {
        Self {
            inner,
            max_retries,
            base_delay,
            max_delay: StdDuration::from_secs(30),
        }
    }
}

impl<Q> fmt::Debug for RetryQueue<Q> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryQueue")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .finish()
    }
}

impl<Q> RecordQueue for RetryQueue<Q>
where
    Q: RecordQueue,
{
    #[instrument(level = "info", skip_all, fields(count = records.len()))]
    async fn insert_batch(&self, records: &[ScheduledRecord]) -> Result<usize, QueueError> {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            match self.inner.insert_batch(records).await {
                Ok(accepted) => return Ok(accepted),
                Err(e) if !e.is_transient() => {
                    error!(attempt = attempt + 1, error = %e, "insert_batch failed permanently");
                    return Err(e);
                }
                Err(e) => {
                    attempt += 1;
                    let total_dt = total_t0.elapsed();

                    if attempt > self.max_retries {
                        error!(
                            attempt,
                            max = self.max_retries,
                            elapsed_ms_total = total_dt.as_millis() as u64,
                            error = %e,
                            "insert_batch exhausted retries"
                        );
                        return Err(e);
                    }

                    let mut delay = self.base_delay.saturating_mul(1 << (attempt - 1));
                    if delay > self.max_delay {
                        delay = self.max_delay;
                    }
                    let jitter_ms: u64 = rng().random_range(0..=250);
                    let delay = delay + StdDuration::from_millis(jitter_ms);

                    warn!(
                        attempt,
                        max = self.max_retries,
                        elapsed_ms_total = total_dt.as_millis() as u64,
                        ?delay,
                        error = %e,
                        "insert_batch attempt failed; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

/// The registry chosen at startup.
#[derive(Debug)]
pub enum Registry {
    Supabase(supabase::SupabaseClient),
    File(file::SourcesFile),
}

impl SourceRegistry for Registry {
    async fn list_sources(&self) -> Result<Vec<String>, QueueError> {
        match self {
            Registry::Supabase(client) => client.list_sources().await,
            Registry::File(file) => file.list_sources().await,
        }
    }
}

/// The queue chosen at startup.
#[derive(Debug)]
pub enum Sink {
    Supabase(RetryQueue<supabase::SupabaseClient>),
    Json(json::JsonDirQueue),
}

impl RecordQueue for Sink {
    async fn insert_batch(&self, records: &[ScheduledRecord]) -> Result<usize, QueueError> {
        match self {
            Sink::Supabase(queue) => queue.insert_batch(records).await,
            Sink::Json(dir) => dir.insert_batch(records).await,
        }
    }
}

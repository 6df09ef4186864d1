//! Client-side request pacing.
//!
//! Each caller reserves the next free slot under the lock and then sleeps
//! outside it, so concurrent callers queue up one interval apart instead of
//! all waking at once.

use crate::core::error::Cancelled;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::trace;

#[derive(Debug)]
pub struct Pacer {
    interval: Option<Duration>,
    next_slot: Mutex<Option<Instant>>,
}

impl Pacer {
    /// A pacer allowing `requests_per_minute` requests; a non-positive or
    /// non-finite rate disables pacing.
    pub fn new(requests_per_minute: f64) -> Self {
        let interval = (requests_per_minute.is_finite() && requests_per_minute > 0.0)
            .then(|| Duration::from_secs_f64(60.0 / requests_per_minute));
        Self {
            interval,
            next_slot: Mutex::new(None),
        }
    }

    pub fn unlimited() -> Self {
        Self::new(0.0)
    }

    pub fn interval(&self) -> Option<Duration> {
        self.interval
    }

    /// Block until this caller's slot arrives, or the token fires.
    pub async fn wait(&self, cancel: &CancellationToken) -> Result<(), Cancelled> {
        let Some(interval) = self.interval else {
            return Ok(());
        };
        if cancel.is_cancelled() {
            return Err(Cancelled);
        }

        let delay = {
            let mut last = self
                .next_slot
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let now = Instant::now();
            let delay = match *last {
                Some(previous) => (previous + interval).saturating_duration_since(now),
                None => Duration::ZERO,
            };
            *last = Some(now + delay);
            delay
        };

        if delay.is_zero() {
            return Ok(());
        }
        trace!(delay_ms = delay.as_millis() as u64, "pacing request");
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Cancelled),
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }
}

impl Default for Pacer {
    fn default() -> Self {
        Self::unlimited()
    }
}

//! Transient-failure retries with exponential backoff.
//!
//! This layer only absorbs network blips (refused or reset connections,
//! timeouts, DNS hiccups). Status-coded rejections from the API are left for
//! key rotation in [`crate::core::client`].

use crate::core::error::{Cancelled, ClientError};
use crate::utils::random;
use std::error::Error as StdError;
use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Lowercase substrings that mark an error as a transient network failure
/// when no typed signal is available.
const RETRYABLE_PATTERNS: &[&str] = &[
    "connection refused",
    "connection reset",
    "connection timed out",
    "no such host",
    "network is unreachable",
    "host is unreachable",
    "temporary failure",
    "try again",
    "i/o timeout",
    "eof",
    "broken pipe",
    "connection closed",
];

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; `0` disables retrying.
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
    /// Fraction of the nominal delay to perturb by, in `[0, 1]`.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: 0.2,
        }
    }
}

impl RetryPolicy {
    /// Delay before the retry that follows `attempt` (zero-based).
    ///
    /// Attempt `0` waits exactly `initial_backoff`. Later attempts grow by
    /// `multiplier`, are capped at `max_backoff`, then perturbed by up to
    /// `jitter` of the nominal value in either direction.
    pub fn compute_backoff(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return self.initial_backoff;
        }
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let nominal = (self.initial_backoff.as_secs_f64() * self.multiplier.powi(exponent))
            .min(self.max_backoff.as_secs_f64());

        let jitter = self.jitter.clamp(0.0, 1.0);
        let scaled = if jitter > 0.0 {
            let spread = random::unit_f64() * 2.0 - 1.0;
            nominal * (1.0 + jitter * spread)
        } else {
            nominal
        };
        Duration::try_from_secs_f64(scaled.max(0.0)).unwrap_or(self.max_backoff)
    }
}

/// Snapshot handed to the retry observer before each backoff sleep.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryInfo {
    /// One-based number of the retry about to happen.
    pub attempt: u32,
    pub max_retries: u32,
    pub error: String,
    pub next_backoff: Duration,
}

pub type RetryCallback = Arc<dyn Fn(&RetryInfo) + Send + Sync>;

/// Errors that can pass through [`execute_with_retry`].
pub trait RetryableError: StdError + From<Cancelled> + 'static {
    fn is_cancellation(&self) -> bool;
}

impl RetryableError for ClientError {
    fn is_cancellation(&self) -> bool {
        self.is_cancelled()
    }
}

/// Classify an error as transient.
///
/// Cancellation never retries. Typed signals on any error in the source
/// chain are checked first (client timeouts and connect failures, I/O error
/// kinds), then the messages of the whole chain are matched against known
/// transient wording.
pub fn is_retryable<E: RetryableError>(err: &E) -> bool {
    if err.is_cancellation() {
        return false;
    }

    let mut current: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(e) = current {
        if let Some(client) = e.downcast_ref::<ClientError>() {
            match client {
                ClientError::Cancelled
                | ClientError::MissingApiKey
                | ClientError::Setup(_)
                | ClientError::Api(_)
                | ClientError::KeysExhausted(_)
                | ClientError::Encode(_)
                | ClientError::Decode(_) => return false,
                ClientError::Transport(_) | ClientError::Stream(_) => {}
            }
        }
        if e.downcast_ref::<Cancelled>().is_some() {
            return false;
        }
        if let Some(http) = e.downcast_ref::<reqwest::Error>() {
            if http.is_timeout() || http.is_connect() {
                return true;
            }
        }
        if let Some(io_err) = e.downcast_ref::<io::Error>() {
            if is_transient_io(io_err.kind()) {
                return true;
            }
        }
        if e.downcast_ref::<tokio::time::error::Elapsed>().is_some() {
            return true;
        }
        current = e.source();
    }

    let mut current: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(e) = current {
        let message = e.to_string().to_lowercase();
        if RETRYABLE_PATTERNS
            .iter()
            .any(|pattern| message.contains(pattern))
        {
            return true;
        }
        current = e.source();
    }
    false
}

fn is_transient_io(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::TimedOut
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof
            | io::ErrorKind::HostUnreachable
            | io::ErrorKind::NetworkUnreachable
    )
}

/// Run `operation` until it succeeds, fails permanently, or the policy runs
/// out of retries. Returns the last error in the latter two cases.
///
/// The token is checked before every attempt and raced against every
/// backoff sleep.
pub async fn execute_with_retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    on_retry: Option<&RetryCallback>,
    mut operation: F,
) -> Result<T, E>
where
    E: RetryableError,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 0u32;
    loop {
        if cancel.is_cancelled() {
            return Err(Cancelled.into());
        }

        let err = match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    debug!(attempt, "request succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        if !is_retryable(&err) {
            debug!(error = %err, "non-retryable error");
            return Err(err);
        }
        if attempt >= policy.max_retries {
            warn!(
                attempts = attempt + 1,
                error = %err,
                "all retry attempts exhausted"
            );
            return Err(err);
        }

        let backoff = policy.compute_backoff(attempt);
        warn!(
            attempt = attempt + 1,
            max_retries = policy.max_retries,
            delay_secs = backoff.as_secs_f64(),
            error = %err,
            "retrying after transient failure"
        );
        if let Some(callback) = on_retry {
            callback(&RetryInfo {
                attempt: attempt + 1,
                max_retries: policy.max_retries,
                error: err.to_string(),
                next_backoff: backoff,
            });
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Cancelled.into()),
            _ = tokio::time::sleep(backoff) => {}
        }
        attempt += 1;
    }
}

//! Caller-facing entry point: submit, wait, retry.
//!
//! [`RelayClient::invoke`] is the only thing front-end code needs. It hides the
//! queue behind one awaitable call and resubmits on transport failures, up to
//! [`RetryConfig::total_tries`] attempts in total. Backend errors and validation
//! failures come back on the first attempt; retries only smooth over network faults.

use std::time::{Duration, SystemTime};

use log::warn;
use reqwest_retry::{RetryDecision, RetryPolicy, policies::ExponentialBackoff};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::{
    rpc::Outcome,
    validator::ValidationError,
    worker::{Call, Reply},
};

pub const DEFAULT_TOTAL_TRIES: u32 = 5;

/// Failures that end an `invoke` without a backend outcome.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The call is not whitelisted or its arguments are malformed. Never retried.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The connection is shut down or shutting down.
    #[error("Backend connection closed")]
    Closed,
}

/// How often, and how patiently, transport failures are retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Attempts per `invoke`, the first one included.
    pub total_tries: u32,
    /// Bounds for the exponential delay between attempts. A zero maximum resubmits immediately.
    pub min_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            total_tries: DEFAULT_TOTAL_TRIES,
            min_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }
}

impl RetryConfig {
    fn backoff_policy(&self) -> Option<ExponentialBackoff> {
        if self.max_backoff.is_zero() {
            return None;
        }
        let min = self.min_backoff.min(self.max_backoff);
        Some(
            ExponentialBackoff::builder()
                .retry_bounds(min, self.max_backoff)
                .build_with_max_retries(self.total_tries.saturating_sub(1)),
        )
    }
}

/// Cloneable handle for submitting calls to one backend connection.
///
/// Any number of tasks may call [`invoke`](RelayClient::invoke) concurrently; the
/// connection's worker executes their calls one at a time.
#[derive(Clone)]
pub struct RelayClient {
    queue: mpsc::Sender<Call>,
    shutdown: CancellationToken,
    retry: RetryConfig,
}

impl RelayClient {
    pub(crate) fn new(queue: mpsc::Sender<Call>, shutdown: CancellationToken, retry: RetryConfig) -> Self {
        Self { queue, shutdown, retry }
    }

    /// Relays one call and waits for its outcome.
    ///
    /// Returns `Ok` with whatever the backend answered, including a
    /// [`Outcome::TransportError`] once every attempt has failed. Returns `Err` if
    /// the call was rejected by the validator or the connection is closed.
    pub async fn invoke(&self, method: &str, arguments: Vec<Value>) -> Result<Outcome, RelayError> {
        let backoff = self.retry.backoff_policy();
        let started = SystemTime::now();
        let mut tries_remaining = self.retry.total_tries.max(1);
        let mut past_retries = 0;

        loop {
            match self.submit(method, arguments.clone(), tries_remaining).await? {
                Outcome::TransportError(e) if tries_remaining > 1 => {
                    tries_remaining -= 1;
                    warn!(
                        method = method,
                        attempt = past_retries + 1,
                        tries_remaining = tries_remaining,
                        access_denied = e.is_access_denied(),
                        error:% = e;
                        "Transport failure, resubmitting call"
                    );
                    if let Some(policy) = &backoff {
                        self.wait(policy, started, past_retries).await?;
                    }
                    past_retries += 1;
                },
                outcome => return Ok(outcome),
            }
        }
    }

    async fn submit(&self, method: &str, arguments: Vec<Value>, tries_remaining: u32) -> Reply {
        if self.shutdown.is_cancelled() {
            return Err(RelayError::Closed);
        }

        let (reply, response) = oneshot::channel();
        let call = Call {
            method: method.to_string(),
            arguments,
            reply,
            tries_remaining,
        };
        self.queue.send(call).await.map_err(|_| RelayError::Closed)?;

        response.await.map_err(|_| RelayError::Closed)?
    }

    async fn wait(&self, policy: &ExponentialBackoff, started: SystemTime, past_retries: u32) -> Result<(), RelayError> {
        let RetryDecision::Retry { execute_after } = policy.should_retry(started, past_retries) else {
            return Ok(());
        };
        let Ok(delay) = execute_after.duration_since(SystemTime::now()) else {
            return Ok(());
        };

        tokio::select! {
            _ = tokio::time::sleep(delay) => Ok(()),
            _ = self.shutdown.cancelled() => Err(RelayError::Closed),
        }
    }
}

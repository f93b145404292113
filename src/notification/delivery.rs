//! Per-job delivery state machine with linear backoff.
//!
//! `Pending -> Retrying(n) -> Delivered | Dropped`, where `n` counts the
//! failed attempts so far.

use super::NotifyError;
use crate::config::DeliveryConfig;
use std::future::Future;
use std::time::Duration;
use tracing::{error, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Base delay; the wait after the n-th failure is `backoff * n`.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&DeliveryConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &DeliveryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            backoff: Duration::from_millis(config.backoff_ms),
        }
    }

    pub fn delay_after(&self, failures: u32) -> Duration {
        self.backoff * failures
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryState {
    Pending,
    Retrying(u32),
    Delivered,
    Dropped,
}

impl DeliveryState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeliveryState::Delivered | DeliveryState::Dropped)
    }

    /// Failed attempts recorded so far.
    pub fn failures(&self) -> u32 {
        match self {
            DeliveryState::Retrying(n) => *n,
            _ => 0,
        }
    }

    /// The state after one attempt with the given outcome.
    pub fn next(self, succeeded: bool, max_attempts: u32) -> DeliveryState {
        if self.is_terminal() {
            return self;
        }
        if succeeded {
            return DeliveryState::Delivered;
        }
        let failures = self.failures() + 1;
        if failures >= max_attempts {
            DeliveryState::Dropped
        } else {
            DeliveryState::Retrying(failures)
        }
    }
}

/// Runs `attempt` until it succeeds or the policy gives up.
///
/// Every failure is logged as a warning; there is no wait after the last attempt.
pub async fn deliver<F, Fut>(destination: &str, policy: RetryPolicy, mut attempt: F) -> DeliveryState
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), NotifyError>>,
{
    let mut state = DeliveryState::Pending;
    while !state.is_terminal() {
        let outcome = attempt().await;
        if let Err(e) = &outcome {
            warn!(
                destination,
                attempt = state.failures() + 1,
                error = %e,
                "Notification attempt failed"
            );
        }
        state = state.next(outcome.is_ok(), policy.max_attempts);
        if let DeliveryState::Retrying(failures) = state {
            tokio::time::sleep(policy.delay_after(failures)).await;
        }
    }

    match state {
        DeliveryState::Delivered => {
            trace!(destination, "Notification delivered");
            metrics::counter!("notifications_delivered_total", "destination" => destination.to_string())
                .increment(1);
        }
        _ => {
            error!(
                destination,
                attempts = policy.max_attempts,
                "Dropping notification after repeated failures"
            );
            metrics::counter!("notifications_dropped_total", "destination" => destination.to_string())
                .increment(1);
        }
    }
    state
}

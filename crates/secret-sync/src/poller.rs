//! Completion Poller: bounded presence polling against a consumer registry.
//!
//! The authority cannot notify the requester, so completion is inferred from
//! the secret showing up downstream. A worker that was never scheduled, one
//! that is slow and one that failed all look the same: absent until the
//! deadline.

use std::time::Duration;
use tokio::time::{sleep, timeout_at, Instant};
use tracing::{debug, instrument, warn};

use crate::backend::ConsumerRegistry;
use crate::types::{SecretName, SyncOutcome, TargetIdentity};

/// Polls for one secret at a fixed interval until a deadline.
#[derive(Debug, Clone, Copy)]
pub struct CompletionPoller {
    timeout: Duration,
    poll_interval: Duration,
}

impl CompletionPoller {
    #[must_use]
    pub const fn new(timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            timeout,
            poll_interval,
        }
    }

    /// Wait until `name` is present under `target` or the timeout elapses.
    ///
    /// Returns `Synced` or `TimedOut`, never later than
    /// `timeout + poll_interval` after the call, however slow the registry.
    pub async fn wait_for(
        &self,
        registry: &dyn ConsumerRegistry,
        target: &TargetIdentity,
        name: &SecretName,
    ) -> SyncOutcome {
        self.wait_until(registry, target, name, Instant::now() + self.timeout)
            .await
    }

    /// Like [`wait_for`](Self::wait_for) against an absolute deadline.
    ///
    /// Each presence check is cut off at the deadline and no sleep runs past
    /// it. A check that is cut off or fails counts as absent.
    #[instrument(skip(self, registry, deadline), fields(secret = %name, target = %target))]
    pub async fn wait_until(
        &self,
        registry: &dyn ConsumerRegistry,
        target: &TargetIdentity,
        name: &SecretName,
        deadline: Instant,
    ) -> SyncOutcome {
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            match timeout_at(deadline, registry.has_secret(target, name)).await {
                Ok(Ok(true)) => {
                    debug!(attempt, "Secret observed in registry");
                    return SyncOutcome::Synced;
                }
                Ok(Ok(false)) => debug!(attempt, "Secret not yet present"),
                Ok(Err(e)) => {
                    warn!(attempt, error = %e, "Presence check failed, treating as absent");
                }
                Err(_) => warn!(attempt, "Presence check still running at deadline, abandoned"),
            }

            let now = Instant::now();
            if now >= deadline {
                warn!(
                    attempts = attempt,
                    timeout_secs = self.timeout.as_secs(),
                    "Timed out waiting for secret"
                );
                return SyncOutcome::TimedOut;
            }

            sleep(self.poll_interval.min(deadline - now)).await;
        }
    }
}

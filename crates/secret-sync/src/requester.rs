//! Sync Requester: the caller-facing side of the protocol.
//!
//! For each required name, check the consumer registry; dispatch an export
//! only when the secret is missing, then poll for it. Names are processed
//! concurrently and independently.

use futures::future::join_all;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, error, info, instrument, warn};

use crate::backend::{ConsumerRegistry, ExportDispatcher};
use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::poller::CompletionPoller;
use crate::types::{ExportRequest, SecretName, SyncOutcome, SyncReport, TargetIdentity};

/// Ensures named secrets exist in a consumer registry.
#[derive(Clone)]
pub struct SyncRequester {
    registry: Arc<dyn ConsumerRegistry>,
    dispatcher: Arc<dyn ExportDispatcher>,
    config: SyncConfig,
}

impl SyncRequester {
    /// Create a requester, rejecting an invalid configuration.
    pub fn new(
        registry: Arc<dyn ConsumerRegistry>,
        dispatcher: Arc<dyn ExportDispatcher>,
        config: SyncConfig,
    ) -> Result<Self, SyncError> {
        config.validate()?;
        Ok(Self {
            registry,
            dispatcher,
            config,
        })
    }

    /// Sync every distinct name and collect one outcome per name.
    ///
    /// Never fails: every error is folded into the report.
    #[instrument(skip(self, names), fields(target = %target, registry = self.registry.name()))]
    pub async fn ensure<I>(&self, names: I, target: &TargetIdentity) -> SyncReport
    where
        I: IntoIterator<Item = SecretName>,
    {
        let names: BTreeSet<SecretName> = names.into_iter().collect();
        debug!(count = names.len(), "Ensuring secrets");

        let syncs = names.into_iter().map(|name| async move {
            let outcome = self.sync_one(&name, target).await;
            info!(secret = %name, outcome = %outcome, "Secret sync finished");
            (name, outcome)
        });

        join_all(syncs).await.into_iter().collect()
    }

    /// Like [`ensure`](Self::ensure), but fails when any secret is missing
    /// afterwards, unless degraded mode is configured.
    pub async fn ensure_secrets<I>(
        &self,
        names: I,
        target: &TargetIdentity,
    ) -> Result<SyncReport, SyncError>
    where
        I: IntoIterator<Item = SecretName>,
    {
        let report = self.ensure(names, target).await;
        evaluate(&report, self.config.allow_degraded)?;
        Ok(report)
    }

    /// Presence check, dispatch and polling share one deadline, so a slow
    /// registry or dispatcher cannot stretch the wait.
    async fn sync_one(&self, name: &SecretName, target: &TargetIdentity) -> SyncOutcome {
        let deadline = Instant::now() + self.config.timeout;

        match timeout_at(deadline, self.registry.has_secret(target, name)).await {
            Ok(Ok(true)) => return SyncOutcome::AlreadyPresent,
            Ok(Ok(false)) => debug!(secret = %name, "Secret missing, requesting export"),
            Ok(Err(SyncError::InvalidRequest(reason))) => {
                warn!(secret = %name, reason = %reason, "Registry cannot hold this secret");
                return SyncOutcome::Rejected { reason };
            }
            Ok(Err(e)) => warn!(
                secret = %name,
                error = %e,
                "Presence check failed, requesting export anyway"
            ),
            Err(_) => warn!(
                secret = %name,
                "Presence check still running at deadline, requesting export anyway"
            ),
        }

        let request = ExportRequest::new(name, target);
        let dispatched = match timeout_at(deadline, self.dispatcher.trigger_export(&request)).await
        {
            Ok(result) => result,
            Err(_) => Err(SyncError::RequestRejected {
                name: name.to_string(),
                reason: "dispatch did not complete before the deadline".to_string(),
            }),
        };
        if let Err(e) = dispatched {
            warn!(
                secret = %name,
                dispatcher = self.dispatcher.name(),
                error = %e,
                "Export dispatch rejected"
            );
            return SyncOutcome::Rejected {
                reason: e.to_string(),
            };
        }

        CompletionPoller::new(self.config.timeout, self.config.poll_interval)
            .wait_until(self.registry.as_ref(), target, name, deadline)
            .await
    }
}

/// Turn a report into the pass/fail signal for the calling build.
pub fn evaluate(report: &SyncReport, allow_degraded: bool) -> Result<(), SyncError> {
    let failed = report.failed();
    if failed.is_empty() {
        return Ok(());
    }

    if allow_degraded {
        for name in &failed {
            warn!(secret = %name, "Secret unavailable, continuing in degraded mode");
        }
        return Ok(());
    }

    error!(
        missing = ?failed,
        "Secrets never arrived; verify the authority holds them and that dispatch is reachable"
    );
    Err(SyncError::SecretsMissing { names: failed })
}

/// One-shot entry point for build pipelines.
pub async fn ensure_secrets<I>(
    names: I,
    target: &TargetIdentity,
    config: SyncConfig,
    registry: Arc<dyn ConsumerRegistry>,
    dispatcher: Arc<dyn ExportDispatcher>,
) -> Result<SyncReport, SyncError>
where
    I: IntoIterator<Item = SecretName>,
{
    SyncRequester::new(registry, dispatcher, config)?
        .ensure_secrets(names, target)
        .await
}

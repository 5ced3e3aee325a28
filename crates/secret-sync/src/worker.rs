//! Export Worker: copies one secret from the authority into a registry.
//!
//! Runs in the authority's execution context. This is the only place a
//! secret value crosses from one system to the other, and it is never logged.

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, warn};

use crate::backend::{ConsumerRegistry, SecretAuthority};
use crate::error::SyncError;
use crate::types::ExportRequest;

/// Performs exports for requests delivered by a dispatcher.
#[derive(Clone)]
pub struct ExportWorker {
    authority: Arc<dyn SecretAuthority>,
    registry: Arc<dyn ConsumerRegistry>,
}

impl ExportWorker {
    #[must_use]
    pub fn new(authority: Arc<dyn SecretAuthority>, registry: Arc<dyn ConsumerRegistry>) -> Self {
        Self {
            authority,
            registry,
        }
    }

    /// Run one export.
    ///
    /// Repeating the call with the same inputs converges to the same registry
    /// state. A failed write after a successful read is terminal; nothing is
    /// retried here.
    #[instrument(skip(self, request), fields(secret = %request.secret_name, target = %request.target))]
    pub async fn run(&self, request: &ExportRequest) -> Result<(), SyncError> {
        let (name, target) = request.validate().inspect_err(|e| {
            warn!(error = %e, "Rejecting malformed export request");
        })?;

        let value = match self.authority.get_secret(&name).await {
            Ok(Some(value)) => value,
            Ok(None) => {
                return Err(SyncError::ExportFailed {
                    name: name.to_string(),
                    reason: "secret not found in authority".to_string(),
                });
            }
            Err(e) => {
                return Err(SyncError::ExportFailed {
                    name: name.to_string(),
                    reason: format!("authority read failed: {e}"),
                });
            }
        };

        debug!(registry = self.registry.name(), "Read secret from authority");

        self.registry
            .set_secret(&target, &name, &value)
            .await
            .map_err(|e| SyncError::ExportFailed {
                name: name.to_string(),
                reason: format!("{} write failed: {e}", self.registry.name()),
            })?;

        info!(registry = self.registry.name(), "Exported secret");
        Ok(())
    }

    /// Drain export requests until every sender is dropped.
    ///
    /// Failures are logged on this side only; requesters observe them as a
    /// secret that never appears.
    pub async fn serve(self, mut requests: mpsc::Receiver<ExportRequest>) {
        debug!("Export worker started");
        while let Some(request) = requests.recv().await {
            if let Err(e) = self.run(&request).await {
                error!(
                    secret = %request.secret_name,
                    target = %request.target,
                    error = %e,
                    "Export failed"
                );
            }
        }
        debug!("Export worker stopped, request channel closed");
    }
}

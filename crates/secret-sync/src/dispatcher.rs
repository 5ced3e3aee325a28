//! In-process Export Dispatcher.
//!
//! Requests go onto a bounded channel drained by an [`ExportWorker`] task.
//! The dispatcher returns as soon as the request is queued; it never learns
//! whether the export succeeded.

use async_trait::async_trait;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::backend::ExportDispatcher;
use crate::error::SyncError;
use crate::types::ExportRequest;
use crate::worker::ExportWorker;

/// Default queue depth for [`ChannelDispatcher::spawn`].
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Dispatcher that hands requests to a worker over a channel.
#[derive(Debug, Clone)]
pub struct ChannelDispatcher {
    sender: mpsc::Sender<ExportRequest>,
}

impl ChannelDispatcher {
    #[must_use]
    pub const fn new(sender: mpsc::Sender<ExportRequest>) -> Self {
        Self { sender }
    }

    /// Start `worker` on its own task and return a dispatcher feeding it.
    ///
    /// The worker stops once every clone of the dispatcher is dropped.
    #[must_use]
    pub fn spawn(worker: ExportWorker, capacity: usize) -> (Self, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let handle = tokio::spawn(worker.serve(receiver));
        (Self::new(sender), handle)
    }
}

#[async_trait]
impl ExportDispatcher for ChannelDispatcher {
    fn name(&self) -> &'static str {
        "channel"
    }

    async fn trigger_export(&self, request: &ExportRequest) -> Result<(), SyncError> {
        let (name, _) = request.validate()?;

        match self.sender.try_send(request.clone()) {
            Ok(()) => {
                debug!(secret = %name, target = %request.target, "Export queued");
                Ok(())
            }
            Err(TrySendError::Full(_)) => Err(SyncError::RequestRejected {
                name: name.to_string(),
                reason: "export queue is full".to_string(),
            }),
            Err(TrySendError::Closed(_)) => Err(SyncError::RequestRejected {
                name: name.to_string(),
                reason: "export worker is not running".to_string(),
            }),
        }
    }
}

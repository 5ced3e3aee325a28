//! Collaborator interfaces of the sync protocol.
//!
//! The authority, the dispatch bridge and the consumer registry are
//! independent systems; the protocol only ever talks to them through these
//! traits.

use async_trait::async_trait;

use crate::error::SyncError;
use crate::types::{ExportRequest, SecretName, SecretValue, TargetIdentity};

/// The system holding the current value of each named secret.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SecretAuthority: Send + Sync {
    /// Read the current value, `None` when the authority does not hold it.
    async fn get_secret(&self, name: &SecretName) -> Result<Option<SecretValue>, SyncError>;
}

/// Fire-and-forget trigger that schedules an Export Worker run.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExportDispatcher: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Schedule an export. `Ok` means accepted, not completed.
    async fn trigger_export(&self, request: &ExportRequest) -> Result<(), SyncError>;
}

/// A per-deploying-unit store that may hold a copy of a secret.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConsumerRegistry: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    async fn has_secret(
        &self,
        target: &TargetIdentity,
        name: &SecretName,
    ) -> Result<bool, SyncError>;

    /// Upsert a value. Only the Export Worker writes.
    async fn set_secret(
        &self,
        target: &TargetIdentity,
        name: &SecretName,
        value: &SecretValue,
    ) -> Result<(), SyncError>;
}

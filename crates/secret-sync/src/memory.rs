//! In-memory authority and registry, for embedding and tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

use crate::backend::{ConsumerRegistry, SecretAuthority};
use crate::error::SyncError;
use crate::types::{SecretName, SecretValue, TargetIdentity};

/// Authority backed by a map of name to value.
#[derive(Debug, Default)]
pub struct InMemoryAuthority {
    secrets: RwLock<HashMap<SecretName, SecretValue>>,
}

impl InMemoryAuthority {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store or replace the current value of `name`.
    pub async fn put(&self, name: SecretName, value: SecretValue) {
        self.secrets.write().await.insert(name, value);
    }

    pub async fn remove(&self, name: &SecretName) {
        self.secrets.write().await.remove(name);
    }
}

#[async_trait]
impl SecretAuthority for InMemoryAuthority {
    async fn get_secret(&self, name: &SecretName) -> Result<Option<SecretValue>, SyncError> {
        Ok(self.secrets.read().await.get(name).cloned())
    }
}

/// Registry holding one namespace per target identity.
#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    secrets: RwLock<HashMap<(TargetIdentity, SecretName), SecretValue>>,
    writes: AtomicUsize,
}

impl InMemoryRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value stored for `name` under `target`.
    pub async fn get(&self, target: &TargetIdentity, name: &SecretName) -> Option<SecretValue> {
        self.secrets
            .read()
            .await
            .get(&(target.clone(), name.clone()))
            .cloned()
    }

    /// Number of secrets stored under `target`.
    pub async fn count(&self, target: &TargetIdentity) -> usize {
        self.secrets
            .read()
            .await
            .keys()
            .filter(|(t, _)| t == target)
            .count()
    }

    /// Total `set_secret` calls served.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConsumerRegistry for InMemoryRegistry {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn has_secret(
        &self,
        target: &TargetIdentity,
        name: &SecretName,
    ) -> Result<bool, SyncError> {
        Ok(self
            .secrets
            .read()
            .await
            .contains_key(&(target.clone(), name.clone())))
    }

    async fn set_secret(
        &self,
        target: &TargetIdentity,
        name: &SecretName,
        value: &SecretValue,
    ) -> Result<(), SyncError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.secrets
            .write()
            .await
            .insert((target.clone(), name.clone()), value.clone());
        Ok(())
    }
}

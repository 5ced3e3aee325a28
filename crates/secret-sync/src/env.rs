//! Authority backed by the process environment.
//!
//! The export job runs inside the authority's workflow, which injects the
//! authority's secrets as environment variables. Reading them back from the
//! environment is how the worker gets at the source value.

use async_trait::async_trait;

use crate::backend::SecretAuthority;
use crate::error::SyncError;
use crate::types::{SecretName, SecretValue};

/// Reads `<prefix><NAME>` from the environment.
#[derive(Debug, Clone, Default)]
pub struct EnvAuthority {
    prefix: String,
}

impl EnvAuthority {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look secrets up under `prefix`, e.g. `EXPORT_` for `EXPORT_DB_PASS`.
    #[must_use]
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    fn variable(&self, name: &SecretName) -> String {
        format!("{}{}", self.prefix, name.as_str())
    }
}

#[async_trait]
impl SecretAuthority for EnvAuthority {
    async fn get_secret(&self, name: &SecretName) -> Result<Option<SecretValue>, SyncError> {
        // Unset and empty are the same thing in a workflow environment.
        Ok(std::env::var(self.variable(name))
            .ok()
            .filter(|value| !value.is_empty())
            .map(SecretValue::new))
    }
}

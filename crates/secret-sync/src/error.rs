//! Error types for secret synchronization.

use thiserror::Error;

/// Errors produced by the sync protocol and its collaborators.
///
/// No variant ever carries a secret value.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Secret name or target identity is missing or malformed
    #[error("Invalid export request: {0}")]
    InvalidRequest(String),

    /// The dispatch trigger failed synchronously
    #[error("Export request for {name} rejected: {reason}")]
    RequestRejected { name: String, reason: String },

    /// The Export Worker could not read the source value or write the target
    #[error("Export of {name} failed: {reason}")]
    ExportFailed { name: String, reason: String },

    /// One or more requested secrets never arrived in the consumer registry
    #[error("Secrets not available in consumer registry: {}", .names.join(", "))]
    SecretsMissing { names: Vec<String> },

    /// Consumer registry or authority backend failure
    #[error("Registry error: {0}")]
    Registry(String),

    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    Config(String),

    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Failed to spawn or talk to an external command
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

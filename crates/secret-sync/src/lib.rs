//! Cross-repository secret synchronization.
//!
//! Makes a named secret exist in a consumer registry, sourced from the
//! authority that owns it, without copying it by hand. The requester checks
//! the registry, fires an export request at the authority for anything
//! missing, and polls the registry until the secret appears or a deadline
//! passes.
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use secret_sync::{
//!     ensure_secrets, GhDispatcher, GhRegistry, SecretName, SyncConfig, TargetIdentity,
//! };
//!
//! # async fn example() -> Result<(), secret_sync::SyncError> {
//! let config = SyncConfig::from_env()?;
//! let dispatcher = GhDispatcher::new(config.authority.clone(), config.dispatch_event.clone());
//! let target = TargetIdentity::parse("github:5dlabs/svc-b")?;
//! let names = vec![SecretName::parse("DB_PASS")?, SecretName::parse("API_KEY")?];
//!
//! let report = ensure_secrets(
//!     names,
//!     &target,
//!     config,
//!     Arc::new(GhRegistry::new()),
//!     Arc::new(dispatcher),
//! )
//! .await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - [`SyncRequester`] checks presence and dispatches exports, one name at a
//!   time but all names concurrently
//! - [`ExportDispatcher`] triggers an export without waiting for it
//! - [`ExportWorker`] copies the value from a [`SecretAuthority`] into a
//!   [`ConsumerRegistry`]
//! - [`CompletionPoller`] waits for the export to become visible

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod backend;
pub mod config;
pub mod dispatcher;
pub mod env;
pub mod error;
pub mod github;
pub mod k8s;
pub mod memory;
pub mod poller;
pub mod requester;
pub mod types;
pub mod worker;

pub use backend::{ConsumerRegistry, ExportDispatcher, SecretAuthority};
pub use config::SyncConfig;
pub use dispatcher::ChannelDispatcher;
pub use env::EnvAuthority;
pub use error::SyncError;
pub use github::{GhDispatcher, GhRegistry};
pub use k8s::KubeRegistry;
pub use memory::{InMemoryAuthority, InMemoryRegistry};
pub use poller::CompletionPoller;
pub use requester::{ensure_secrets, evaluate, SyncRequester};
pub use types::{
    ExportRequest, RegistryKind, SecretName, SecretValue, SyncOutcome, SyncReport, TargetIdentity,
};
pub use worker::ExportWorker;

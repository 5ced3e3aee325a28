//! # GitHub collaborators
//!
//! Consumer registry and dispatcher backed by the `gh` CLI.
//!
//! - [`GhRegistry`] treats a target `github:owner/repo` (or a bare
//!   `owner/repo`) as a repository's Actions secrets.
//! - [`GhDispatcher`] sends a `repository_dispatch` event to the authority
//!   repository, whose workflow runs `secret-sync export` with the requested
//!   secret in its environment.
//!
//! Authentication comes from the ambient `gh` login or `GH_TOKEN`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::process::{Output, Stdio};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, instrument};

use crate::backend::{ConsumerRegistry, ExportDispatcher};
use crate::error::SyncError;
use crate::types::{ExportRequest, RegistryKind, SecretName, SecretValue, TargetIdentity};

/// Run `gh` with `args`, optionally feeding `stdin`.
async fn run_gh(args: &[&str], stdin: Option<&[u8]>) -> Result<Output, SyncError> {
    let mut child = Command::new("gh")
        .args(args)
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
        pipe.write_all(input).await?;
        // Closing stdin signals end of input to gh.
        drop(pipe);
    }

    Ok(child.wait_with_output().await?)
}

fn stderr_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).trim().to_string()
}

#[derive(Debug, Deserialize)]
struct SecretEntry {
    name: String,
}

/// Parse `gh secret list --json name` output into the set of names.
pub fn parse_secret_list(json: &str) -> Result<HashSet<String>, SyncError> {
    let entries: Vec<SecretEntry> = serde_json::from_str(json)?;
    Ok(entries.into_iter().map(|entry| entry.name).collect())
}

/// Reject names GitHub will not store: only alphanumerics and `_`, no
/// leading digit, no `GITHUB_` prefix.
pub fn check_github_name(name: &SecretName) -> Result<(), SyncError> {
    let raw = name.as_str();
    let invalid = |why: &str| {
        Err(SyncError::InvalidRequest(format!(
            "'{raw}' is not a valid GitHub secret name: {why}"
        )))
    };

    if raw.starts_with(|c: char| c.is_ascii_digit()) {
        return invalid("starts with a digit");
    }
    if raw.to_ascii_uppercase().starts_with("GITHUB_") {
        return invalid("the GITHUB_ prefix is reserved");
    }
    if let Some(bad) = raw.chars().find(|c| !(c.is_ascii_alphanumeric() || *c == '_')) {
        return invalid(&format!("contains '{bad}'"));
    }
    Ok(())
}

/// The `owner/repo` a target points at.
fn repo_of(target: &TargetIdentity) -> Result<&str, SyncError> {
    target.require_kind(RegistryKind::Github)?;
    target.split_pair()?;
    Ok(target.location())
}

/// Repository Actions secrets as a consumer registry.
#[derive(Debug, Clone, Default)]
pub struct GhRegistry;

impl GhRegistry {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ConsumerRegistry for GhRegistry {
    fn name(&self) -> &'static str {
        "github"
    }

    #[instrument(skip_all, fields(target = %target, secret = %name))]
    async fn has_secret(
        &self,
        target: &TargetIdentity,
        name: &SecretName,
    ) -> Result<bool, SyncError> {
        let repo = repo_of(target)?;
        check_github_name(name)?;

        let output = run_gh(
            &["secret", "list", "--repo", repo, "--json", "name"],
            None,
        )
        .await?;

        if !output.status.success() {
            return Err(SyncError::Registry(format!(
                "gh secret list failed for {target}: {}",
                stderr_of(&output)
            )));
        }

        let names = parse_secret_list(&String::from_utf8_lossy(&output.stdout))?;
        debug!(count = names.len(), "Listed repository secrets");
        Ok(names.contains(name.as_str()))
    }

    #[instrument(skip_all, fields(target = %target, secret = %name))]
    async fn set_secret(
        &self,
        target: &TargetIdentity,
        name: &SecretName,
        value: &SecretValue,
    ) -> Result<(), SyncError> {
        let repo = repo_of(target)?;
        check_github_name(name)?;

        // Value goes over stdin so it never shows up in argv.
        let output = run_gh(
            &["secret", "set", name.as_str(), "--repo", repo],
            Some(value.expose().as_bytes()),
        )
        .await?;

        if !output.status.success() {
            return Err(SyncError::Registry(format!(
                "gh secret set failed for {target}: {}",
                stderr_of(&output)
            )));
        }

        Ok(())
    }
}

/// Body of a `repository_dispatch` call.
#[derive(Debug, Serialize)]
struct DispatchBody<'a> {
    event_type: &'a str,
    client_payload: &'a ExportRequest,
}

/// Builds the JSON body sent to the dispatches endpoint.
pub fn dispatch_body(event_type: &str, request: &ExportRequest) -> Result<Vec<u8>, SyncError> {
    Ok(serde_json::to_vec(&DispatchBody {
        event_type,
        client_payload: request,
    })?)
}

/// Triggers the authority's export workflow through `repository_dispatch`.
#[derive(Debug, Clone)]
pub struct GhDispatcher {
    authority: String,
    event_type: String,
}

impl GhDispatcher {
    /// `authority` is the `owner/repo` holding the source secrets.
    pub fn new(authority: impl Into<String>, event_type: impl Into<String>) -> Self {
        Self {
            authority: authority.into(),
            event_type: event_type.into(),
        }
    }

    fn endpoint(&self) -> String {
        format!("repos/{}/dispatches", self.authority)
    }
}

#[async_trait]
impl ExportDispatcher for GhDispatcher {
    fn name(&self) -> &'static str {
        "github"
    }

    #[instrument(skip(self, request), fields(authority = %self.authority, secret = %request.secret_name))]
    async fn trigger_export(&self, request: &ExportRequest) -> Result<(), SyncError> {
        request.validate()?;
        let body = dispatch_body(&self.event_type, request)?;
        let endpoint = self.endpoint();

        let output = run_gh(
            &["api", endpoint.as_str(), "--method", "POST", "--input", "-"],
            Some(&body),
        )
        .await
        .map_err(|e| SyncError::RequestRejected {
            name: request.secret_name.clone(),
            reason: format!("could not run gh: {e}"),
        })?;

        if !output.status.success() {
            return Err(SyncError::RequestRejected {
                name: request.secret_name.clone(),
                reason: stderr_of(&output),
            });
        }

        debug!(event_type = %self.event_type, "Dispatched export event");
        Ok(())
    }
}

//! Core data types of the sync protocol.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::SyncError;

/// Maximum length of a secret name (GitHub's limit).
const MAX_NAME_LEN: usize = 255;

/// Name of a secret, unique within one authority or registry namespace.
///
/// The accepted alphabet is the union of what the registries allow; each
/// registry rejects names it cannot store.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SecretName(String);

impl SecretName {
    /// Parse and validate a secret name.
    ///
    /// Accepts ASCII alphanumerics, `-`, `_` and `.`, except `.` and `..`.
    pub fn parse(name: impl Into<String>) -> Result<Self, SyncError> {
        let name = name.into();
        if name.is_empty() {
            return Err(SyncError::InvalidRequest("secret name is empty".to_string()));
        }
        if name.len() > MAX_NAME_LEN {
            return Err(SyncError::InvalidRequest(format!(
                "secret name exceeds {MAX_NAME_LEN} characters"
            )));
        }
        if name == "." || name == ".." {
            return Err(SyncError::InvalidRequest(format!(
                "secret name '{name}' is reserved"
            )));
        }
        if let Some(bad) = name
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
        {
            return Err(SyncError::InvalidRequest(format!(
                "secret name '{name}' contains invalid character '{bad}'"
            )));
        }
        Ok(Self(name))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for SecretName {
    type Error = SyncError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<SecretName> for String {
    fn from(name: SecretName) -> Self {
        name.0
    }
}

impl fmt::Display for SecretName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kind of consumer registry a target lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistryKind {
    /// GitHub Actions repository secrets
    Github,
    /// Kubernetes `Secret` data keys
    Kube,
}

impl RegistryKind {
    /// Scheme prefix used in target identities.
    #[must_use]
    pub const fn scheme(self) -> &'static str {
        match self {
            Self::Github => "github",
            Self::Kube => "kube",
        }
    }

    fn from_scheme(scheme: &str) -> Option<Self> {
        match scheme {
            "github" => Some(Self::Github),
            "kube" => Some(Self::Kube),
            _ => None,
        }
    }
}

impl fmt::Display for RegistryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.scheme())
    }
}

/// Identifies the consumer registry that receives an export.
///
/// `github:owner/repo` or `kube:namespace/secret`. Without a scheme the
/// identity names a registry only the caller knows how to reach, which is
/// fine in-process but ambiguous once it crosses to the authority.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TargetIdentity {
    kind: Option<RegistryKind>,
    location: String,
}

impl TargetIdentity {
    pub fn parse(target: impl Into<String>) -> Result<Self, SyncError> {
        let target = target.into();
        if target.trim().is_empty() {
            return Err(SyncError::InvalidRequest(
                "target identity is empty".to_string(),
            ));
        }
        if target.chars().any(char::is_whitespace) {
            return Err(SyncError::InvalidRequest(format!(
                "target identity '{target}' contains whitespace"
            )));
        }

        let Some((scheme, location)) = target.split_once(':') else {
            return Ok(Self {
                kind: None,
                location: target,
            });
        };
        let kind = RegistryKind::from_scheme(scheme).ok_or_else(|| {
            SyncError::InvalidRequest(format!(
                "target identity '{target}' has unknown registry scheme '{scheme}'"
            ))
        })?;
        if location.is_empty() {
            return Err(SyncError::InvalidRequest(format!(
                "target identity '{target}' has no location"
            )));
        }
        Ok(Self {
            kind: Some(kind),
            location: location.to_string(),
        })
    }

    /// Registry kind named by the scheme, if any.
    #[must_use]
    pub const fn kind(&self) -> Option<RegistryKind> {
        self.kind
    }

    /// The identity without its scheme.
    #[must_use]
    pub fn location(&self) -> &str {
        &self.location
    }

    /// Attach `kind` to an unqualified identity.
    ///
    /// Fails when the identity already names a different kind.
    pub fn qualified(self, kind: RegistryKind) -> Result<Self, SyncError> {
        self.require_kind(kind)?;
        Ok(Self {
            kind: Some(kind),
            location: self.location,
        })
    }

    /// Reject identities that name a registry kind other than `kind`.
    pub fn require_kind(&self, kind: RegistryKind) -> Result<(), SyncError> {
        match self.kind {
            Some(own) if own != kind => Err(SyncError::InvalidRequest(format!(
                "target '{self}' is a {own} registry, not {kind}"
            ))),
            _ => Ok(()),
        }
    }

    /// Split a `scope/name` location into its two halves.
    pub fn split_pair(&self) -> Result<(&str, &str), SyncError> {
        match self.location.split_once('/') {
            Some((scope, name)) if !scope.is_empty() && !name.is_empty() && !name.contains('/') => {
                Ok((scope, name))
            }
            _ => Err(SyncError::InvalidRequest(format!(
                "target identity '{self}' is not of the form scope/name"
            ))),
        }
    }
}

impl TryFrom<String> for TargetIdentity {
    type Error = SyncError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<TargetIdentity> for String {
    fn from(target: TargetIdentity) -> Self {
        target.to_string()
    }
}

impl fmt::Display for TargetIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            Some(kind) => write!(f, "{kind}:{}", self.location),
            None => f.write_str(&self.location),
        }
    }
}

/// A secret payload. Never printed; `Debug` shows `[REDACTED]`.
pub struct SecretValue(SecretString);

impl SecretValue {
    pub fn new(value: impl Into<String>) -> Self {
        Self(SecretString::from(value.into()))
    }

    /// Borrow the plaintext. Only registry writers should call this.
    #[must_use]
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

impl Clone for SecretValue {
    fn clone(&self) -> Self {
        Self::new(self.expose().to_owned())
    }
}

impl fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretValue([REDACTED])")
    }
}

/// One-shot request to copy a secret from the authority into a registry.
///
/// Fields are kept raw so the Export Worker validates what it receives
/// regardless of which transport delivered it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportRequest {
    pub secret_name: String,
    pub target: String,
}

impl ExportRequest {
    #[must_use]
    pub fn new(name: &SecretName, target: &TargetIdentity) -> Self {
        Self {
            secret_name: name.as_str().to_string(),
            target: target.to_string(),
        }
    }

    /// Check both fields, returning their typed forms.
    pub fn validate(&self) -> Result<(SecretName, TargetIdentity), SyncError> {
        let name = SecretName::parse(self.secret_name.clone())?;
        let target = TargetIdentity::parse(self.target.clone())?;
        Ok((name, target))
    }
}

/// Terminal result of syncing one secret name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SyncOutcome {
    /// Present before the call; nothing dispatched
    AlreadyPresent,
    /// Exported and observed within the timeout
    Synced,
    /// Dispatched but not observed before the deadline
    TimedOut,
    /// Dispatch trigger failed synchronously; never polled
    Rejected { reason: String },
}

impl SyncOutcome {
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::AlreadyPresent | Self::Synced)
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::AlreadyPresent => "already_present",
            Self::Synced => "synced",
            Self::TimedOut => "timed_out",
            Self::Rejected { .. } => "rejected",
        }
    }
}

impl fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rejected { reason } => write!(f, "rejected ({reason})"),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Outcomes of one `ensure` invocation, keyed by secret name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SyncReport {
    outcomes: BTreeMap<SecretName, SyncOutcome>,
}

impl SyncReport {
    pub fn insert(&mut self, name: SecretName, outcome: SyncOutcome) {
        self.outcomes.insert(name, outcome);
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&SyncOutcome> {
        self.outcomes
            .iter()
            .find(|(key, _)| key.as_str() == name)
            .map(|(_, outcome)| outcome)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SecretName, &SyncOutcome)> {
        self.outcomes.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Names whose outcome is a failure, in name order.
    #[must_use]
    pub fn failed(&self) -> Vec<String> {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| !outcome.is_success())
            .map(|(name, _)| name.to_string())
            .collect()
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.outcomes.values().all(SyncOutcome::is_success)
    }
}

impl FromIterator<(SecretName, SyncOutcome)> for SyncReport {
    fn from_iter<I: IntoIterator<Item = (SecretName, SyncOutcome)>>(iter: I) -> Self {
        Self {
            outcomes: iter.into_iter().collect(),
        }
    }
}

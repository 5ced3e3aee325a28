//! Kubernetes `Secret` objects as a consumer registry.
//!
//! A target `kube:namespace/secret` (or a bare `namespace/secret`) names one
//! `Secret` object; each synced secret name is a data key inside it.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use kube::api::{Patch, PatchParams, PostParams};
use kube::{Api, Client};
use std::collections::BTreeMap;
use tracing::{debug, info, instrument};

use crate::backend::ConsumerRegistry;
use crate::error::SyncError;
use crate::types::{RegistryKind, SecretName, SecretValue, TargetIdentity};

/// Field manager recorded on every write.
const FIELD_MANAGER: &str = "secret-sync";

/// Consumer registry backed by the Kubernetes API.
#[derive(Clone)]
pub struct KubeRegistry {
    client: Client,
}

impl KubeRegistry {
    #[must_use]
    pub const fn new(client: Client) -> Self {
        Self { client }
    }

    /// Connect using the in-cluster config or the local kubeconfig.
    pub async fn try_default() -> Result<Self, SyncError> {
        Ok(Self::new(Client::try_default().await?))
    }

    fn api(&self, namespace: &str) -> Api<Secret> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

/// A `Secret` carrying only `key`, used for both create and merge patch.
fn secret_with_key(metadata: ObjectMeta, key: &SecretName, value: &SecretValue) -> Secret {
    let mut data = BTreeMap::new();
    data.insert(
        key.as_str().to_string(),
        ByteString(value.expose().as_bytes().to_vec()),
    );
    Secret {
        metadata,
        data: Some(data),
        ..Secret::default()
    }
}

fn holds_key(secret: &Secret, key: &SecretName) -> bool {
    secret
        .data
        .as_ref()
        .is_some_and(|data| data.contains_key(key.as_str()))
        || secret
            .string_data
            .as_ref()
            .is_some_and(|data| data.contains_key(key.as_str()))
}

/// The `(namespace, object)` a target points at.
fn object_of(target: &TargetIdentity) -> Result<(&str, &str), SyncError> {
    target.require_kind(RegistryKind::Kube)?;
    target.split_pair()
}

#[async_trait]
impl ConsumerRegistry for KubeRegistry {
    fn name(&self) -> &'static str {
        "kubernetes"
    }

    #[instrument(skip_all, fields(target = %target, secret = %name))]
    async fn has_secret(
        &self,
        target: &TargetIdentity,
        name: &SecretName,
    ) -> Result<bool, SyncError> {
        let (namespace, object) = object_of(target)?;
        let secret = self.api(namespace).get_opt(object).await?;
        Ok(secret.is_some_and(|secret| holds_key(&secret, name)))
    }

    #[instrument(skip_all, fields(target = %target, secret = %name))]
    async fn set_secret(
        &self,
        target: &TargetIdentity,
        name: &SecretName,
        value: &SecretValue,
    ) -> Result<(), SyncError> {
        let (namespace, object) = object_of(target)?;
        let api = self.api(namespace);

        if api.get_opt(object).await?.is_none() {
            let mut labels = BTreeMap::new();
            labels.insert(
                "app.kubernetes.io/managed-by".to_string(),
                FIELD_MANAGER.to_string(),
            );
            let metadata = ObjectMeta {
                name: Some(object.to_string()),
                namespace: Some(namespace.to_string()),
                labels: Some(labels),
                ..ObjectMeta::default()
            };
            let params = PostParams {
                field_manager: Some(FIELD_MANAGER.to_string()),
                ..PostParams::default()
            };

            match api
                .create(&params, &secret_with_key(metadata, name, value))
                .await
            {
                Ok(_) => {
                    info!("Created secret object");
                    return Ok(());
                }
                // Lost a race with another export; fall through to patch.
                Err(kube::Error::Api(response)) if response.code == 409 => {
                    debug!("Secret object appeared concurrently, patching");
                }
                Err(e) => return Err(e.into()),
            }
        }

        let patch = secret_with_key(ObjectMeta::default(), name, value);
        api.patch(
            object,
            &PatchParams {
                field_manager: Some(FIELD_MANAGER.to_string()),
                ..PatchParams::default()
            },
            &Patch::Merge(&patch),
        )
        .await?;

        debug!("Patched secret key");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_with_key_holds_only_that_key() {
        let name = SecretName::parse("DB_PASS").unwrap();
        let secret = secret_with_key(ObjectMeta::default(), &name, &SecretValue::new("p1"));

        let data = secret.data.as_ref().unwrap();
        assert_eq!(data.len(), 1);
        assert_eq!(data["DB_PASS"].0, b"p1".to_vec());
        assert!(holds_key(&secret, &name));
        assert!(!holds_key(&secret, &SecretName::parse("API_KEY").unwrap()));
    }

    #[test]
    fn test_merge_patch_touches_only_data_key() {
        let name = SecretName::parse("API_KEY").unwrap();
        let patch = secret_with_key(ObjectMeta::default(), &name, &SecretValue::new("k"));
        let json = serde_json::to_value(&patch).unwrap();

        // "k" base64-encoded
        assert_eq!(json["data"]["API_KEY"], "aw==");
        assert!(json.get("stringData").is_none());
    }

    #[test]
    fn test_string_data_counts_as_present() {
        let name = SecretName::parse("DB_PASS").unwrap();
        let mut string_data = BTreeMap::new();
        string_data.insert("DB_PASS".to_string(), "p1".to_string());
        let secret = Secret {
            string_data: Some(string_data),
            ..Secret::default()
        };

        assert!(holds_key(&secret, &name));
    }

    #[test]
    fn test_dotted_key_is_stored_verbatim() {
        let name = SecretName::parse("tls.crt").unwrap();
        let secret = secret_with_key(ObjectMeta::default(), &name, &SecretValue::new("pem"));

        assert!(secret.data.as_ref().unwrap().contains_key("tls.crt"));
        assert!(holds_key(&secret, &name));
    }

    #[test]
    fn test_object_of_accepts_only_kube_targets() {
        let qualified = TargetIdentity::parse("kube:payments/svc-b").unwrap();
        assert_eq!(object_of(&qualified).unwrap(), ("payments", "svc-b"));

        let bare = TargetIdentity::parse("payments/svc-b").unwrap();
        assert_eq!(object_of(&bare).unwrap(), ("payments", "svc-b"));

        let github = TargetIdentity::parse("github:5dlabs/svc-b").unwrap();
        assert!(matches!(
            object_of(&github),
            Err(SyncError::InvalidRequest(_))
        ));
    }
}

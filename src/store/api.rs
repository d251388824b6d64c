//! ConfigMap store backed by the Kubernetes API server

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::{Api, PostParams};
use kube::Client;

use super::{ConfigMapStore, StoreError};

/// Real Kubernetes client implementation
pub struct KubeConfigMapStore {
    client: Client,
}

impl KubeConfigMapStore {
    /// Create a new store wrapping the given kube Client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str) -> Api<ConfigMap> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

/// Namespace and name of an object about to be written
fn namespaced_name(config_map: &ConfigMap) -> Result<(&str, &str), StoreError> {
    let namespace = config_map
        .metadata
        .namespace
        .as_deref()
        .ok_or_else(|| StoreError::Invalid("ConfigMap has no namespace".to_string()))?;
    let name = config_map
        .metadata
        .name
        .as_deref()
        .ok_or_else(|| StoreError::Invalid("ConfigMap has no name".to_string()))?;
    Ok((namespace, name))
}

#[async_trait]
impl ConfigMapStore for KubeConfigMapStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<ConfigMap>, StoreError> {
        self.api(namespace)
            .get_opt(name)
            .await
            .map_err(StoreError::from_kube)
    }

    async fn create(&self, config_map: &ConfigMap) -> Result<ConfigMap, StoreError> {
        let (namespace, _) = namespaced_name(config_map)?;
        self.api(namespace)
            .create(&PostParams::default(), config_map)
            .await
            .map_err(StoreError::from_kube)
    }

    async fn replace(&self, config_map: &ConfigMap) -> Result<ConfigMap, StoreError> {
        let (namespace, name) = namespaced_name(config_map)?;
        self.api(namespace)
            .replace(name, &PostParams::default(), config_map)
            .await
            .map_err(StoreError::from_kube)
    }
}

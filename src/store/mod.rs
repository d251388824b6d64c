//! Object store seam for managed ConfigMaps
//!
//! The reconciler talks to the API server only through [`ConfigMapStore`],
//! which keeps the fetch/create/replace protocol mockable in tests.

mod api;
#[cfg(test)]
pub(crate) mod memory;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;
use thiserror::Error;

#[cfg(test)]
use mockall::automock;

pub use api::KubeConfigMapStore;

/// Failures reported by the object store
#[derive(Debug, Error)]
pub enum StoreError {
    /// Create raced with another writer that created the same name
    #[error("resource already exists")]
    AlreadyExists,

    /// Replace carried a stale resourceVersion
    #[error("resource version conflict")]
    Conflict,

    /// The object handed to the store is missing a name or namespace
    #[error("invalid object: {0}")]
    Invalid(String),

    /// Any other API failure (timeout, permission, unavailable)
    #[error("kubernetes error: {0}")]
    Kube(#[source] kube::Error),
}

impl StoreError {
    /// Classify a kube error into the store taxonomy
    pub fn from_kube(error: kube::Error) -> Self {
        if let kube::Error::Api(ae) = &error {
            if ae.code == 409 {
                return if ae.reason == "AlreadyExists" {
                    Self::AlreadyExists
                } else {
                    Self::Conflict
                };
            }
        }
        Self::Kube(error)
    }

    /// Check if this error is worth retrying without a spec change
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::AlreadyExists | Self::Conflict => true,
            Self::Invalid(_) => false,
            Self::Kube(source) => !matches!(
                source,
                kube::Error::Api(ae) if (400..500).contains(&ae.code) && ae.code != 429
            ),
        }
    }
}

/// CRUD access to ConfigMaps, by namespaced name
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ConfigMapStore: Send + Sync {
    /// Fetch a ConfigMap; `Ok(None)` when it does not exist
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<ConfigMap>, StoreError>;

    /// Create a ConfigMap in its metadata namespace
    async fn create(&self, config_map: &ConfigMap) -> Result<ConfigMap, StoreError>;

    /// Replace a ConfigMap; `metadata.resourceVersion` must match the
    /// stored version or the call fails with [`StoreError::Conflict`]
    async fn replace(&self, config_map: &ConfigMap) -> Result<ConfigMap, StoreError>;
}

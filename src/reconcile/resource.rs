//! Fetch / compare / write convergence for one managed ConfigMap
//!
//! The reconciler never deletes: a missing ConfigMap is created, a drifted
//! one is replaced in place (same uid), an up-to-date one is left alone.

use std::collections::BTreeMap;
use std::sync::Arc;

use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use tracing::{debug, info, instrument, warn};

use crate::config::ReconcileSettings;
use crate::desired::Payload;
use crate::naming::{derive_name, ClusterIdentity};
use crate::registry::ConfigDescriptor;
use crate::requeue::{Requeue, StepOutcome};
use crate::store::{ConfigMapStore, StoreError};
use crate::Error;

/// Label marking ConfigMaps written by this operator
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";

/// Value of [`MANAGED_BY_LABEL`]
pub const MANAGED_BY_VALUE: &str = "logstore-operator";

/// Converges ConfigMaps through a [`ConfigMapStore`]
#[derive(Clone)]
pub struct ResourceReconciler {
    store: Arc<dyn ConfigMapStore>,
    settings: ReconcileSettings,
}

impl ResourceReconciler {
    /// Create a reconciler over the given store
    pub fn new(store: Arc<dyn ConfigMapStore>, settings: ReconcileSettings) -> Self {
        Self { store, settings }
    }

    /// Bring the ConfigMap for `descriptor` in line with `desired`.
    ///
    /// Returns `None` once the stored data equals `desired`, whether that
    /// took a create, a replace, or nothing at all.
    #[instrument(skip_all, fields(cluster = %identity, kind = ?descriptor.kind))]
    pub async fn converge(
        &self,
        identity: &ClusterIdentity,
        descriptor: &ConfigDescriptor,
        desired: Payload,
        owner: &OwnerReference,
    ) -> StepOutcome {
        let name = match derive_name(identity, &descriptor.name_suffix) {
            Ok(name) => name,
            Err(e) => {
                return Some(Requeue::error(
                    "cannot derive ConfigMap name",
                    Error::Naming(e),
                    self.settings.backoff.base,
                ))
            }
        };

        match self.store.get(&identity.namespace, &name).await {
            Ok(None) => self.create(identity, &name, desired, owner).await,
            Ok(Some(current)) => self.update(&name, current, desired, owner).await,
            Err(e) => Some(self.store_failure("fetch", &name, e)),
        }
    }

    async fn create(
        &self,
        identity: &ClusterIdentity,
        name: &str,
        desired: Payload,
        owner: &OwnerReference,
    ) -> StepOutcome {
        let config_map = ConfigMap {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(identity.namespace.clone()),
                labels: Some(BTreeMap::from([(
                    MANAGED_BY_LABEL.to_string(),
                    MANAGED_BY_VALUE.to_string(),
                )])),
                owner_references: Some(vec![owner.clone()]),
                ..Default::default()
            },
            data: Some(desired),
            ..Default::default()
        };

        match self.store.create(&config_map).await {
            Ok(_) => {
                info!(config_map = %name, "created ConfigMap");
                None
            }
            Err(e) => Some(self.store_failure("create", name, e)),
        }
    }

    async fn update(
        &self,
        name: &str,
        current: ConfigMap,
        desired: Payload,
        owner: &OwnerReference,
    ) -> StepOutcome {
        if current.data.as_ref().map_or(desired.is_empty(), |data| *data == desired) {
            debug!(config_map = %name, "ConfigMap up to date");
            return None;
        }

        if let Some(other) = foreign_controller(&current.metadata, owner) {
            warn!(
                config_map = %name,
                controller = %other.name,
                "ConfigMap has another controller"
            );
            return Some(Requeue::terminal(
                format!("ConfigMap {name} is controlled by {} {}", other.kind, other.name),
                Error::validation_for(
                    owner.name.clone(),
                    format!("ConfigMap {name} already has a controller owner"),
                ),
            ));
        }

        // Keep uid, ownerReferences and resourceVersion; only data changes
        let mut updated = current;
        updated.data = Some(desired);
        ensure_owner(&mut updated.metadata, owner);

        match self.store.replace(&updated).await {
            Ok(_) => {
                info!(config_map = %name, "updated ConfigMap");
                None
            }
            Err(e) => Some(self.store_failure("update", name, e)),
        }
    }

    fn store_failure(&self, operation: &str, name: &str, error: StoreError) -> Requeue {
        match error {
            StoreError::Conflict | StoreError::AlreadyExists => {
                warn!(
                    config_map = %name,
                    operation,
                    error = %error,
                    "ConfigMap changed concurrently, re-checking"
                );
                Requeue::after(
                    format!("ConfigMap {name} changed during {operation}"),
                    self.settings.conflict_retry,
                )
            }
            other => Requeue::error(
                format!("failed to {operation} ConfigMap {name}"),
                Error::Store(other),
                self.settings.backoff.base,
            ),
        }
    }
}

/// A controller reference on `metadata` that is not `owner`
fn foreign_controller<'a>(
    metadata: &'a ObjectMeta,
    owner: &OwnerReference,
) -> Option<&'a OwnerReference> {
    metadata
        .owner_references
        .iter()
        .flatten()
        .find(|o| o.controller == Some(true) && o.uid != owner.uid)
}

/// Add `owner` to the owner references unless an entry with its uid exists.
///
/// Callers must rule out a foreign controller first: the API server allows
/// only one controller reference per object.
fn ensure_owner(metadata: &mut ObjectMeta, owner: &OwnerReference) {
    let owners = metadata.owner_references.get_or_insert_with(Vec::new);
    if !owners.iter().any(|o| o.uid == owner.uid) {
        owners.push(owner.clone());
    }
}

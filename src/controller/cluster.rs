//! StorageCluster controller implementation
//!
//! Converts each watched StorageCluster into a [`ClusterSpec`], runs the
//! ConfigMap pipeline over it and maps the resulting signal onto a kube-rs
//! [`Action`].

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::StreamExt;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::{Api, Patch, PatchParams};
use kube::runtime::controller::{Action, Controller, Error as ControllerError};
use kube::runtime::reflector::ObjectRef;
use kube::runtime::watcher::{self, Config as WatcherConfig};
use kube::{Client, Resource, ResourceExt};
use tracing::{debug, error, info, instrument, warn};

#[cfg(test)]
use mockall::automock;

use crate::cluster::ClusterSpec;
use crate::config::{OperatorConfig, ReconcileSettings};
use crate::crd::{StorageCluster, StorageClusterStatus};
use crate::desired::TemplateBuilder;
use crate::reconcile::{Pipeline, ResourceReconciler, MANAGED_BY_LABEL, MANAGED_BY_VALUE};
use crate::registry::{ConfigRegistry, ALL_CONFIG_KINDS};
use crate::requeue::Requeue;
use crate::store::{ConfigMapStore, KubeConfigMapStore};
use crate::{Error, Result};

/// Field manager used for status patches
const FIELD_MANAGER: &str = "logstore-operator";

/// Writes the status subresource of a StorageCluster
#[cfg_attr(test, automock)]
#[async_trait]
pub trait StatusWriter: Send + Sync {
    /// Patch the status of the named StorageCluster
    async fn patch_status(
        &self,
        namespace: &str,
        name: &str,
        status: &StorageClusterStatus,
    ) -> Result<()>;
}

/// [`StatusWriter`] backed by the API server
pub struct KubeStatusWriter {
    client: Client,
}

impl KubeStatusWriter {
    /// Create a new writer wrapping the given kube Client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl StatusWriter for KubeStatusWriter {
    async fn patch_status(
        &self,
        namespace: &str,
        name: &str,
        status: &StorageClusterStatus,
    ) -> Result<()> {
        let api: Api<StorageCluster> = Api::namespaced(self.client.clone(), namespace);
        let status_patch = serde_json::json!({ "status": status });

        api.patch_status(
            name,
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Merge(&status_patch),
        )
        .await?;

        Ok(())
    }
}

/// Controller context shared across all reconciliation calls
pub struct Context {
    /// Status subresource access
    pub status: Arc<dyn StatusWriter>,
    /// Kind → descriptor mapping, built once at startup
    pub registry: Arc<ConfigRegistry>,
    /// Ordered ConfigMap steps
    pub pipeline: Pipeline,
    /// Timing policy
    pub settings: ReconcileSettings,
    /// Consecutive failed passes per `namespace/name`
    pub failures: DashMap<String, u32>,
}

impl Context {
    /// Wire a context from its collaborators.
    ///
    /// Fails if any built-in configuration kind lacks a descriptor.
    pub fn new(
        store: Arc<dyn ConfigMapStore>,
        status: Arc<dyn StatusWriter>,
        registry: Arc<ConfigRegistry>,
        settings: ReconcileSettings,
    ) -> Result<Self> {
        registry.ensure_registered(ALL_CONFIG_KINDS)?;
        let reconciler = ResourceReconciler::new(store, settings);
        let pipeline =
            Pipeline::from_registry(&registry, Arc::new(TemplateBuilder), reconciler, settings)?;

        Ok(Self {
            status,
            registry,
            pipeline,
            settings,
            failures: DashMap::new(),
        })
    }

    /// Context talking to the API server through `client`
    pub fn from_client(client: Client, settings: ReconcileSettings) -> Result<Self> {
        Self::new(
            Arc::new(KubeConfigMapStore::new(client.clone())),
            Arc::new(KubeStatusWriter::new(client)),
            Arc::new(ConfigRegistry::standard()?),
            settings,
        )
    }

    /// Drop the failure count of a cluster
    pub fn forget(&self, key: &str) {
        self.failures.remove(key);
    }

    /// Write `status` unless the resource already carries it.
    ///
    /// Status is informational: a failed patch is logged, never fatal.
    async fn record_status(&self, cluster: &StorageCluster, status: StorageClusterStatus) {
        if cluster.status.as_ref() == Some(&status) {
            return;
        }
        let Some(namespace) = cluster.namespace() else {
            return;
        };
        if let Err(e) = self
            .status
            .patch_status(&namespace, &cluster.name_any(), &status)
            .await
        {
            warn!(error = %e, "failed to update StorageCluster status");
        }
    }
}

/// Key of the failure counter for one StorageCluster
fn failure_key(namespace: Option<&str>, name: &str) -> String {
    format!("{}/{}", namespace.unwrap_or_default(), name)
}

fn object_key(cluster: &StorageCluster) -> String {
    failure_key(cluster.namespace().as_deref(), &cluster.name_any())
}

/// Reconcile a StorageCluster resource
///
/// Converged passes requeue after the resync interval. Expected races
/// requeue after the signal's delay. Error-backed signals are returned as
/// `Err` so [`error_policy`] applies backoff, and terminal ones wait for
/// the resource to change. Every pass that does not fail ends the
/// cluster's failure streak.
#[instrument(skip(cluster, ctx), fields(cluster = %cluster.name_any()))]
pub async fn reconcile(cluster: Arc<StorageCluster>, ctx: Arc<Context>) -> Result<Action> {
    let key = object_key(&cluster);
    if cluster.metadata.deletion_timestamp.is_some() {
        debug!("StorageCluster is being deleted");
        ctx.forget(&key);
        return Ok(Action::await_change());
    }

    let action = reconcile_pass(&cluster, &ctx).await?;
    ctx.forget(&key);
    Ok(action)
}

async fn reconcile_pass(cluster: &StorageCluster, ctx: &Context) -> Result<Action> {
    let generation = cluster.metadata.generation;
    debug!(?generation, "reconciling StorageCluster");

    let spec = match ClusterSpec::from_resource(cluster) {
        Ok(spec) => spec,
        Err(e) => {
            warn!(error = %e, "StorageCluster validation failed");
            let status = StorageClusterStatus::failed(generation, e.to_string());
            ctx.record_status(cluster, status).await;
            return Ok(Action::await_change());
        }
    };

    let owner = cluster.controller_owner_ref(&()).ok_or_else(|| {
        Error::validation_for(object_key(cluster), "StorageCluster has no uid yet")
    })?;

    match ctx.pipeline.run(&spec, &owner).await {
        None => {
            let status = StorageClusterStatus::converged(generation);
            ctx.record_status(cluster, status).await;
            debug!("StorageCluster converged");
            Ok(Action::requeue(ctx.settings.resync_interval))
        }
        Some(signal) if signal.terminal => {
            warn!(reason = %signal, "reconciliation blocked until StorageCluster changes");
            let status = StorageClusterStatus::failed(generation, signal.to_string());
            ctx.record_status(cluster, status).await;
            Ok(Action::await_change())
        }
        Some(Requeue {
            reason,
            error: Some(error),
            ..
        }) => {
            warn!(%reason, "reconciliation step failed");
            let status = StorageClusterStatus::failed(generation, format!("{reason}: {error}"));
            ctx.record_status(cluster, status).await;
            Err(error)
        }
        Some(signal) => {
            info!(reason = %signal.reason, "requeueing StorageCluster");
            let delay = signal.delay.unwrap_or(ctx.settings.conflict_retry);
            Ok(Action::requeue(delay))
        }
    }
}

/// Error policy for the controller
///
/// Backs off exponentially per StorageCluster until a pass succeeds or
/// the cluster is deleted.
pub fn error_policy(cluster: Arc<StorageCluster>, error: &Error, ctx: Arc<Context>) -> Action {
    let key = object_key(&cluster);
    let previous = {
        let mut count = ctx.failures.entry(key.clone()).or_insert(0);
        let previous = *count;
        *count = previous.saturating_add(1);
        previous
    };
    let delay = ctx.settings.backoff.delay(previous);

    error!(
        ?error,
        cluster = %key,
        kind = ?error.kind(),
        retryable = error.is_retryable(),
        failures = previous.saturating_add(1),
        retry_secs = delay.as_secs(),
        "reconciliation failed"
    );

    Action::requeue(delay)
}

type ReconcileResult = std::result::Result<
    (ObjectRef<StorageCluster>, Action),
    ControllerError<Error, watcher::Error>,
>;

/// Log one controller result; a requeue that fired for a cluster deleted
/// in the meantime drops its failure count.
fn observe_result(ctx: &Context, result: ReconcileResult) {
    match result {
        Ok((object, action)) => {
            debug!(%object, ?action, "StorageCluster reconciliation completed");
        }
        Err(ControllerError::ObjectNotFound(object)) => {
            debug!(%object, "StorageCluster no longer exists");
            ctx.forget(&failure_key(object.namespace.as_deref(), &object.name));
        }
        Err(e) => {
            error!(error = ?e, "StorageCluster reconciliation error");
        }
    }
}

/// Run the StorageCluster controller until a shutdown signal arrives
///
/// Managed ConfigMaps are watched as owned objects, so editing or deleting
/// one re-triggers its StorageCluster.
pub async fn run(client: Client, config: &OperatorConfig) -> Result<()> {
    let settings = config.settings()?;
    let ctx = Arc::new(Context::from_client(client.clone(), settings)?);

    let clusters: Api<StorageCluster> = Api::all(client.clone());
    let config_maps: Api<ConfigMap> = Api::all(client);
    let watcher_config = WatcherConfig::default().timeout(config.watch_timeout_secs);
    let managed_selector = format!("{MANAGED_BY_LABEL}={MANAGED_BY_VALUE}");

    info!(
        kinds = ctx.registry.len(),
        resync_secs = settings.resync_interval.as_secs(),
        "starting StorageCluster controller"
    );

    let results_ctx = ctx.clone();
    Controller::new(clusters, watcher_config.clone())
        .owns(config_maps, watcher_config.labels(&managed_selector))
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|result| {
            let ctx = results_ctx.clone();
            async move { observe_result(&ctx, result) }
        })
        .await;

    info!("StorageCluster controller stopped");
    Ok(())
}

//! Ordered reconciliation pass over every registered configuration kind
//!
//! Steps run strictly in registration order. The first step that returns a
//! signal ends the pass; later steps are picked up on the next pass, which
//! always starts again from the top.

use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use tracing::{debug, instrument, warn};

use super::resource::ResourceReconciler;
use crate::cluster::ClusterSpec;
use crate::config::ReconcileSettings;
use crate::desired::PayloadBuilder;
use crate::registry::{ConfigDescriptor, ConfigKind, ConfigRegistry};
use crate::requeue::{Requeue, StepOutcome};
use crate::{Error, Result};

/// One (descriptor, builder) pair bound to the resource reconciler
#[derive(Clone)]
pub struct ConfigStep {
    descriptor: ConfigDescriptor,
    builder: Arc<dyn PayloadBuilder>,
}

impl ConfigStep {
    /// Create a step rendering `descriptor` with `builder`
    pub fn new(descriptor: ConfigDescriptor, builder: Arc<dyn PayloadBuilder>) -> Self {
        Self {
            descriptor,
            builder,
        }
    }

    /// Kind this step converges
    pub fn kind(&self) -> ConfigKind {
        self.descriptor.kind
    }

    async fn run(
        &self,
        reconciler: &ResourceReconciler,
        cluster: &ClusterSpec,
        owner: &OwnerReference,
        retry_delay: Duration,
    ) -> StepOutcome {
        let payload = match self.builder.build(&self.descriptor, cluster) {
            Ok(payload) => payload,
            Err(e) if e.is_retryable() => {
                return Some(Requeue::error(
                    format!("cannot render {:?}", self.kind()),
                    e,
                    retry_delay,
                ))
            }
            // Malformed overrides stay malformed until the resource is edited
            Err(e) => {
                return Some(Requeue::terminal(
                    format!("cannot render {:?}", self.kind()),
                    e,
                ))
            }
        };

        reconciler
            .converge(&cluster.identity, &self.descriptor, payload, owner)
            .await
    }
}

/// Runs the configured steps for one cluster under a per-pass deadline
#[derive(Clone)]
pub struct Pipeline {
    steps: Vec<ConfigStep>,
    reconciler: ResourceReconciler,
    settings: ReconcileSettings,
}

impl Pipeline {
    /// Build a pipeline for `kinds`, in the given order.
    ///
    /// Every kind must be registered; an unknown kind fails here, at
    /// startup, instead of during a reconcile.
    pub fn new(
        registry: &ConfigRegistry,
        kinds: &[ConfigKind],
        builder: Arc<dyn PayloadBuilder>,
        reconciler: ResourceReconciler,
        settings: ReconcileSettings,
    ) -> Result<Self> {
        let steps = kinds
            .iter()
            .map(|kind| {
                registry
                    .lookup(*kind)
                    .map(|descriptor| ConfigStep::new(descriptor.clone(), builder.clone()))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            steps,
            reconciler,
            settings,
        })
    }

    /// Pipeline over every registered kind, in registration order
    pub fn from_registry(
        registry: &ConfigRegistry,
        builder: Arc<dyn PayloadBuilder>,
        reconciler: ResourceReconciler,
        settings: ReconcileSettings,
    ) -> Result<Self> {
        Self::new(registry, registry.kinds(), builder, reconciler, settings)
    }

    /// Kinds converged by this pipeline, in execution order
    pub fn kinds(&self) -> Vec<ConfigKind> {
        self.steps.iter().map(ConfigStep::kind).collect()
    }

    /// Run one reconciliation pass.
    ///
    /// Returns the first signal any step raises, or `None` when every
    /// managed ConfigMap is converged. When the pass deadline expires the
    /// in-flight store call is dropped; steps that already wrote are not
    /// rolled back.
    #[instrument(skip_all, fields(cluster = %cluster.identity))]
    pub async fn run(&self, cluster: &ClusterSpec, owner: &OwnerReference) -> StepOutcome {
        let timeout = self.settings.pass_timeout;
        match tokio::time::timeout(timeout, self.run_steps(cluster, owner)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(timeout_secs = timeout.as_secs(), "reconciliation pass timed out");
                Some(Requeue::error(
                    "reconciliation pass timed out",
                    Error::DeadlineExceeded { timeout },
                    self.settings.backoff.base,
                ))
            }
        }
    }

    async fn run_steps(&self, cluster: &ClusterSpec, owner: &OwnerReference) -> StepOutcome {
        for step in &self.steps {
            if let Some(signal) = step
                .run(&self.reconciler, cluster, owner, self.settings.backoff.base)
                .await
            {
                debug!(kind = ?step.kind(), reason = %signal.reason, "step requested requeue");
                return Some(signal);
            }
        }
        None
    }
}

//! Per-pass snapshot of a StorageCluster
//!
//! The controller turns the watched custom resource into a [`ClusterSpec`]
//! once per pass; everything downstream reads only the snapshot.

use std::collections::BTreeMap;

use kube::ResourceExt;

use crate::crd::StorageCluster;
use crate::naming::ClusterIdentity;
use crate::registry::ConfigKind;
use crate::{Error, Result};

/// Shard count used when the cluster leaves it unset
pub const DEFAULT_SHARD_COUNT: u32 = 1;

/// Immutable view of the desired cluster configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterSpec {
    /// Name and namespace of the owning resource
    pub identity: ClusterIdentity,
    /// Shards per storage node
    pub shard_count: Option<u32>,
    /// Raw JSON override documents keyed by configuration kind
    pub overrides: BTreeMap<ConfigKind, String>,
}

impl ClusterSpec {
    /// Snapshot with no shard count and no overrides
    pub fn new(identity: ClusterIdentity) -> Self {
        Self {
            identity,
            shard_count: None,
            overrides: BTreeMap::new(),
        }
    }

    /// Set the shard count
    pub fn with_shard_count(mut self, shard_count: u32) -> Self {
        self.shard_count = Some(shard_count);
        self
    }

    /// Set the raw override document for a kind
    pub fn with_override(mut self, kind: ConfigKind, raw: impl Into<String>) -> Self {
        self.overrides.insert(kind, raw.into());
        self
    }

    /// Shard count with the default applied
    pub fn effective_shard_count(&self) -> u32 {
        self.shard_count.unwrap_or(DEFAULT_SHARD_COUNT)
    }

    /// Raw override document for a kind, if any
    pub fn override_for(&self, kind: ConfigKind) -> Option<&str> {
        self.overrides.get(&kind).map(String::as_str)
    }

    /// Build the snapshot from a watched StorageCluster
    pub fn from_resource(cluster: &StorageCluster) -> Result<Self> {
        let name = cluster.name_any();
        let namespace = cluster
            .namespace()
            .ok_or_else(|| Error::validation_for(&name, "StorageCluster must be namespaced"))?;

        let shard_count = cluster
            .spec
            .config
            .n_shards
            .map(|n| {
                u32::try_from(n)
                    .ok()
                    .filter(|n| *n >= 1)
                    .ok_or_else(|| {
                        Error::validation_for(&name, format!("nShards must be at least 1, got {n}"))
                    })
            })
            .transpose()?;

        let mut overrides = BTreeMap::new();
        if let Some(doc) = cluster
            .spec
            .config
            .log_device_config
            .as_ref()
            .filter(|v| !v.is_null())
        {
            let raw = serde_json::to_string(doc)
                .map_err(|e| Error::serialization(format!("logDeviceConfig: {e}")))?;
            overrides.insert(ConfigKind::LogDeviceConfig, raw);
        }

        Ok(Self {
            identity: ClusterIdentity::new(name, namespace),
            shard_count,
            overrides,
        })
    }
}

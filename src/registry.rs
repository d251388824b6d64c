//! Configuration kind registry
//!
//! Maps each logical configuration kind to the naming and storage-key
//! conventions of the ConfigMap that carries it. The registry is built once
//! at startup and shared read-only across controllers via `Arc<ConfigRegistry>`.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::info;

use crate::{Error, Result};

/// Default log-device configuration, merged with user overrides
const LOGDEVICE_TEMPLATE: &str = include_str!("../templates/logdevice.json");

/// Logical configuration kinds managed by the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ConfigKind {
    /// Log-device server/client configuration document
    LogDeviceConfig,
    /// Number of shards per storage node
    ShardConfig,
}

/// All ConfigKind variants for iteration.
pub const ALL_CONFIG_KINDS: &[ConfigKind] = &[ConfigKind::LogDeviceConfig, ConfigKind::ShardConfig];

/// A scalar cluster field rendered into its own ConfigMap key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarField {
    /// `spec.config.nShards`
    ShardCount,
}

/// Where a scalar field is mirrored in the generated payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScalarMirror {
    /// Which cluster field is mirrored
    pub field: ScalarField,
    /// Data key receiving the decimal rendering
    pub key: String,
}

/// Naming and storage conventions for one configuration kind
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigDescriptor {
    /// The kind this descriptor belongs to
    pub kind: ConfigKind,
    /// Suffix appended to the cluster name to form the ConfigMap name
    pub name_suffix: String,
    /// Data key holding the serialized, merged JSON document
    pub storage_key: String,
    /// Template that user overrides are merged into; `None` for kinds
    /// that carry no JSON document
    pub default_template: Option<Value>,
    /// Scalar field rendered alongside (or instead of) the JSON document
    pub mirror: Option<ScalarMirror>,
}

impl ConfigDescriptor {
    /// Descriptor for the log-device configuration document
    pub fn logdevice() -> Result<Self> {
        let template: Value = serde_json::from_str(LOGDEVICE_TEMPLATE)
            .map_err(|e| Error::serialization(format!("invalid logdevice template: {e}")))?;
        Ok(Self {
            kind: ConfigKind::LogDeviceConfig,
            name_suffix: "logdevice-config".to_string(),
            storage_key: "config.json".to_string(),
            default_template: Some(template),
            mirror: None,
        })
    }

    /// Descriptor for the shard count
    pub fn shard_count() -> Self {
        Self {
            kind: ConfigKind::ShardConfig,
            name_suffix: "nshards".to_string(),
            storage_key: "NSHARDS".to_string(),
            default_template: None,
            mirror: Some(ScalarMirror {
                field: ScalarField::ShardCount,
                key: "NSHARDS".to_string(),
            }),
        }
    }
}

/// Immutable kind → descriptor mapping.
#[derive(Debug, Clone)]
pub struct ConfigRegistry {
    entries: BTreeMap<ConfigKind, ConfigDescriptor>,
    order: Vec<ConfigKind>,
}

impl ConfigRegistry {
    /// Start building a registry
    pub fn builder() -> ConfigRegistryBuilder {
        ConfigRegistryBuilder::default()
    }

    /// Registry with every built-in kind, in reconciliation order
    pub fn standard() -> Result<Self> {
        let registry = Self::builder()
            .register(ConfigDescriptor::logdevice()?)
            .register(ConfigDescriptor::shard_count())
            .build()?;
        info!(kinds = registry.len(), "config registry populated");
        Ok(registry)
    }

    /// Look up the descriptor for a kind.
    ///
    /// Never falls back to a default: an unregistered kind is a wiring defect.
    pub fn lookup(&self, kind: ConfigKind) -> Result<&ConfigDescriptor> {
        self.entries
            .get(&kind)
            .ok_or(Error::UnknownConfigKind { kind })
    }

    /// Fail unless every given kind is registered.
    ///
    /// Called at startup so missing descriptors surface before the first
    /// reconcile rather than during one.
    pub fn ensure_registered(&self, kinds: &[ConfigKind]) -> Result<()> {
        kinds.iter().try_for_each(|kind| self.lookup(*kind).map(|_| ()))
    }

    /// Registered kinds in registration order
    pub fn kinds(&self) -> &[ConfigKind] {
        &self.order
    }

    /// Number of registered kinds
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// True if nothing was registered
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Append-only builder; the only way to populate a [`ConfigRegistry`].
#[derive(Debug, Default)]
pub struct ConfigRegistryBuilder {
    descriptors: Vec<ConfigDescriptor>,
}

impl ConfigRegistryBuilder {
    /// Add a descriptor
    pub fn register(mut self, descriptor: ConfigDescriptor) -> Self {
        self.descriptors.push(descriptor);
        self
    }

    /// Freeze the registry, rejecting duplicate kinds
    pub fn build(self) -> Result<ConfigRegistry> {
        let mut entries = BTreeMap::new();
        let mut order = Vec::with_capacity(self.descriptors.len());
        for descriptor in self.descriptors {
            let kind = descriptor.kind;
            if entries.insert(kind, descriptor).is_some() {
                return Err(Error::DuplicateConfigKind { kind });
            }
            order.push(kind);
        }
        Ok(ConfigRegistry { entries, order })
    }
}

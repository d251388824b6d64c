//! StorageCluster Custom Resource Definition
//!
//! A StorageCluster describes one log-storage cluster: how many shards each
//! storage node carries and which log-device settings deviate from the
//! operator's defaults.

use kube::CustomResource;
use schemars::gen::SchemaGenerator;
use schemars::schema::{InstanceType, Schema, SchemaObject};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Specification for a StorageCluster
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "logstore.dev",
    version = "v1alpha1",
    kind = "StorageCluster",
    plural = "storageclusters",
    shortname = "stc",
    status = "StorageClusterStatus",
    namespaced,
    printcolumn = r#"{"name":"Shards","type":"integer","jsonPath":".spec.config.nShards"}"#,
    printcolumn = r#"{"name":"Error","type":"string","jsonPath":".status.lastError"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct StorageClusterSpec {
    /// Runtime configuration rendered into managed ConfigMaps
    #[serde(default)]
    pub config: StorageConfigSpec,
}

/// Runtime configuration of the storage engine
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StorageConfigSpec {
    /// Shards per storage node; defaults to 1
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n_shards: Option<i32>,

    /// Log-device settings merged over the default configuration.
    ///
    /// Free-form JSON: nested objects merge key by key, any other value
    /// replaces the default outright.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "free_form_object")]
    pub log_device_config: Option<serde_json::Value>,
}

/// Status for a StorageCluster
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StorageClusterStatus {
    /// Generation of the spec evaluated by the last pass, whether it converged or failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// Reason of the last failed pass, cleared once a pass converges
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl StorageClusterStatus {
    /// Status recording a converged pass
    pub fn converged(generation: Option<i64>) -> Self {
        Self {
            observed_generation: generation,
            last_error: None,
        }
    }

    /// Status recording a failed pass
    pub fn failed(generation: Option<i64>, error: impl Into<String>) -> Self {
        Self {
            observed_generation: generation,
            last_error: Some(error.into()),
        }
    }
}

/// Schema for fields holding arbitrary JSON objects
fn free_form_object(_: &mut SchemaGenerator) -> Schema {
    let mut schema = SchemaObject {
        instance_type: Some(InstanceType::Object.into()),
        ..Default::default()
    };
    schema.extensions.insert(
        "x-kubernetes-preserve-unknown-fields".to_string(),
        serde_json::Value::Bool(true),
    );
    Schema::Object(schema)
}

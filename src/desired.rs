//! Desired-state generation
//!
//! Renders the ConfigMap payload for one configuration kind: the kind's
//! default template with the cluster's override merged in, plus any scalar
//! field mirrored into its own key.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::cluster::ClusterSpec;
use crate::registry::{ConfigDescriptor, ScalarField};
use crate::{Error, Result};

/// ConfigMap data: key → string content
pub type Payload = BTreeMap<String, String>;

/// Produces the desired payload for a descriptor.
///
/// Implementations must be pure: the same descriptor and cluster always
/// yield the same payload.
pub trait PayloadBuilder: Send + Sync {
    /// Render the payload for `descriptor` from `cluster`
    fn build(&self, descriptor: &ConfigDescriptor, cluster: &ClusterSpec) -> Result<Payload>;
}

/// Template + override merge, with scalar mirroring.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateBuilder;

impl PayloadBuilder for TemplateBuilder {
    fn build(&self, descriptor: &ConfigDescriptor, cluster: &ClusterSpec) -> Result<Payload> {
        let mut payload = Payload::new();

        let overlay = cluster
            .override_for(descriptor.kind)
            .map(|raw| parse_override(descriptor, raw))
            .transpose()?;

        match (&descriptor.default_template, overlay) {
            (Some(template), overlay) => {
                let mut merged = template.clone();
                if let Some(overlay) = overlay {
                    merge_json(&mut merged, overlay);
                }
                let rendered = serde_json::to_string_pretty(&merged)
                    .map_err(|e| Error::merge(descriptor.kind, e.to_string()))?;
                payload.insert(descriptor.storage_key.clone(), rendered);
            }
            (None, Some(_)) => {
                return Err(Error::merge(
                    descriptor.kind,
                    "kind has no configuration document to override",
                ));
            }
            (None, None) => {}
        }

        if let Some(mirror) = &descriptor.mirror {
            let value = match mirror.field {
                ScalarField::ShardCount => cluster.effective_shard_count(),
            };
            payload.insert(mirror.key.clone(), value.to_string());
        }

        Ok(payload)
    }
}

/// Parse a raw override document; the root must be a JSON object.
fn parse_override(descriptor: &ConfigDescriptor, raw: &str) -> Result<Value> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| Error::merge(descriptor.kind, format!("invalid JSON: {e}")))?;
    if !value.is_object() {
        return Err(Error::merge(
            descriptor.kind,
            "override document must be a JSON object",
        ));
    }
    Ok(value)
}

/// Deep-merge `overlay` into `base`.
///
/// Objects on both sides merge key by key; any other overlay value
/// (scalar, array, null) replaces the base value at that path. Arrays are
/// never concatenated or merged element-wise.
pub fn merge_json(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge_json(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::naming::ClusterIdentity;
    use crate::registry::{ConfigKind, ConfigRegistry};
    use proptest::prelude::*;
    use serde_json::json;

    fn cluster() -> ClusterSpec {
        ClusterSpec::new(ClusterIdentity::new("demo", "default"))
    }

    fn registry() -> ConfigRegistry {
        ConfigRegistry::standard().unwrap()
    }

    fn rendered_config(payload: &Payload) -> Value {
        serde_json::from_str(&payload["config.json"]).unwrap()
    }

    // =========================================================================
    // merge_json
    // =========================================================================

    #[test]
    fn merge_keeps_keys_absent_from_overlay() {
        let mut base = json!({"a": 1, "b": {"c": 2, "d": 3}, "e": [1, 2]});
        merge_json(&mut base, json!({"b": {"c": 20}}));
        assert_eq!(base, json!({"a": 1, "b": {"c": 20, "d": 3}, "e": [1, 2]}));
    }

    #[test]
    fn merge_adds_new_keys() {
        let mut base = json!({"a": 1});
        merge_json(&mut base, json!({"b": {"nested": true}}));
        assert_eq!(base, json!({"a": 1, "b": {"nested": true}}));
    }

    #[test]
    fn merge_replaces_arrays_wholesale() {
        let mut base = json!({"nodeset": [1, 2, 3]});
        merge_json(&mut base, json!({"nodeset": [9]}));
        assert_eq!(base, json!({"nodeset": [9]}));
    }

    #[test]
    fn merge_scalar_over_object_replaces() {
        let mut base = json!({"zookeeper": {"timeout": "30s"}});
        merge_json(&mut base, json!({"zookeeper": "disabled"}));
        assert_eq!(base, json!({"zookeeper": "disabled"}));
    }

    #[test]
    fn merge_object_over_scalar_replaces() {
        let mut base = json!({"cluster": "logdevice"});
        merge_json(&mut base, json!({"cluster": {"name": "x"}}));
        assert_eq!(base, json!({"cluster": {"name": "x"}}));
    }

    #[test]
    fn merge_null_overrides_value() {
        let mut base = json!({"a": 1});
        merge_json(&mut base, json!({"a": null}));
        assert_eq!(base, json!({"a": null}));
    }

    /// Top-level keys of the template mixed with fresh ones, so generated
    /// overlays both collide with and extend the defaults
    fn overlay_key() -> impl Strategy<Value = String> {
        prop_oneof![
            prop::sample::select(vec![
                "server_settings",
                "client_settings",
                "cluster",
                "internal_logs",
                "metadata_logs",
                "zookeeper",
                "enable-node-self-registration",
                "timeout",
            ])
            .prop_map(str::to_string),
            "[a-z_-]{1,12}",
        ]
    }

    fn overlay_leaf() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::from),
            any::<i64>().prop_map(Value::from),
            "[a-z0-9]{0,8}".prop_map(Value::from),
            prop::collection::vec("[a-z]{0,4}", 0..3).prop_map(|items| json!(items)),
        ]
    }

    fn overlay_object(inner: impl Strategy<Value = Value>) -> impl Strategy<Value = Value> {
        prop::collection::btree_map(overlay_key(), inner, 0..4)
            .prop_map(|entries| Value::Object(entries.into_iter().collect()))
    }

    fn overlay_document() -> impl Strategy<Value = Value> {
        overlay_object(overlay_leaf().prop_recursive(3, 24, 4, |inner| overlay_object(inner)))
    }

    /// Check `merged` against `base` and `overlay` at one path: keys only in
    /// `base` are untouched, non-object overlay values win outright.
    fn check_merged(
        base: &Value,
        overlay: &Value,
        merged: &Value,
    ) -> std::result::Result<(), TestCaseError> {
        match (base, overlay) {
            (Value::Object(base), Value::Object(overlay)) => {
                for (key, value) in base {
                    if !overlay.contains_key(key) {
                        prop_assert_eq!(&merged[key], value, "untouched key {} changed", key);
                    }
                }
                for (key, value) in overlay {
                    let base_value = base.get(key).unwrap_or(&Value::Null);
                    check_merged(base_value, value, &merged[key])?;
                }
                Ok(())
            }
            _ => {
                prop_assert_eq!(merged, overlay);
                Ok(())
            }
        }
    }

    proptest! {
        #[test]
        fn merge_is_non_destructive_and_overlay_leaves_win(overlay in overlay_document()) {
            let template = registry()
                .lookup(ConfigKind::LogDeviceConfig)
                .unwrap()
                .default_template
                .clone()
                .unwrap();

            let mut merged = template.clone();
            merge_json(&mut merged, overlay.clone());

            check_merged(&template, &overlay, &merged)?;
        }
    }

    // =========================================================================
    // TemplateBuilder
    // =========================================================================

    #[test]
    fn logdevice_without_override_renders_template() {
        let registry = registry();
        let descriptor = registry.lookup(ConfigKind::LogDeviceConfig).unwrap();
        let payload = TemplateBuilder.build(descriptor, &cluster()).unwrap();

        assert_eq!(payload.len(), 1);
        assert_eq!(
            rendered_config(&payload),
            descriptor.default_template.clone().unwrap()
        );
    }

    #[test]
    fn logdevice_override_changes_only_overridden_path() {
        let registry = registry();
        let descriptor = registry.lookup(ConfigKind::LogDeviceConfig).unwrap();
        let cluster = cluster().with_override(
            ConfigKind::LogDeviceConfig,
            r#"{"server_settings": {"enable-node-self-registration": "false"}}"#,
        );

        let config = rendered_config(&TemplateBuilder.build(descriptor, &cluster).unwrap());
        let template = descriptor.default_template.as_ref().unwrap();

        assert_eq!(
            config["server_settings"]["enable-node-self-registration"],
            "false"
        );
        assert_eq!(
            config["server_settings"]["enable-nodes-configuration-manager"],
            template["server_settings"]["enable-nodes-configuration-manager"]
        );
        assert_eq!(config["client_settings"], template["client_settings"]);
        assert_eq!(config["zookeeper"], template["zookeeper"]);
    }

    #[test]
    fn shard_count_defaults_to_one() {
        let registry = registry();
        let descriptor = registry.lookup(ConfigKind::ShardConfig).unwrap();
        let payload = TemplateBuilder.build(descriptor, &cluster()).unwrap();
        assert_eq!(payload, Payload::from([("NSHARDS".to_string(), "1".to_string())]));
    }

    #[test]
    fn shard_count_is_rendered_in_decimal() {
        let registry = registry();
        let descriptor = registry.lookup(ConfigKind::ShardConfig).unwrap();
        let cluster = cluster()
            .with_shard_count(2)
            .with_override(ConfigKind::LogDeviceConfig, r#"{"cluster": "x"}"#);
        let payload = TemplateBuilder.build(descriptor, &cluster).unwrap();
        assert_eq!(payload["NSHARDS"], "2");
    }

    #[test]
    fn malformed_override_is_a_merge_error() {
        let registry = registry();
        let descriptor = registry.lookup(ConfigKind::LogDeviceConfig).unwrap();
        let cluster = cluster().with_override(ConfigKind::LogDeviceConfig, "{not json");

        let err = TemplateBuilder.build(descriptor, &cluster).unwrap_err();
        assert!(matches!(
            err,
            Error::Merge {
                kind: ConfigKind::LogDeviceConfig,
                ..
            }
        ));
        assert!(err.to_string().contains("invalid JSON"));
    }

    #[test]
    fn non_object_override_is_a_merge_error() {
        let registry = registry();
        let descriptor = registry.lookup(ConfigKind::LogDeviceConfig).unwrap();
        let cluster = cluster().with_override(ConfigKind::LogDeviceConfig, "[1, 2]");

        let err = TemplateBuilder.build(descriptor, &cluster).unwrap_err();
        assert!(err.to_string().contains("JSON object"));
    }

    #[test]
    fn override_for_documentless_kind_is_a_merge_error() {
        let registry = registry();
        let descriptor = registry.lookup(ConfigKind::ShardConfig).unwrap();
        let cluster = cluster().with_override(ConfigKind::ShardConfig, "{}");

        let err = TemplateBuilder.build(descriptor, &cluster).unwrap_err();
        assert_eq!(err.kind(), Some(ConfigKind::ShardConfig));
    }

    #[test]
    fn rendering_is_deterministic() {
        let registry = registry();
        let descriptor = registry.lookup(ConfigKind::LogDeviceConfig).unwrap();
        let cluster = cluster().with_override(
            ConfigKind::LogDeviceConfig,
            r#"{"b": 1, "a": {"z": 1, "y": 2}}"#,
        );
        assert_eq!(
            TemplateBuilder.build(descriptor, &cluster).unwrap(),
            TemplateBuilder.build(descriptor, &cluster).unwrap()
        );
    }
}

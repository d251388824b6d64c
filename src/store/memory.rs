//! In-memory ConfigMap store for multi-pass reconciliation tests
//!
//! Assigns uids and resource versions the way the API server does, so tests
//! can observe identity preservation and optimistic-concurrency conflicts.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;

use super::{ConfigMapStore, StoreError};

type Key = (String, String);

#[derive(Default)]
pub(crate) struct InMemoryStore {
    objects: Mutex<BTreeMap<Key, ConfigMap>>,
    next_uid: AtomicU64,
    next_version: AtomicU64,
    creates: AtomicU64,
    replaces: AtomicU64,
    interfere_next_replace: AtomicBool,
}

fn key_of(config_map: &ConfigMap) -> Result<Key, StoreError> {
    match (&config_map.metadata.namespace, &config_map.metadata.name) {
        (Some(ns), Some(name)) => Ok((ns.clone(), name.clone())),
        _ => Err(StoreError::Invalid("missing namespace or name".to_string())),
    }
}

impl InMemoryStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn bump_version(&self) -> String {
        (self.next_version.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }

    /// Snapshot of a stored object
    pub(crate) fn object(&self, namespace: &str, name: &str) -> Option<ConfigMap> {
        self.objects
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    pub(crate) fn uid(&self, namespace: &str, name: &str) -> Option<String> {
        self.object(namespace, name).and_then(|cm| cm.metadata.uid)
    }

    pub(crate) fn len(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    pub(crate) fn creates(&self) -> u64 {
        self.creates.load(Ordering::SeqCst)
    }

    pub(crate) fn replaces(&self) -> u64 {
        self.replaces.load(Ordering::SeqCst)
    }

    /// Simulate another writer editing the object right before our next
    /// replace lands: its data gains `key=value` and its version moves on.
    pub(crate) fn interfere_with_next_replace(&self) {
        self.interfere_next_replace.store(true, Ordering::SeqCst);
    }

    /// Edit an object out-of-band, as a user with kubectl would
    pub(crate) fn external_edit(&self, namespace: &str, name: &str, key: &str, value: &str) {
        let version = self.bump_version();
        let mut objects = self.objects.lock().unwrap();
        if let Some(cm) = objects.get_mut(&(namespace.to_string(), name.to_string())) {
            cm.data
                .get_or_insert_with(BTreeMap::new)
                .insert(key.to_string(), value.to_string());
            cm.metadata.resource_version = Some(version);
        }
    }
}

#[async_trait]
impl ConfigMapStore for InMemoryStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<ConfigMap>, StoreError> {
        Ok(self.object(namespace, name))
    }

    async fn create(&self, config_map: &ConfigMap) -> Result<ConfigMap, StoreError> {
        let key = key_of(config_map)?;
        let uid = format!("uid-{}", self.next_uid.fetch_add(1, Ordering::SeqCst));
        let version = self.bump_version();

        let mut objects = self.objects.lock().unwrap();
        if objects.contains_key(&key) {
            return Err(StoreError::AlreadyExists);
        }
        let mut stored = config_map.clone();
        stored.metadata.uid = Some(uid);
        stored.metadata.resource_version = Some(version);
        objects.insert(key, stored.clone());
        self.creates.fetch_add(1, Ordering::SeqCst);
        Ok(stored)
    }

    async fn replace(&self, config_map: &ConfigMap) -> Result<ConfigMap, StoreError> {
        let key = key_of(config_map)?;

        if self.interfere_next_replace.swap(false, Ordering::SeqCst) {
            self.external_edit(&key.0, &key.1, "external-edit", "true");
        }

        let version = self.bump_version();
        let mut objects = self.objects.lock().unwrap();
        let current = objects
            .get(&key)
            .ok_or_else(|| StoreError::Invalid("replace of missing object".to_string()))?;
        if current.metadata.resource_version != config_map.metadata.resource_version {
            return Err(StoreError::Conflict);
        }

        let mut stored = config_map.clone();
        stored.metadata.uid = current.metadata.uid.clone();
        stored.metadata.resource_version = Some(version);
        objects.insert(key, stored.clone());
        self.replaces.fetch_add(1, Ordering::SeqCst);
        Ok(stored)
    }
}

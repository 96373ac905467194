//! In-memory cluster: watched objects plus config objects.
//!
//! Deleting an object cascades to every attached report store, the way the
//! real store's garbage collector follows owner references.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use warden_audit::store::memory::InMemoryReportStore;
use warden_audit::store::{ObjectResolver, PolicyConfigSource};
use warden_core::{Error, Kind, ObjectRef, Resource, Result};

/// Object cache and policy config source backed by maps.
#[derive(Debug, Default)]
pub struct MemoryCluster {
    objects: Mutex<HashMap<ObjectRef, Resource>>,
    configs: Mutex<HashMap<(String, String), BTreeMap<String, String>>>,
    cascades: Mutex<Vec<Arc<InMemoryReportStore>>>,
    failing_kinds: Mutex<Vec<Kind>>,
    config_failure: Mutex<bool>,
    next_uid: AtomicUsize,
    gets: AtomicUsize,
}

impl MemoryCluster {
    /// Creates an empty cluster.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a report store to receive owner cascades.
    pub fn cascade_to(&self, store: Arc<InMemoryReportStore>) {
        self.cascades.lock().expect("lock").push(store);
    }

    /// Creates or replaces an object, assigning a uid if it has none.
    /// Returns the stored object.
    pub fn apply(&self, mut resource: Resource) -> Resource {
        let key = resource.object_ref();
        let mut objects = self.objects.lock().expect("lock");
        if resource.metadata.uid.is_empty() {
            resource.metadata.uid = objects.get(&key).map_or_else(
                || format!("uid-{}", self.next_uid.fetch_add(1, Ordering::SeqCst)),
                |existing| existing.metadata.uid.clone(),
            );
        }
        objects.insert(key, resource.clone());
        resource
    }

    /// Deletes an object and every report it owns. Returns the number of
    /// reports removed by the cascade.
    pub fn delete(&self, object: &ObjectRef) -> usize {
        let removed = self.objects.lock().expect("lock").remove(object);
        let Some(removed) = removed else {
            return 0;
        };
        self.cascades
            .lock()
            .expect("lock")
            .iter()
            .map(|store| {
                store
                    .remove_owned_by(&removed.metadata.uid)
                    .expect("cascade")
            })
            .sum()
    }

    /// Returns a stored object.
    pub fn object(&self, object: &ObjectRef) -> Option<Resource> {
        self.objects.lock().expect("lock").get(object).cloned()
    }

    /// Creates or replaces a config object's data.
    pub fn set_config(&self, namespace: &str, name: &str, data: BTreeMap<String, String>) {
        self.configs
            .lock()
            .expect("lock")
            .insert((namespace.to_string(), name.to_string()), data);
    }

    /// Deletes a config object.
    pub fn remove_config(&self, namespace: &str, name: &str) {
        self.configs
            .lock()
            .expect("lock")
            .remove(&(namespace.to_string(), name.to_string()));
    }

    /// Makes every `get` of `kind` fail with a storage error.
    pub fn fail_gets_of(&self, kind: Kind) {
        self.failing_kinds.lock().expect("lock").push(kind);
    }

    /// Makes every config read fail with a storage error.
    pub fn fail_config_reads(&self) {
        *self.config_failure.lock().expect("lock") = true;
    }

    /// Number of object reads served so far.
    pub fn get_count(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectResolver for MemoryCluster {
    async fn get(&self, object: &ObjectRef) -> Result<Resource> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        if self.failing_kinds.lock().expect("lock").contains(&object.kind) {
            return Err(Error::storage(format!("injected read failure for {object}")));
        }
        self.objects
            .lock()
            .expect("lock")
            .get(object)
            .cloned()
            .ok_or_else(|| Error::not_found(object.kind, object))
    }
}

#[async_trait]
impl PolicyConfigSource for MemoryCluster {
    async fn get_config(&self, namespace: &str, name: &str) -> Result<BTreeMap<String, String>> {
        if *self.config_failure.lock().expect("lock") {
            return Err(Error::storage("injected config read failure"));
        }
        self.configs
            .lock()
            .expect("lock")
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| Error::not_found("ConfigMap", format!("{namespace}/{name}")))
    }
}

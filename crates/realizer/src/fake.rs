//! In-memory cluster for tests.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value as Json};

use crate::client::{
    guess_qualified_resource, labels_of, name_of, uid_of, ClusterClient, ClusterError, ClusterResult, ObjectKey,
};

#[derive(Debug, Default)]
struct State {
    objects: BTreeMap<ObjectKey, Json>,
    cluster_scoped: BTreeSet<String>,
    rejected: BTreeMap<String, String>,
    impersonated: Vec<String>,
    sequence: u64,
    creates: usize,
    updates: usize,
    status_updates: usize,
    deletes: usize,
}

/// A cluster that keeps objects in memory.
///
/// Created objects get a uid, a resourceVersion, generation 1 and a creationTimestamp one second
/// after the previous object's. `generateName` is honoured. Updates check resourceVersion and
/// keep status; deletes check the uid.
#[derive(Debug, Default)]
pub struct FakeCluster {
    state: Mutex<State>,
}

impl FakeCluster {
    pub fn new() -> Self {
        let fake = Self::default();
        {
            let mut state = fake.lock();
            for kind in [
                "ClusterSupplyChain",
                "ClusterDelivery",
                "ClusterSourceTemplate",
                "ClusterImageTemplate",
                "ClusterConfigTemplate",
                "ClusterDeploymentTemplate",
                "ClusterTemplate",
                "ClusterRunTemplate",
                "Namespace",
            ] {
                state.cluster_scoped.insert(kind.to_string());
            }
        }
        fake
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Store an object as if it had been created, filling in server-set metadata.
    pub fn insert(&self, obj: Json) -> Json {
        let mut state = self.lock();
        let stored = state.admit(obj);
        state.objects.insert(ObjectKey::of(&stored), stored.clone());
        stored
    }

    /// Make creates of `kind` fail the way an admission webhook would.
    pub fn reject_kind(&self, kind: &str, message: &str) {
        self.lock().rejected.insert(kind.to_string(), message.to_string());
    }

    pub fn mark_cluster_scoped(&self, kind: &str) {
        self.lock().cluster_scoped.insert(kind.to_string());
    }

    pub fn object(&self, key: &ObjectKey) -> Option<Json> {
        self.lock().objects.get(key).cloned()
    }

    pub fn objects_of_kind(&self, kind: &str) -> Vec<Json> {
        self.lock().objects.values().filter(|o| crate::client::kind_of(o) == kind).cloned().collect()
    }

    /// Replace the status of a stored object, as the object's own controller would.
    pub fn set_status(&self, key: &ObjectKey, status: Json) -> bool {
        let mut state = self.lock();
        let version = state.next();
        match state.objects.get_mut(key) {
            Some(obj) => {
                obj["status"] = status;
                obj["metadata"]["resourceVersion"] = json!(version.to_string());
                true
            }
            None => false,
        }
    }

    pub fn creates(&self) -> usize {
        self.lock().creates
    }

    pub fn updates(&self) -> usize {
        self.lock().updates
    }

    pub fn status_updates(&self) -> usize {
        self.lock().status_updates
    }

    pub fn deletes(&self) -> usize {
        self.lock().deletes
    }

    /// Users asked for through [`ClusterClient::impersonate`], in order.
    pub fn impersonated(&self) -> Vec<String> {
        self.lock().impersonated.clone()
    }
}

fn epoch() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z").map(|t| t.with_timezone(&Utc)).unwrap_or_default()
}

fn spec_of(obj: &Json) -> Json {
    let mut copy = obj.clone();
    if let Some(map) = copy.as_object_mut() {
        map.remove("metadata");
        map.remove("status");
    }
    copy
}

impl State {
    fn next(&mut self) -> u64 {
        self.sequence += 1;
        self.sequence
    }

    fn admit(&mut self, mut obj: Json) -> Json {
        let n = self.next();
        if name_of(&obj).is_empty() {
            let prefix = obj.pointer("/metadata/generateName").and_then(|v| v.as_str()).unwrap_or_default();
            obj["metadata"]["name"] = json!(format!("{prefix}{n:05}"));
        }
        let meta = &mut obj["metadata"];
        if meta.get("uid").and_then(|v| v.as_str()).unwrap_or_default().is_empty() {
            meta["uid"] = json!(format!("uid-{n}"));
        }
        if meta.get("creationTimestamp").is_none() {
            let created = epoch() + Duration::seconds(n as i64);
            meta["creationTimestamp"] = json!(created.to_rfc3339_opts(chrono::SecondsFormat::Secs, true));
        }
        if meta.get("generation").is_none() {
            meta["generation"] = json!(1);
        }
        meta["resourceVersion"] = json!(n.to_string());
        obj
    }
}

#[async_trait::async_trait]
impl ClusterClient for FakeCluster {
    async fn get(&self, key: &ObjectKey) -> ClusterResult<Json> {
        self.object(key).ok_or_else(|| ClusterError::NotFound(key.to_string()))
    }

    async fn list(
        &self,
        api_version: &str,
        kind: &str,
        namespace: Option<&str>,
        labels: &BTreeMap<String, String>,
    ) -> ClusterResult<Vec<Json>> {
        let state = self.lock();
        Ok(state
            .objects
            .iter()
            .filter(|(k, _)| k.api_version == api_version && k.kind == kind)
            .filter(|(k, _)| namespace.is_none() || k.namespace.as_deref() == namespace)
            .filter(|(_, o)| {
                let have = labels_of(o);
                labels.iter().all(|(lk, lv)| have.get(lk) == Some(lv))
            })
            .map(|(_, o)| o.clone())
            .collect())
    }

    async fn create(&self, obj: &Json) -> ClusterResult<Json> {
        let mut state = self.lock();
        if let Some(message) = state.rejected.get(crate::client::kind_of(obj)) {
            return Err(ClusterError::Rejected(message.clone()));
        }
        let mut candidate = obj.clone();
        if let Some(meta) = candidate.get_mut("metadata").and_then(|m| m.as_object_mut()) {
            meta.remove("uid");
            meta.remove("resourceVersion");
            meta.remove("creationTimestamp");
        }
        if !name_of(&candidate).is_empty() && state.objects.contains_key(&ObjectKey::of(&candidate)) {
            return Err(ClusterError::Conflict(format!("{} already exists", ObjectKey::of(&candidate))));
        }
        let stored = state.admit(candidate);
        state.objects.insert(ObjectKey::of(&stored), stored.clone());
        state.creates += 1;
        Ok(stored)
    }

    async fn update(&self, obj: &Json) -> ClusterResult<Json> {
        let mut state = self.lock();
        let key = ObjectKey::of(obj);
        let Some(current) = state.objects.get(&key).cloned() else {
            return Err(ClusterError::NotFound(key.to_string()));
        };
        let sent_version = obj.pointer("/metadata/resourceVersion").and_then(|v| v.as_str());
        let live_version = current.pointer("/metadata/resourceVersion").and_then(|v| v.as_str());
        if sent_version.is_some() && sent_version != live_version {
            return Err(ClusterError::Conflict(format!("{key} has been modified")));
        }
        let mut next = obj.clone();
        next["status"] = current.get("status").cloned().unwrap_or(Json::Null);
        if next["status"].is_null() {
            if let Some(map) = next.as_object_mut() {
                map.remove("status");
            }
        }
        let generation = current.pointer("/metadata/generation").and_then(|v| v.as_i64()).unwrap_or(1);
        let bumped = if spec_of(&current) != spec_of(obj) { generation + 1 } else { generation };
        next["metadata"]["generation"] = json!(bumped);
        next["metadata"]["uid"] = json!(uid_of(&current));
        next["metadata"]["creationTimestamp"] = current["metadata"]["creationTimestamp"].clone();
        let version = state.next();
        next["metadata"]["resourceVersion"] = json!(version.to_string());
        state.objects.insert(key, next.clone());
        state.updates += 1;
        Ok(next)
    }

    async fn update_status(&self, obj: &Json) -> ClusterResult<Json> {
        let mut state = self.lock();
        let key = ObjectKey::of(obj);
        let version = state.next();
        let Some(current) = state.objects.get_mut(&key) else {
            return Err(ClusterError::NotFound(key.to_string()));
        };
        current["status"] = obj.get("status").cloned().unwrap_or(Json::Null);
        current["metadata"]["resourceVersion"] = json!(version.to_string());
        let updated = current.clone();
        state.status_updates += 1;
        Ok(updated)
    }

    async fn delete(&self, obj: &Json) -> ClusterResult<()> {
        let mut state = self.lock();
        let key = ObjectKey::of(obj);
        let Some(current) = state.objects.get(&key) else {
            return Err(ClusterError::NotFound(key.to_string()));
        };
        let uid = uid_of(obj);
        if !uid.is_empty() && uid != uid_of(current) {
            return Err(ClusterError::Conflict(format!("uid precondition failed for {key}")));
        }
        state.objects.remove(&key);
        state.deletes += 1;
        Ok(())
    }

    async fn qualified_resource(&self, api_version: &str, kind: &str) -> ClusterResult<String> {
        Ok(guess_qualified_resource(api_version, kind))
    }

    async fn is_namespaced(&self, _api_version: &str, kind: &str) -> ClusterResult<bool> {
        Ok(!self.lock().cluster_scoped.contains(kind))
    }

    /// Records the identity and keeps acting with full access.
    async fn impersonate(&self, namespace: &str, name: &str) -> ClusterResult<Option<Box<dyn ClusterClient>>> {
        self.lock().impersonated.push(crate::client::service_account_user(namespace, name));
        Ok(None)
    }
}

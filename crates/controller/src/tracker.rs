//! Watches on the kinds owners have stamped: a change to a stamped object requeues whichever
//! Workload, Deliverable or Runnable owns it.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use carto_core::api::{Deliverable, Runnable, Workload, API_VERSION};
use futures::channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures::StreamExt;
use kube::core::{DynamicObject, GroupVersionKind};
use kube::discovery;
use kube::runtime::reflector::ObjectRef;
use kube::runtime::{watcher, WatchStreamExt};
use kube::{Api, Client, Resource};
use metrics::counter;
use serde_json::Value as Json;
use tracing::{debug, info, warn};

/// A Cartographer object named in a stamped object's owner references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerRef {
    pub kind: String,
    pub namespace: Option<String>,
    pub name: String,
}

/// Owners of `obj` in the Cartographer API group. Owners share the object's namespace.
pub fn carto_owners(obj: &Json) -> Vec<OwnerRef> {
    let namespace = obj.pointer("/metadata/namespace").and_then(Json::as_str);
    obj.pointer("/metadata/ownerReferences")
        .and_then(Json::as_array)
        .into_iter()
        .flatten()
        .filter(|r| r["apiVersion"] == API_VERSION)
        .filter_map(|r| {
            Some(OwnerRef {
                kind: r["kind"].as_str()?.to_string(),
                namespace: namespace.map(str::to_string),
                name: r["name"].as_str()?.to_string(),
            })
        })
        .collect()
}

fn object_ref<K: Resource<DynamicType = ()>>(owner: &OwnerRef) -> ObjectRef<K> {
    let r = ObjectRef::new(&owner.name);
    match &owner.namespace {
        Some(ns) => r.within(ns),
        None => r,
    }
}

struct Triggers {
    workloads: UnboundedSender<ObjectRef<Workload>>,
    deliverables: UnboundedSender<ObjectRef<Deliverable>>,
    runnables: UnboundedSender<ObjectRef<Runnable>>,
}

impl Triggers {
    fn route(&self, owner: &OwnerRef) {
        let sent = match owner.kind.as_str() {
            "Workload" => self.workloads.unbounded_send(object_ref(owner)).is_ok(),
            "Deliverable" => self.deliverables.unbounded_send(object_ref(owner)).is_ok(),
            "Runnable" => self.runnables.unbounded_send(object_ref(owner)).is_ok(),
            _ => return,
        };
        if sent {
            counter!("carto_stamped_object_triggers_total", 1u64, "kind" => owner.kind.clone());
        }
    }
}

/// Receiving ends of the requeue triggers, one per reconciled owner kind.
pub struct TriggerStreams {
    pub workloads: UnboundedReceiver<ObjectRef<Workload>>,
    pub deliverables: UnboundedReceiver<ObjectRef<Deliverable>>,
    pub runnables: UnboundedReceiver<ObjectRef<Runnable>>,
}

type Kind = (String, String);

pub struct StampedTracker {
    client: Client,
    triggers: Arc<Triggers>,
    watched: Arc<Mutex<HashSet<Kind>>>,
}

fn lock(watched: &Mutex<HashSet<Kind>>) -> MutexGuard<'_, HashSet<Kind>> {
    watched.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl StampedTracker {
    pub fn new(client: Client) -> (Self, TriggerStreams) {
        let (workloads, workload_rx) = unbounded();
        let (deliverables, deliverable_rx) = unbounded();
        let (runnables, runnable_rx) = unbounded();
        let tracker = Self {
            client,
            triggers: Arc::new(Triggers { workloads, deliverables, runnables }),
            watched: Arc::default(),
        };
        let streams = TriggerStreams { workloads: workload_rx, deliverables: deliverable_rx, runnables: runnable_rx };
        (tracker, streams)
    }

    /// Start a watch for each `(apiVersion, kind)` not watched yet.
    pub fn track<'k>(&self, kinds: impl IntoIterator<Item = &'k Kind>) {
        for kind in kinds {
            if !lock(&self.watched).insert(kind.clone()) {
                continue;
            }
            tokio::spawn(watch_kind(self.client.clone(), kind.clone(), self.triggers.clone(), self.watched.clone()));
        }
    }
}

fn gvk_of(api_version: &str, kind: &str) -> GroupVersionKind {
    match api_version.split_once('/') {
        Some((group, version)) => GroupVersionKind::gvk(group, version, kind),
        None => GroupVersionKind::gvk("", api_version, kind),
    }
}

async fn watch_kind(client: Client, kind: Kind, triggers: Arc<Triggers>, watched: Arc<Mutex<HashSet<Kind>>>) {
    let (api_version, k) = (&kind.0, &kind.1);
    let resource = match discovery::pinned_kind(&client, &gvk_of(api_version, k)).await {
        Ok((resource, _)) => resource,
        Err(e) => {
            // Forget the kind so the next reconcile that stamps it tries again.
            warn!(api_version = %api_version, kind = %k, error = %e, "cannot watch stamped kind");
            lock(&watched).remove(&kind);
            return;
        }
    };
    info!(api_version = %api_version, kind = %k, "watching stamped objects");
    let api = Api::<DynamicObject>::all_with(client, &resource);
    let mut objects = watcher::watcher(api, watcher::Config::default()).default_backoff().touched_objects().boxed();
    while let Some(event) = objects.next().await {
        match event.map(|obj| serde_json::to_value(&obj)) {
            Ok(Ok(obj)) => carto_owners(&obj).iter().for_each(|owner| triggers.route(owner)),
            Ok(Err(e)) => debug!(kind = %k, error = %e, "undecodable stamped object"),
            Err(e) => debug!(kind = %k, error = %e, "stamped object watch error"),
        }
    }
    warn!(api_version = %api_version, kind = %k, "stamped object watch ended");
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn only_cartographer_owners_are_followed() {
        let obj = json!({
            "metadata": {
                "name": "petclinic-image",
                "namespace": "dev",
                "ownerReferences": [
                    { "apiVersion": "carto.run/v1alpha1", "kind": "Workload", "name": "petclinic", "uid": "w-1" },
                    { "apiVersion": "apps/v1", "kind": "ReplicaSet", "name": "rs", "uid": "r-1" }
                ]
            }
        });
        assert_eq!(
            carto_owners(&obj),
            [OwnerRef { kind: "Workload".into(), namespace: Some("dev".into()), name: "petclinic".into() }]
        );
        assert!(carto_owners(&json!({ "metadata": { "name": "orphan" } })).is_empty());
    }

    #[test]
    fn owners_route_to_their_kind() {
        let (workloads, mut workload_rx) = unbounded();
        let (deliverables, mut deliverable_rx) = unbounded();
        let (runnables, _runnable_rx) = unbounded();
        let triggers = Triggers { workloads, deliverables, runnables };

        triggers.route(&OwnerRef { kind: "Workload".into(), namespace: Some("dev".into()), name: "petclinic".into() });
        triggers.route(&OwnerRef { kind: "ClusterSupplyChain".into(), namespace: None, name: "web".into() });

        let routed = workload_rx.try_next().unwrap().unwrap();
        assert_eq!((routed.name.as_str(), routed.namespace.as_deref()), ("petclinic", Some("dev")));
        assert!(deliverable_rx.try_next().is_err());
    }

    #[test]
    fn core_kinds_have_an_empty_group() {
        let gvk = gvk_of("v1", "ConfigMap");
        assert_eq!((gvk.group.as_str(), gvk.version.as_str()), ("", "v1"));
        assert_eq!(gvk_of("kpack.io/v1alpha2", "Image").group, "kpack.io");
    }
}

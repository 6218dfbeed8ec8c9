//! Cartographer kubehub: the realizers' cluster client over kube dynamic objects, with cached
//! discovery.

#![forbid(unsafe_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use anyhow::Result;
use carto_realizer::client::{name_of, namespace_of, service_account_user, uid_of};
use carto_realizer::{ClusterClient, ClusterError, ClusterResult, ObjectKey};
use kube::api::{Api, DeleteParams, ListParams, PostParams, Preconditions, PropagationPolicy};
use kube::core::{ApiResource, DynamicObject, GroupVersionKind};
use kube::discovery::{self, Scope};
use kube::{Client, Config};
use metrics::counter;
use serde_json::Value as Json;
use tokio::sync::{OnceCell, RwLock};
use tracing::debug;

static CLUSTER: OnceCell<KubeCluster> = OnceCell::const_new();

/// Shared cluster client from the ambient kubeconfig or in-cluster config. It can impersonate
/// service accounts.
pub async fn get_kube_cluster() -> Result<KubeCluster> {
    let cluster = CLUSTER
        .get_or_try_init(|| async {
            let config = Config::infer().await?;
            KubeCluster::from_config(config)
        })
        .await?;
    Ok(cluster.clone())
}

/// `config` acting as another user, keeping its credentials for authentication.
pub fn impersonating(config: &Config, user: &str) -> Config {
    let mut config = config.clone();
    config.auth_info.impersonate = Some(user.to_string());
    config.auth_info.impersonate_groups = None;
    config
}

/// Map a kube error onto the realizers' error kinds.
pub fn map_kube_error(err: kube::Error) -> ClusterError {
    match err {
        kube::Error::Api(ae) => {
            counter!("carto_kube_api_errors_total", 1u64);
            match ae.code {
                404 => ClusterError::NotFound(ae.message),
                409 => ClusterError::Conflict(ae.message),
                400 | 403 | 422 => ClusterError::Rejected(ae.message),
                _ => ClusterError::Api(format!("{} ({}): {}", ae.reason, ae.code, ae.message)),
            }
        }
        other => ClusterError::Api(other.to_string()),
    }
}

/// `k=v,k2=v2` label selector matching every given label.
pub fn label_selector(labels: &BTreeMap<String, String>) -> String {
    labels.iter().map(|(k, v)| format!("{k}={v}")).collect::<Vec<_>>().join(",")
}

fn parse_api_version(api_version: &str, kind: &str) -> GroupVersionKind {
    match api_version.split_once('/') {
        Some((group, version)) => GroupVersionKind::gvk(group, version, kind),
        None => GroupVersionKind::gvk("", api_version, kind),
    }
}

/// `resource.group`, or just `resource` for the core group.
pub fn qualified_name(ar: &ApiResource) -> String {
    if ar.group.is_empty() {
        ar.plural.clone()
    } else {
        format!("{}.{}", ar.plural, ar.group)
    }
}

fn strip_managed_fields(mut v: Json) -> Json {
    if let Some(meta) = v.get_mut("metadata").and_then(|m| m.as_object_mut()) {
        meta.remove("managedFields");
    }
    v
}

fn to_dynamic(obj: &Json) -> ClusterResult<DynamicObject> {
    serde_json::from_value(obj.clone()).map_err(|e| ClusterError::Api(format!("decoding object: {e}")))
}

fn to_json(obj: DynamicObject) -> ClusterResult<Json> {
    serde_json::to_value(&obj)
        .map(strip_managed_fields)
        .map_err(|e| ClusterError::Api(format!("encoding object: {e}")))
}

#[derive(Debug, Clone)]
struct Discovered {
    resource: ApiResource,
    namespaced: bool,
}

/// [`ClusterClient`] backed by the API server.
///
/// Built from a [`Config`], it hands out impersonating clients that share its discovery cache.
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
    config: Option<Config>,
    discovered: Arc<RwLock<HashMap<(String, String), Discovered>>>,
    impersonated: Arc<RwLock<HashMap<String, Client>>>,
}

impl KubeCluster {
    /// A cluster client that cannot impersonate.
    pub fn new(client: Client) -> Self {
        Self { client, config: None, discovered: Arc::default(), impersonated: Arc::default() }
    }

    pub fn from_config(config: Config) -> Result<Self> {
        let client = Client::try_from(config.clone())?;
        Ok(Self { config: Some(config), ..Self::new(client) })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    async fn discover(&self, api_version: &str, kind: &str) -> ClusterResult<Discovered> {
        let key = (api_version.to_string(), kind.to_string());
        if let Some(found) = self.discovered.read().await.get(&key) {
            return Ok(found.clone());
        }
        let gvk = parse_api_version(api_version, kind);
        let (resource, caps) = discovery::pinned_kind(&self.client, &gvk).await.map_err(map_kube_error)?;
        let found = Discovered { resource, namespaced: matches!(caps.scope, Scope::Namespaced) };
        debug!(api_version, kind, plural = %found.resource.plural, namespaced = found.namespaced, "discovered resource");
        self.discovered.write().await.insert(key, found.clone());
        Ok(found)
    }

    async fn api(&self, api_version: &str, kind: &str, namespace: Option<&str>) -> ClusterResult<Api<DynamicObject>> {
        let found = self.discover(api_version, kind).await?;
        Ok(match (found.namespaced, namespace) {
            (true, Some(ns)) => Api::namespaced_with(self.client.clone(), ns, &found.resource),
            _ => Api::all_with(self.client.clone(), &found.resource),
        })
    }

    async fn api_for(&self, obj: &Json) -> ClusterResult<Api<DynamicObject>> {
        let key = ObjectKey::of(obj);
        self.api(&key.api_version, &key.kind, key.namespace.as_deref()).await
    }
}

#[async_trait::async_trait]
impl ClusterClient for KubeCluster {
    async fn get(&self, key: &ObjectKey) -> ClusterResult<Json> {
        let api = self.api(&key.api_version, &key.kind, key.namespace.as_deref()).await?;
        to_json(api.get(&key.name).await.map_err(map_kube_error)?)
    }

    async fn list(
        &self,
        api_version: &str,
        kind: &str,
        namespace: Option<&str>,
        labels: &BTreeMap<String, String>,
    ) -> ClusterResult<Vec<Json>> {
        let api = self.api(api_version, kind, namespace).await?;
        let lp = ListParams::default().labels(&label_selector(labels));
        let list = api.list(&lp).await.map_err(map_kube_error)?;
        list.items.into_iter().map(to_json).collect()
    }

    async fn create(&self, obj: &Json) -> ClusterResult<Json> {
        let api = self.api_for(obj).await?;
        let created = api.create(&PostParams::default(), &to_dynamic(obj)?).await.map_err(map_kube_error)?;
        to_json(created)
    }

    async fn update(&self, obj: &Json) -> ClusterResult<Json> {
        let api = self.api_for(obj).await?;
        let replaced =
            api.replace(name_of(obj), &PostParams::default(), &to_dynamic(obj)?).await.map_err(map_kube_error)?;
        to_json(replaced)
    }

    async fn update_status(&self, obj: &Json) -> ClusterResult<Json> {
        let api = self.api_for(obj).await?;
        let body = serde_json::to_vec(obj).map_err(|e| ClusterError::Api(format!("encoding status: {e}")))?;
        let replaced = api.replace_status(name_of(obj), &PostParams::default(), body).await.map_err(map_kube_error)?;
        to_json(replaced)
    }

    async fn delete(&self, obj: &Json) -> ClusterResult<()> {
        let api = self.api_for(obj).await?;
        let uid = uid_of(obj);
        let dp = DeleteParams {
            propagation_policy: Some(PropagationPolicy::Background),
            preconditions: (!uid.is_empty()).then(|| Preconditions { uid: Some(uid.to_string()), resource_version: None }),
            ..Default::default()
        };
        api.delete(name_of(obj), &dp).await.map_err(map_kube_error)?;
        debug!(object = %ObjectKey::of(obj), namespace = ?namespace_of(obj), "deleted");
        Ok(())
    }

    async fn qualified_resource(&self, api_version: &str, kind: &str) -> ClusterResult<String> {
        Ok(qualified_name(&self.discover(api_version, kind).await?.resource))
    }

    async fn is_namespaced(&self, api_version: &str, kind: &str) -> ClusterResult<bool> {
        Ok(self.discover(api_version, kind).await?.namespaced)
    }

    async fn impersonate(&self, namespace: &str, name: &str) -> ClusterResult<Option<Box<dyn ClusterClient>>> {
        let Some(config) = &self.config else {
            return Ok(None);
        };
        let user = service_account_user(namespace, name);
        let cached = self.impersonated.read().await.get(&user).cloned();
        let client = match cached {
            Some(client) => client,
            None => {
                let client = Client::try_from(impersonating(config, &user))
                    .map_err(|e| ClusterError::Api(format!("building client for {user}: {e}")))?;
                debug!(user = %user, "built impersonating client");
                self.impersonated.write().await.insert(user, client.clone());
                client
            }
        };
        Ok(Some(Box::new(KubeCluster {
            client,
            config: None,
            discovered: self.discovered.clone(),
            impersonated: Arc::default(),
        })))
    }
}

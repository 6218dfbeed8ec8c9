//! The slice of the Kubernetes API the realizers need, over dynamic JSON objects.

use std::collections::BTreeMap;

use serde_json::Value as Json;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClusterError {
    #[error("not_found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    /// The API server refused the object (admission, schema or validation failure).
    #[error("rejected: {0}")]
    Rejected(String),
    #[error("api: {0}")]
    Api(String),
}

impl ClusterError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClusterError::NotFound(_))
    }
}

pub type ClusterResult<T> = Result<T, ClusterError>;

/// Type and location of an object, as needed to address it on the API server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    pub api_version: String,
    pub kind: String,
    pub namespace: Option<String>,
    pub name: String,
}

impl ObjectKey {
    pub fn new(api_version: &str, kind: &str, namespace: Option<&str>, name: &str) -> Self {
        Self {
            api_version: api_version.to_string(),
            kind: kind.to_string(),
            namespace: namespace.filter(|ns| !ns.is_empty()).map(str::to_string),
            name: name.to_string(),
        }
    }

    pub fn of(obj: &Json) -> Self {
        Self::new(api_version_of(obj), kind_of(obj), namespace_of(obj), name_of(obj))
    }
}

impl std::fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{} {}/{}", self.api_version, self.kind, ns, self.name),
            None => write!(f, "{}/{} {}", self.api_version, self.kind, self.name),
        }
    }
}

/// Cluster API consumed by the realizers and reconcilers.
///
/// Objects are plain JSON with `apiVersion`, `kind` and `metadata`. `create` honours
/// `metadata.generateName`; `delete` only removes the object whose uid matches the one given.
#[async_trait::async_trait]
pub trait ClusterClient: Send + Sync {
    async fn get(&self, key: &ObjectKey) -> ClusterResult<Json>;

    /// Objects of a type in a namespace (all namespaces or cluster scope when `None`) carrying
    /// every given label.
    async fn list(
        &self,
        api_version: &str,
        kind: &str,
        namespace: Option<&str>,
        labels: &BTreeMap<String, String>,
    ) -> ClusterResult<Vec<Json>>;

    async fn create(&self, obj: &Json) -> ClusterResult<Json>;

    /// Replace an object; `metadata.resourceVersion`, when present, is checked.
    async fn update(&self, obj: &Json) -> ClusterResult<Json>;

    /// Replace the status subresource of an object.
    async fn update_status(&self, obj: &Json) -> ClusterResult<Json>;

    /// Delete an object, with a uid precondition when the object carries one.
    async fn delete(&self, obj: &Json) -> ClusterResult<()>;

    /// `resource.group` name of a type (e.g. `deployments.apps`), used in diagnostics.
    async fn qualified_resource(&self, api_version: &str, kind: &str) -> ClusterResult<String>;

    /// Whether objects of the type live in a namespace.
    async fn is_namespaced(&self, api_version: &str, kind: &str) -> ClusterResult<bool>;

    /// A client acting as `system:serviceaccount:<namespace>:<name>`. `None` means this client
    /// cannot impersonate and callers keep using it as is.
    async fn impersonate(&self, namespace: &str, name: &str) -> ClusterResult<Option<Box<dyn ClusterClient>>> {
        let _ = (namespace, name);
        Ok(None)
    }
}

/// The user name the API server gives a service account.
pub fn service_account_user(namespace: &str, name: &str) -> String {
    format!("system:serviceaccount:{namespace}:{name}")
}

fn str_at<'a>(obj: &'a Json, ptr: &str) -> &'a str {
    obj.pointer(ptr).and_then(|v| v.as_str()).unwrap_or_default()
}

pub fn api_version_of(obj: &Json) -> &str {
    str_at(obj, "/apiVersion")
}

pub fn kind_of(obj: &Json) -> &str {
    str_at(obj, "/kind")
}

pub fn name_of(obj: &Json) -> &str {
    str_at(obj, "/metadata/name")
}

pub fn namespace_of(obj: &Json) -> Option<&str> {
    obj.pointer("/metadata/namespace").and_then(|v| v.as_str()).filter(|ns| !ns.is_empty())
}

pub fn uid_of(obj: &Json) -> &str {
    str_at(obj, "/metadata/uid")
}

pub fn labels_of(obj: &Json) -> BTreeMap<String, String> {
    obj.pointer("/metadata/labels")
        .and_then(|v| v.as_object())
        .map(|m| m.iter().filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string()))).collect())
        .unwrap_or_default()
}

/// Fallback `resource.group` name derived from the kind when discovery is unavailable.
pub fn guess_qualified_resource(api_version: &str, kind: &str) -> String {
    let plural = format!("{}s", kind.to_lowercase());
    match api_version.split_once('/') {
        Some((group, _)) => format!("{plural}.{group}"),
        None => plural,
    }
}

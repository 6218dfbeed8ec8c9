//! Getting stamped objects onto the cluster, once per distinct content.

use std::collections::BTreeMap;

use carto_core::labels::{MAX_LABEL_VALUE_LEN, STAMPED_OBJECT_DIGEST};
use carto_templates::digest;
use metrics::counter;
use serde_json::{Map, Value as Json};
use tracing::debug;

use crate::client::{api_version_of, kind_of, name_of, namespace_of, ClusterClient, ClusterResult, ObjectKey};

/// Label value identifying the stamped content: the hex digest cut to the label length limit.
pub fn digest_label_value(stamped: &Json) -> String {
    let full = digest(stamped);
    let hex = full.strip_prefix("sha256:").unwrap_or(&full);
    hex.chars().take(MAX_LABEL_VALUE_LEN).collect()
}

fn set_label(obj: &mut Json, key: &str, value: &str) {
    if let Some(meta) = obj.as_object_mut().map(|o| o.entry("metadata").or_insert_with(|| Json::Object(Map::new()))) {
        if let Some(meta) = meta.as_object_mut() {
            let labels = meta.entry("labels").or_insert_with(|| Json::Object(Map::new()));
            if let Some(labels) = labels.as_object_mut() {
                labels.insert(key.to_string(), Json::String(value.to_string()));
            }
        }
    }
}

/// Stamp the content digest label onto `stamped` and return the label value.
fn label_with_digest(stamped: &mut Json) -> String {
    let value = digest_label_value(stamped);
    set_label(stamped, STAMPED_OBJECT_DIGEST, &value);
    value
}

/// True when every field of `desired` is present with the same value in `live`.
/// Arrays must match element for element.
fn contains(live: &Json, desired: &Json) -> bool {
    match (live, desired) {
        (Json::Object(l), Json::Object(d)) => d.iter().all(|(k, dv)| l.get(k).map(|lv| contains(lv, dv)).unwrap_or(false)),
        (Json::Array(l), Json::Array(d)) => l.len() == d.len() && l.iter().zip(d).all(|(lv, dv)| contains(lv, dv)),
        (l, d) => l == d,
    }
}

/// The live object was last written from this exact stamped content and still holds all of it.
/// Fields the server defaulted in since then do not count as drift.
fn written_unchanged(live: &Json, stamped: &Json, digest: &str) -> bool {
    let label = live.pointer("/metadata/labels").and_then(|l| l.get(STAMPED_OBJECT_DIGEST)).and_then(Json::as_str);
    label == Some(digest) && contains(live, stamped)
}

/// Metadata fields the API server owns; they survive an update untouched.
const SERVER_METADATA: &[&str] = &[
    "uid",
    "resourceVersion",
    "creationTimestamp",
    "generation",
    "managedFields",
    "deletionTimestamp",
    "deletionGracePeriodSeconds",
];

fn merge_string_map(live: Option<&Json>, stamped: Option<&Json>) -> Option<Json> {
    let mut merged = live.and_then(Json::as_object).cloned().unwrap_or_default();
    for (k, v) in stamped.and_then(Json::as_object).into_iter().flatten() {
        merged.insert(k.clone(), v.clone());
    }
    (!merged.is_empty()).then_some(Json::Object(merged))
}

/// Build the body that replaces `live` with the `stamped` content.
///
/// Every top-level field other than `metadata` and `status` is taken from `stamped`, so fields a
/// template dropped disappear. Server-owned metadata is kept, labels and annotations are merged
/// with the stamped values winning, and owner references follow the stamped object.
pub fn merge_for_update(live: &Json, stamped: &Json) -> Json {
    let mut merged = Map::new();
    for (k, v) in stamped.as_object().into_iter().flatten() {
        if k != "metadata" && k != "status" {
            merged.insert(k.clone(), v.clone());
        }
    }
    if let Some(status) = live.get("status") {
        merged.insert("status".to_string(), status.clone());
    }

    let live_meta = live.get("metadata").and_then(Json::as_object).cloned().unwrap_or_default();
    let stamped_meta = stamped.get("metadata").and_then(Json::as_object).cloned().unwrap_or_default();
    let mut meta = Map::new();
    for (k, v) in &stamped_meta {
        if !matches!(k.as_str(), "labels" | "annotations") && !SERVER_METADATA.contains(&k.as_str()) {
            meta.insert(k.clone(), v.clone());
        }
    }
    for k in SERVER_METADATA {
        if let Some(v) = live_meta.get(*k) {
            meta.insert(k.to_string(), v.clone());
        }
    }
    for k in ["name", "namespace", "finalizers"] {
        if let (Some(v), false) = (live_meta.get(k), meta.contains_key(k)) {
            meta.insert(k.to_string(), v.clone());
        }
    }
    for k in ["labels", "annotations"] {
        if let Some(v) = merge_string_map(live_meta.get(k), stamped_meta.get(k)) {
            meta.insert(k.to_string(), v);
        }
    }
    merged.insert("metadata".to_string(), Json::Object(meta));
    Json::Object(merged)
}

async fn create(client: &dyn ClusterClient, obj: &Json) -> ClusterResult<Json> {
    let created = client.create(obj).await?;
    counter!("carto_stamped_objects_created_total", 1u64);
    debug!(object = %ObjectKey::of(&created), "created stamped object");
    Ok(created)
}

async fn find_by_labels(
    client: &dyn ClusterClient,
    stamped: &Json,
    labels: &BTreeMap<String, String>,
) -> ClusterResult<Option<Json>> {
    let found = client.list(api_version_of(stamped), kind_of(stamped), namespace_of(stamped), labels).await?;
    Ok(found.into_iter().next())
}

/// Ensure one object with the stamped content exists, updating in place when it is named.
///
/// Named objects are fetched, then created or replaced with the stamped content (see
/// [`merge_for_update`]); nothing is written when the replacement equals the live object or the
/// live object already carries this content digest and every stamped field. Objects that only carry `generateName` are
/// looked up by `labels` plus the content digest and created when none matches.
pub async fn ensure_mutable(
    client: &dyn ClusterClient,
    mut stamped: Json,
    labels: &BTreeMap<String, String>,
) -> ClusterResult<Json> {
    let digest = label_with_digest(&mut stamped);

    if name_of(&stamped).is_empty() {
        let mut by_digest = labels.clone();
        by_digest.insert(STAMPED_OBJECT_DIGEST.to_string(), digest);
        return match find_by_labels(client, &stamped, &by_digest).await? {
            Some(existing) => Ok(existing),
            None => create(client, &stamped).await,
        };
    }

    match client.get(&ObjectKey::of(&stamped)).await {
        Ok(live) => {
            let merged = merge_for_update(&live, &stamped);
            if merged == live || written_unchanged(&live, &stamped, &digest) {
                return Ok(live);
            }
            let updated = client.update(&merged).await?;
            counter!("carto_stamped_objects_updated_total", 1u64);
            debug!(object = %ObjectKey::of(&updated), "updated stamped object");
            Ok(updated)
        }
        Err(e) if e.is_not_found() => create(client, &stamped).await,
        Err(e) => Err(e),
    }
}

/// Ensure an object with the stamped content exists, creating a new one only when no earlier
/// object carrying `labels` has the same content digest.
pub async fn ensure_immutable(
    client: &dyn ClusterClient,
    mut stamped: Json,
    labels: &BTreeMap<String, String>,
) -> ClusterResult<Json> {
    let digest = label_with_digest(&mut stamped);
    let mut by_digest = labels.clone();
    by_digest.insert(STAMPED_OBJECT_DIGEST.to_string(), digest);
    match find_by_labels(client, &stamped, &by_digest).await? {
        Some(existing) => Ok(existing),
        None => create(client, &stamped).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn digest_label_fits() {
        let v = digest_label_value(&json!({ "a": 1 }));
        assert_eq!(v.len(), MAX_LABEL_VALUE_LEN);
        assert!(v.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn update_replaces_content_and_keeps_server_metadata() {
        let live = json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {
                "name": "a", "namespace": "dev", "uid": "u1", "resourceVersion": "7",
                "labels": { "team": "x", "carto.run/workload-name": "w" },
                "annotations": { "note": "kept" }
            },
            "data": { "k": "old", "stale": "x" },
            "binaryData": { "b": "AA==" },
            "status": { "phase": "Ready" }
        });
        let stamped = json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": { "name": "a", "namespace": "dev", "labels": { "carto.run/workload-name": "w2" } },
            "data": { "k": "new" }
        });
        let merged = merge_for_update(&live, &stamped);
        assert_eq!(merged["data"], json!({ "k": "new" }));
        assert!(merged.get("binaryData").is_none());
        assert_eq!(merged["status"], json!({ "phase": "Ready" }));
        assert_eq!(merged["metadata"]["uid"], "u1");
        assert_eq!(merged["metadata"]["resourceVersion"], "7");
        assert_eq!(merged["metadata"]["labels"], json!({ "team": "x", "carto.run/workload-name": "w2" }));
        assert_eq!(merged["metadata"]["annotations"], json!({ "note": "kept" }));
    }

    #[test]
    fn server_defaults_are_not_drift_while_the_digest_matches() {
        let stamped = json!({ "apiVersion": "apps/v1", "kind": "Deployment", "metadata": { "name": "a" }, "spec": { "replicas": 1 } });
        let mut labelled = stamped.clone();
        let digest = label_with_digest(&mut labelled);
        let mut live = labelled.clone();
        live["spec"]["revisionHistoryLimit"] = json!(10);
        assert!(written_unchanged(&live, &labelled, &digest));

        let mut changed = json!({ "apiVersion": "apps/v1", "kind": "Deployment", "metadata": { "name": "a" }, "spec": {} });
        let other = label_with_digest(&mut changed);
        assert!(!written_unchanged(&live, &changed, &other));
    }

    #[test]
    fn unchanged_content_merges_back_to_the_live_object() {
        let live = json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": { "name": "a", "uid": "u1", "resourceVersion": "7", "labels": { "l": "1" } },
            "data": { "k": "v" }
        });
        let stamped = json!({ "apiVersion": "v1", "kind": "ConfigMap", "metadata": { "name": "a", "labels": { "l": "1" } }, "data": { "k": "v" } });
        assert_eq!(merge_for_update(&live, &stamped), live);
    }
}

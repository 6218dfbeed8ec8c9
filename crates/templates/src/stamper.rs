//! Turns a template body plus a templating context into a concrete object owned by the owner.

use std::collections::BTreeMap;

use serde_json::{json, Value as Json};
use thiserror::Error;

use crate::interpolate::{interpolate, InterpolateError};
use crate::ytt::{Ytt, YttError};

/// The two ways a template can describe the object to stamp.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateBody {
    Template(Json),
    Ytt(String),
}

#[derive(Debug, Error)]
pub enum StampError {
    #[error("unknown resource template type, expected either template or ytt")]
    NoBody,
    #[error("failed to recursively evaluate template: {0}")]
    Interpolate(#[from] InterpolateError),
    #[error(transparent)]
    Ytt(#[from] YttError),
    #[error("stamped resource is not an object, stamped resource: {0}")]
    NotAnObject(String),
    #[error("cannot set namespace in resource template")]
    NamespaceSet,
}

impl StampError {
    pub fn expression(&self) -> Option<&str> {
        match self {
            StampError::Interpolate(e) => e.expression(),
            _ => None,
        }
    }
}

/// Stamps templates on behalf of one owner.
#[derive(Debug, Clone)]
pub struct Stamper<'a> {
    owner: &'a Json,
    context: &'a Json,
    labels: &'a BTreeMap<String, String>,
    ytt: Option<&'a Ytt>,
}

impl<'a> Stamper<'a> {
    pub fn new(owner: &'a Json, context: &'a Json, labels: &'a BTreeMap<String, String>) -> Self {
        Self { owner, context, labels, ytt: None }
    }

    pub fn with_ytt(mut self, ytt: &'a Ytt) -> Self {
        self.ytt = Some(ytt);
        self
    }

    pub async fn stamp(&self, body: &TemplateBody) -> Result<Json, StampError> {
        let stamped = match body {
            TemplateBody::Template(tpl) => interpolate(tpl, self.context)?,
            TemplateBody::Ytt(src) => {
                let default_ytt;
                let ytt = match self.ytt {
                    Some(y) => y,
                    None => {
                        default_ytt = Ytt::from_env();
                        &default_ytt
                    }
                };
                ytt.render(src, self.context).await?
            }
        };
        self.finish(stamped)
    }

    /// Namespace, owner reference and labels applied to an interpolated body.
    fn finish(&self, stamped: Json) -> Result<Json, StampError> {
        let Json::Object(mut obj) = stamped else {
            return Err(StampError::NotAnObject(stamped.to_string()));
        };
        let owner_ns = self.owner.pointer("/metadata/namespace").and_then(|v| v.as_str()).unwrap_or_default();

        let metadata = obj.entry("metadata").or_insert_with(|| json!({}));
        if !metadata.is_object() {
            *metadata = json!({});
        }
        let Some(meta) = metadata.as_object_mut() else {
            return Err(StampError::NotAnObject("metadata".into()));
        };

        let ns = meta.get("namespace").and_then(|v| v.as_str()).unwrap_or_default();
        if !ns.is_empty() && ns != owner_ns {
            return Err(StampError::NamespaceSet);
        }
        if !owner_ns.is_empty() {
            meta.insert("namespace".into(), Json::String(owner_ns.to_string()));
        }

        meta.insert("ownerReferences".into(), json!([owner_reference(self.owner)]));

        let labels = meta.entry("labels").or_insert_with(|| json!({}));
        if !labels.is_object() {
            *labels = json!({});
        }
        if let Some(labels) = labels.as_object_mut() {
            for (k, v) in self.labels {
                labels.insert(k.clone(), Json::String(v.clone()));
            }
        }
        Ok(Json::Object(obj))
    }
}

/// Controller owner reference pointing at `owner`.
pub fn owner_reference(owner: &Json) -> Json {
    let field = |ptr: &str| owner.pointer(ptr).cloned().unwrap_or(Json::String(String::new()));
    json!({
        "apiVersion": field("/apiVersion"),
        "kind": field("/kind"),
        "name": field("/metadata/name"),
        "uid": field("/metadata/uid"),
        "controller": true,
        "blockOwnerDeletion": true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner() -> Json {
        json!({
            "apiVersion": "carto.run/v1alpha1",
            "kind": "Workload",
            "metadata": { "name": "petclinic", "namespace": "dev", "uid": "u-1" }
        })
    }

    fn labels() -> BTreeMap<String, String> {
        [("carto.run/workload-name".to_string(), "petclinic".to_string())].into_iter().collect()
    }

    #[tokio::test]
    async fn plain_body_only_gains_namespace_owner_and_labels() {
        let owner = owner();
        let ctx = json!({ "workload": owner.clone() });
        let labels = labels();
        let body = json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": { "name": "cm", "labels": { "app": "web" } },
            "data": { "image": "my-image" }
        });
        let out = Stamper::new(&owner, &ctx, &labels).stamp(&TemplateBody::Template(body.clone())).await.unwrap();

        let mut expected = body;
        expected["metadata"]["namespace"] = json!("dev");
        expected["metadata"]["labels"]["carto.run/workload-name"] = json!("petclinic");
        expected["metadata"]["ownerReferences"] = json!([{
            "apiVersion": "carto.run/v1alpha1", "kind": "Workload", "name": "petclinic", "uid": "u-1",
            "controller": true, "blockOwnerDeletion": true
        }]);
        assert_eq!(out, expected);
    }

    #[tokio::test]
    async fn caller_labels_win() {
        let owner = owner();
        let ctx = json!({});
        let labels = labels();
        let body = json!({ "metadata": { "labels": { "carto.run/workload-name": "other" } } });
        let out = Stamper::new(&owner, &ctx, &labels).stamp(&TemplateBody::Template(body)).await.unwrap();
        assert_eq!(out["metadata"]["labels"]["carto.run/workload-name"], "petclinic");
    }

    #[tokio::test]
    async fn foreign_namespace_is_rejected() {
        let owner = owner();
        let ctx = json!({});
        let labels = BTreeMap::new();
        let body = json!({ "metadata": { "namespace": "prod" } });
        let err = Stamper::new(&owner, &ctx, &labels).stamp(&TemplateBody::Template(body)).await.unwrap_err();
        assert_eq!(err.to_string(), "cannot set namespace in resource template");
    }

    #[tokio::test]
    async fn non_object_is_rejected() {
        let owner = owner();
        let ctx = json!({ "params": { "list": [1, 2] } });
        let labels = BTreeMap::new();
        let err = Stamper::new(&owner, &ctx, &labels)
            .stamp(&TemplateBody::Template(json!("$(params.list)$")))
            .await
            .unwrap_err();
        assert!(matches!(err, StampError::NotAnObject(_)));
    }
}

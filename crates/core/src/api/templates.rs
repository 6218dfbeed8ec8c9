use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use super::common::{any_object, TemplateSpec};

#[derive(CustomResource, Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(group = "carto.run", version = "v1alpha1", kind = "ClusterSourceTemplate", plural = "clustersourcetemplates")]
#[serde(rename_all = "camelCase")]
pub struct ClusterSourceTemplateSpec {
    #[serde(flatten)]
    pub base: TemplateSpec,
    pub url_path: String,
    pub revision_path: String,
}

#[derive(CustomResource, Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(group = "carto.run", version = "v1alpha1", kind = "ClusterImageTemplate", plural = "clusterimagetemplates")]
#[serde(rename_all = "camelCase")]
pub struct ClusterImageTemplateSpec {
    #[serde(flatten)]
    pub base: TemplateSpec,
    pub image_path: String,
}

#[derive(CustomResource, Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(group = "carto.run", version = "v1alpha1", kind = "ClusterConfigTemplate", plural = "clusterconfigtemplates")]
#[serde(rename_all = "camelCase")]
pub struct ClusterConfigTemplateSpec {
    #[serde(flatten)]
    pub base: TemplateSpec,
    pub config_path: String,
}

/// `key == value` requirement over a stamped object's fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentCondition {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ObservedCompletion {
    pub succeeded_condition: DeploymentCondition,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_condition: Option<DeploymentCondition>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ObservedMatch {
    pub input: String,
    pub output: String,
}

#[derive(CustomResource, Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(group = "carto.run", version = "v1alpha1", kind = "ClusterDeploymentTemplate", plural = "clusterdeploymenttemplates")]
#[serde(rename_all = "camelCase")]
pub struct ClusterDeploymentTemplateSpec {
    #[serde(flatten)]
    pub base: TemplateSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_completion: Option<ObservedCompletion>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub observed_matches: Vec<ObservedMatch>,
}

#[derive(CustomResource, Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(group = "carto.run", version = "v1alpha1", kind = "ClusterTemplate", plural = "clustertemplates")]
#[serde(rename_all = "camelCase")]
pub struct ClusterTemplateSpec {
    #[serde(flatten)]
    pub base: TemplateSpec,
}

#[derive(CustomResource, Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(group = "carto.run", version = "v1alpha1", kind = "ClusterRunTemplate", plural = "clusterruntemplates")]
#[serde(rename_all = "camelCase")]
pub struct ClusterRunTemplateSpec {
    #[schemars(schema_with = "any_object")]
    pub template: Json,
    /// Output name to JSONPath evaluated on the latest succeeded run.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub outputs: BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Lifecycle;
    use serde_json::json;

    #[test]
    fn source_template_reads_shared_fields() {
        let t: ClusterSourceTemplate = serde_json::from_value(json!({
            "apiVersion": "carto.run/v1alpha1",
            "kind": "ClusterSourceTemplate",
            "metadata": { "name": "git" },
            "spec": {
                "urlPath": ".status.artifact.url",
                "revisionPath": ".status.artifact.revision",
                "lifecycle": "immutable",
                "params": [{ "name": "interval", "default": "1m" }],
                "template": { "apiVersion": "v1", "kind": "ConfigMap" }
            }
        }))
        .unwrap();
        assert_eq!(t.spec.base.lifecycle, Some(Lifecycle::Immutable));
        assert_eq!(t.spec.base.params[0].default, json!("1m"));
        assert_eq!(t.spec.url_path, ".status.artifact.url");
    }
}

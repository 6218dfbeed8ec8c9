use std::collections::BTreeMap;

use carto_eval::{FieldSelectorRequirement, LabelSelectorRequirement, Selector};
use schemars::gen::SchemaGenerator;
use schemars::schema::{InstanceType, Schema, SchemaObject};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::conditions::Condition;

pub const GROUP: &str = "carto.run";
pub const VERSION: &str = "v1alpha1";
pub const API_VERSION: &str = "carto.run/v1alpha1";

/// Schema for opaque JSON: any value, unknown fields preserved.
pub(crate) fn any_json(_: &mut SchemaGenerator) -> Schema {
    let mut obj = SchemaObject::default();
    obj.extensions.insert("x-kubernetes-preserve-unknown-fields".into(), Json::Bool(true));
    Schema::Object(obj)
}

/// Schema for an opaque JSON object.
pub(crate) fn any_object(_: &mut SchemaGenerator) -> Schema {
    let mut obj = SchemaObject { instance_type: Some(InstanceType::Object.into()), ..Default::default() };
    obj.extensions.insert("x-kubernetes-preserve-unknown-fields".into(), Json::Bool(true));
    Schema::Object(obj)
}

pub(crate) fn any_json_map(gen: &mut SchemaGenerator) -> Schema {
    let mut obj = SchemaObject { instance_type: Some(InstanceType::Object.into()), ..Default::default() };
    obj.object().additional_properties = Some(Box::new(any_json(gen)));
    Schema::Object(obj)
}

/// Owner parameter: always overrides unless the blueprint fixed the value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OwnerParam {
    pub name: String,
    #[schemars(schema_with = "any_json")]
    pub value: Json,
}

/// Blueprint or resource parameter: exactly one of `value` (fixed) or `default` (delegating).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BlueprintParam {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "any_json")]
    pub value: Option<Json>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "any_json")]
    pub default: Option<Json>,
}

/// Template parameter with its default value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DefaultParam {
    pub name: String,
    #[schemars(schema_with = "any_json")]
    pub default: Json,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TemplateOption {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Name of an input to emit unchanged instead of stamping a template.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pass_through: Option<String>,
    #[serde(default)]
    pub selector: Selector,
}

impl TemplateOption {
    /// Display name used in messages: the template name or `passThrough`.
    pub fn display_name(&self) -> &str {
        match (&self.name, &self.pass_through) {
            (Some(n), _) if !n.is_empty() => n,
            _ => "passThrough",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResourceTemplateRef {
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<TemplateOption>,
}

/// `{name, resource}` reference from a resource to an earlier resource's output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResourceReference {
    pub name: String,
    pub resource: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentReference {
    pub resource: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BlueprintResource {
    pub name: String,
    pub template_ref: ResourceTemplateRef,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<BlueprintParam>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<ResourceReference>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<ResourceReference>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub configs: Vec<ResourceReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment: Option<DeploymentReference>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServiceAccountRef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

/// Shared body of ClusterSupplyChain and ClusterDelivery specs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BlueprintSpec {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub selector: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub selector_match_expressions: Vec<LabelSelectorRequirement>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub selector_match_fields: Vec<FieldSelectorRequirement>,
    pub resources: Vec<BlueprintResource>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<BlueprintParam>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account_ref: Option<ServiceAccountRef>,
}

impl BlueprintSpec {
    /// The owner selector assembled from the three legacy selector fields.
    pub fn owner_selector(&self) -> Selector {
        Selector {
            match_labels: self.selector.clone(),
            match_expressions: self.selector_match_expressions.clone(),
            match_fields: self.selector_match_fields.clone(),
        }
    }

    pub fn resource(&self, name: &str) -> Option<&BlueprintResource> {
        self.resources.iter().find(|r| r.name == name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BlueprintStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Lifecycle {
    #[default]
    Mutable,
    Immutable,
    Tekton,
}

impl Lifecycle {
    pub fn is_immutable(&self) -> bool {
        !matches!(self, Lifecycle::Mutable)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Lifecycle::Mutable => "mutable",
            Lifecycle::Immutable => "immutable",
            Lifecycle::Tekton => "tekton",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RetentionPolicy {
    pub max_failed_runs: u32,
    pub max_successful_runs: u32,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self { max_failed_runs: 10, max_successful_runs: 10 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConditionRequirement {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthMatchFieldSelectorRequirement {
    #[serde(flatten)]
    pub requirement: FieldSelectorRequirement,
    /// JSONPath to a human-readable message on the stamped object.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_path: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthMatchRule {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub match_conditions: Vec<ConditionRequirement>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub match_fields: Vec<HealthMatchFieldSelectorRequirement>,
}

impl HealthMatchRule {
    pub fn is_empty(&self) -> bool {
        self.match_conditions.is_empty() && self.match_fields.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MultiMatchHealthRule {
    pub healthy: HealthMatchRule,
    pub unhealthy: HealthMatchRule,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "any_object")]
    pub always_healthy: Option<Json>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub single_condition_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multi_match: Option<MultiMatchHealthRule>,
}

impl HealthRule {
    pub fn always_healthy() -> Self {
        Self { always_healthy: Some(Json::Object(Default::default())), ..Default::default() }
    }

    pub fn single_condition(type_: &str) -> Self {
        Self { single_condition_type: Some(type_.to_string()), ..Default::default() }
    }
}

/// Fields common to every stampable template kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TemplateSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "any_object")]
    pub template: Option<Json>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ytt: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<DefaultParam>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_rule: Option<HealthRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lifecycle: Option<Lifecycle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retention_policy: Option<RetentionPolicy>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ObjectReference {
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub name: String,
    pub api_version: String,
}

impl ObjectReference {
    /// Reference to a dynamic object from its `apiVersion`, `kind` and `metadata`.
    pub fn from_object(obj: &Json) -> Self {
        let meta = obj.get("metadata");
        let text = |v: Option<&Json>| v.and_then(|v| v.as_str()).unwrap_or_default().to_string();
        Self {
            kind: text(obj.get("kind")),
            namespace: meta.and_then(|m| m.get("namespace")).and_then(|v| v.as_str()).map(str::to_string),
            name: text(meta.and_then(|m| m.get("name"))),
            api_version: text(obj.get("apiVersion")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResourceInput {
    pub name: String,
}

/// One harvested output value of a realized resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OutputEntry {
    pub name: String,
    pub preview: String,
    pub digest: String,
    pub last_transition_time: String,
}

/// Per-owner, per-resource realization record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RealizedResource {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_ref: Option<ObjectReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stamped_ref: Option<ObjectReference>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<ResourceInput>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<OutputEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GitRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GitSource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r#ref: Option<GitRef>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git: Option<GitSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_path: Option<String>,
}

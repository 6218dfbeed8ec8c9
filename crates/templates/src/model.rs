//! One model over every stampable template kind, plus the run template used by Runnables.

use std::collections::BTreeMap;

use carto_core::api::{
    ClusterConfigTemplate, ClusterDeploymentTemplate, ClusterImageTemplate, ClusterRunTemplate, ClusterSourceTemplate,
    ClusterTemplate, DefaultParam, HealthRule, Lifecycle, RetentionPolicy, TemplateSpec,
};
use carto_eval::{jsonpath, JsonPathError};
use chrono::{DateTime, Utc};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::de::DeserializeOwned;
use serde_json::Value as Json;
use thiserror::Error;

use crate::inputs::Inputs;
use crate::outputs::{Output, SourceOutput};
use crate::stamper::TemplateBody;

#[derive(Debug, Error)]
pub enum TemplateModelError {
    #[error("resource does not match a known template: {0}")]
    UnknownKind(String),
    #[error("failed to decode {kind}: {source}")]
    Decode {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OutputError {
    #[error("evaluate json path '{expression}': {source}")]
    JsonPath {
        expression: String,
        #[source]
        source: JsonPathError,
    },
    #[error("{0}")]
    ObservedGeneration(String),
    #[error("{0}")]
    DeploymentCondition(String),
    #[error("{0}")]
    DeploymentFailedConditionMet(String),
    #[error("deployment not found in upstream template")]
    MissingDeployment,
}

impl OutputError {
    fn path(expression: &str, source: JsonPathError) -> Self {
        OutputError::JsonPath { expression: expression.to_string(), source }
    }

    /// The JSONPath expression that could not be read, if that is what failed.
    pub fn expression(&self) -> Option<&str> {
        match self {
            OutputError::JsonPath { expression, .. } => Some(expression),
            _ => None,
        }
    }
}

/// A fetched template of one of the stampable kinds.
#[derive(Debug, Clone)]
pub enum Template {
    Source(ClusterSourceTemplate),
    Image(ClusterImageTemplate),
    Config(ClusterConfigTemplate),
    Deployment(ClusterDeploymentTemplate),
    Generic(ClusterTemplate),
}

fn decode<T: DeserializeOwned>(kind: &str, obj: Json) -> Result<T, TemplateModelError> {
    serde_json::from_value(obj).map_err(|source| TemplateModelError::Decode { kind: kind.to_string(), source })
}

impl Template {
    pub fn from_object(kind: &str, obj: Json) -> Result<Self, TemplateModelError> {
        Ok(match kind {
            "ClusterSourceTemplate" => Template::Source(decode(kind, obj)?),
            "ClusterImageTemplate" => Template::Image(decode(kind, obj)?),
            "ClusterConfigTemplate" => Template::Config(decode(kind, obj)?),
            "ClusterDeploymentTemplate" => Template::Deployment(decode(kind, obj)?),
            "ClusterTemplate" => Template::Generic(decode(kind, obj)?),
            other => return Err(TemplateModelError::UnknownKind(other.to_string())),
        })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Template::Source(_) => "ClusterSourceTemplate",
            Template::Image(_) => "ClusterImageTemplate",
            Template::Config(_) => "ClusterConfigTemplate",
            Template::Deployment(_) => "ClusterDeploymentTemplate",
            Template::Generic(_) => "ClusterTemplate",
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Template::Source(t) => name_of(&t.metadata),
            Template::Image(t) => name_of(&t.metadata),
            Template::Config(t) => name_of(&t.metadata),
            Template::Deployment(t) => name_of(&t.metadata),
            Template::Generic(t) => name_of(&t.metadata),
        }
    }

    fn spec(&self) -> &TemplateSpec {
        match self {
            Template::Source(t) => &t.spec.base,
            Template::Image(t) => &t.spec.base,
            Template::Config(t) => &t.spec.base,
            Template::Deployment(t) => &t.spec.base,
            Template::Generic(t) => &t.spec.base,
        }
    }

    pub fn body(&self) -> Option<TemplateBody> {
        let spec = self.spec();
        match (&spec.template, &spec.ytt) {
            (Some(t), _) => Some(TemplateBody::Template(t.clone())),
            (None, Some(y)) => Some(TemplateBody::Ytt(y.clone())),
            (None, None) => None,
        }
    }

    pub fn default_params(&self) -> &[DefaultParam] {
        &self.spec().params
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.spec().lifecycle.unwrap_or_default()
    }

    /// Explicit rule, or "Succeeded is True" for tekton lifecycles.
    pub fn health_rule(&self) -> Option<HealthRule> {
        match (&self.spec().health_rule, self.lifecycle()) {
            (Some(rule), _) => Some(rule.clone()),
            (None, Lifecycle::Tekton) => Some(HealthRule::single_condition("Succeeded")),
            (None, _) => None,
        }
    }

    pub fn retention_policy(&self) -> RetentionPolicy {
        self.spec().retention_policy.unwrap_or_default()
    }

    /// Read this template's output from a stamped object. Generic templates have none.
    pub fn output(&self, stamped: &Json, inputs: &Inputs) -> Result<Option<Output>, OutputError> {
        match self {
            Template::Source(t) => {
                let url = jsonpath::evaluate(&t.spec.url_path, stamped).map_err(|e| OutputError::path(&t.spec.url_path, e))?;
                let revision = jsonpath::evaluate(&t.spec.revision_path, stamped)
                    .map_err(|e| OutputError::path(&t.spec.revision_path, e))?;
                Ok(Some(Output::Source(SourceOutput { url, revision })))
            }
            Template::Image(t) => jsonpath::evaluate(&t.spec.image_path, stamped)
                .map(|v| Some(Output::Image(v)))
                .map_err(|e| OutputError::path(&t.spec.image_path, e)),
            Template::Config(t) => jsonpath::evaluate(&t.spec.config_path, stamped)
                .map(|v| Some(Output::Config(v)))
                .map_err(|e| OutputError::path(&t.spec.config_path, e)),
            Template::Deployment(t) => {
                deployment_ready(t, stamped)?;
                let deployment = inputs.deployment.clone().ok_or(OutputError::MissingDeployment)?;
                Ok(Some(Output::Source(deployment)))
            }
            Template::Generic(_) => Ok(None),
        }
    }
}

fn deployment_ready(t: &ClusterDeploymentTemplate, stamped: &Json) -> Result<(), OutputError> {
    match &t.spec.observed_completion {
        Some(completion) => {
            let generation = jsonpath::evaluate("metadata.generation", stamped)
                .map_err(|e| OutputError::path("metadata.generation", e))?;
            let observed = jsonpath::evaluate("status.observedGeneration", stamped).map_err(|e| {
                OutputError::ObservedGeneration(format!("failed to evaluate status.observedGeneration: {e}"))
            })?;
            if observed != generation {
                return Err(OutputError::DeploymentCondition(format!(
                    "status.observedGeneration does not equal metadata.generation: {observed} != {generation}"
                )));
            }

            if let Some(failed) = &completion.failed_condition {
                match jsonpath::evaluate(&failed.key, stamped) {
                    Ok(v) if matches_text(&v, &failed.value) => {
                        return Err(OutputError::DeploymentFailedConditionMet(format!(
                            "deployment failure condition [{}] was: {}",
                            failed.key,
                            text(&v)
                        )))
                    }
                    Ok(_) => {}
                    // A failure condition that is absent has not been met.
                    Err(e) if e.is_not_found() => {}
                    Err(e) => return Err(OutputError::path(&failed.key, e)),
                }
            }

            let succeeded = &completion.succeeded_condition;
            let observed = jsonpath::evaluate(&succeeded.key, stamped).map_err(|e| {
                OutputError::DeploymentCondition(format!(
                    "failed to evaluate succeededCondition.Key [{}]: {e}",
                    succeeded.key
                ))
            })?;
            if !matches_text(&observed, &succeeded.value) {
                return Err(OutputError::DeploymentCondition(format!(
                    "deployment success condition [{}] was: {}, expected: {}",
                    succeeded.key,
                    text(&observed),
                    succeeded.value
                )));
            }
            Ok(())
        }
        None => {
            for m in &t.spec.observed_matches {
                let input = jsonpath::evaluate(&m.input, stamped).map_err(|e| {
                    OutputError::DeploymentCondition(format!("could not find value on input [{}]: {e}", m.input))
                })?;
                let output = jsonpath::evaluate(&m.output, stamped).map_err(|e| {
                    OutputError::DeploymentCondition(format!("could not find value on output [{}]: {e}", m.output))
                })?;
                if input != output {
                    return Err(OutputError::DeploymentCondition(format!(
                        "input [{}] and output [{}] do not match: {} != {}",
                        m.input,
                        m.output,
                        text(&input),
                        text(&output)
                    )));
                }
            }
            Ok(())
        }
    }
}

fn text(v: &Json) -> String {
    match v {
        Json::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn matches_text(v: &Json, expected: &str) -> bool {
    text(v) == expected
}

/// ClusterRunTemplate: the body stamped per invocation and the outputs read from the latest success.
#[derive(Debug, Clone)]
pub struct RunTemplate(pub ClusterRunTemplate);

impl RunTemplate {
    pub fn from_object(obj: Json) -> Result<Self, TemplateModelError> {
        decode("ClusterRunTemplate", obj).map(RunTemplate)
    }

    pub fn name(&self) -> &str {
        name_of(&self.0.metadata)
    }

    pub fn body(&self) -> TemplateBody {
        TemplateBody::Template(self.0.spec.template.clone())
    }

    fn read_outputs(&self, obj: &Json) -> Result<BTreeMap<String, Json>, OutputError> {
        let mut out = BTreeMap::new();
        for (key, path) in &self.0.spec.outputs {
            let value = jsonpath::evaluate(path, obj).map_err(|e| OutputError::path(path, e))?;
            out.insert(key.clone(), value);
        }
        Ok(out)
    }

    /// Outputs of the most recently created succeeded object.
    ///
    /// Objects whose `Succeeded` condition is not `True` are skipped. A succeeded object replaces
    /// the current winner only when it was created strictly later. When every succeeded object
    /// fails to produce its outputs the last error is returned; with no succeeded objects the
    /// result is `Ok(None)`.
    pub fn outputs(&self, objects: &[Json]) -> Result<Option<BTreeMap<String, Json>>, OutputError> {
        let mut winner: Option<(DateTime<Utc>, BTreeMap<String, Json>)> = None;
        let mut last_err = None;
        for obj in objects.iter().filter(|o| succeeded(o)) {
            let created = creation_timestamp(obj).unwrap_or(DateTime::<Utc>::MIN_UTC);
            if let Some((best, _)) = &winner {
                if created <= *best {
                    continue;
                }
            }
            match self.read_outputs(obj) {
                Ok(outputs) => winner = Some((created, outputs)),
                Err(e) => last_err = Some(e),
            }
        }
        match (winner, last_err) {
            (Some((_, outputs)), _) => Ok(Some(outputs)),
            (None, Some(e)) => Err(e),
            (None, None) => Ok(None),
        }
    }
}

/// Status of the `Succeeded` condition on an arbitrary object.
pub fn succeeded(obj: &Json) -> bool {
    condition_status(obj, "Succeeded").as_deref() == Some("True")
}

pub fn condition_status(obj: &Json, type_: &str) -> Option<String> {
    obj.pointer("/status/conditions")
        .and_then(|c| c.as_array())
        .and_then(|conds| conds.iter().find(|c| c.get("type").and_then(|t| t.as_str()) == Some(type_)))
        .and_then(|c| c.get("status"))
        .and_then(|s| s.as_str())
        .map(str::to_string)
}

pub fn creation_timestamp(obj: &Json) -> Option<DateTime<Utc>> {
    obj.pointer("/metadata/creationTimestamp")
        .and_then(|v| v.as_str())
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
}

fn name_of(meta: &ObjectMeta) -> &str {
    meta.name.as_deref().unwrap_or_default()
}

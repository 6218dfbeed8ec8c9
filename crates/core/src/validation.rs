//! Admission checks for Cartographer resources.
//!
//! Each validator takes the typed spec and returns the first violation found, phrased for the
//! user who submitted the object.

use std::collections::HashSet;

use carto_eval::jsonpath;
use carto_eval::selector::{OP_DOES_NOT_EXIST, OP_EXISTS, OP_IN, OP_NOT_IN};
use carto_eval::{FieldSelectorRequirement, Selector};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::Value as Json;
use thiserror::Error;

use crate::api::{
    BlueprintParam, BlueprintSpec, ClusterConfigTemplate, ClusterDelivery, ClusterDeploymentTemplate,
    ClusterImageTemplate, ClusterRunTemplate, ClusterSourceTemplate, ClusterSupplyChain, ClusterTemplate,
    HealthRule, Lifecycle, ResourceReference, ResourceTemplateRef, TemplateOption, TemplateSpec,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ValidationError(pub String);

impl ValidationError {
    fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

type Result<T = ()> = std::result::Result<T, ValidationError>;

static DNS_1035: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z]([-a-z0-9]*[a-z0-9])?$").expect("static regex"));

/// Validate a dynamic object of the given kind as submitted to admission.
pub fn validate_object(kind: &str, obj: &Json) -> Result {
    match kind {
        "Workload" | "Deliverable" | "Runnable" => validate_owner_name(kind, obj),
        "ClusterSupplyChain" => validate_supply_chain(&parse::<ClusterSupplyChain>(obj)?.spec.blueprint),
        "ClusterDelivery" => validate_delivery(&parse::<ClusterDelivery>(obj)?.spec.blueprint),
        "ClusterSourceTemplate" => {
            let t = parse::<ClusterSourceTemplate>(obj)?;
            validate_template_spec(&t.spec.base)?;
            validate_path("urlPath", &t.spec.url_path)?;
            validate_path("revisionPath", &t.spec.revision_path)
        }
        "ClusterImageTemplate" => {
            let t = parse::<ClusterImageTemplate>(obj)?;
            validate_template_spec(&t.spec.base)?;
            validate_path("imagePath", &t.spec.image_path)
        }
        "ClusterConfigTemplate" => {
            let t = parse::<ClusterConfigTemplate>(obj)?;
            validate_template_spec(&t.spec.base)?;
            validate_path("configPath", &t.spec.config_path)
        }
        "ClusterDeploymentTemplate" => validate_deployment_template(&parse::<ClusterDeploymentTemplate>(obj)?),
        "ClusterTemplate" => validate_template_spec(&parse::<ClusterTemplate>(obj)?.spec.base),
        "ClusterRunTemplate" => validate_run_template(&parse::<ClusterRunTemplate>(obj)?),
        other => Err(ValidationError::new(format!("unsupported kind [{other}]"))),
    }
}

fn parse<T: DeserializeOwned>(obj: &Json) -> Result<T> {
    serde_json::from_value(obj.clone()).map_err(|e| ValidationError::new(format!("failed to parse object: {e}")))
}

fn validate_owner_name(kind: &str, obj: &Json) -> Result {
    let name = obj.pointer("/metadata/name").and_then(|v| v.as_str()).unwrap_or_default();
    // generateName-only objects get a conforming name from the API server
    if name.is_empty() && obj.pointer("/metadata/generateName").is_some() {
        return Ok(());
    }
    if name.len() > 63 || !DNS_1035.is_match(name) {
        return Err(ValidationError::new(format!(
            "{kind} name [{name}] is not a DNS-1035 label: must consist of lower case alphanumeric characters or '-', \
             start with an alphabetic character, and end with an alphanumeric character"
        )));
    }
    Ok(())
}

pub fn validate_supply_chain(spec: &BlueprintSpec) -> Result {
    validate_blueprint(spec, |field| match field {
        "sources" => &["ClusterSourceTemplate"],
        "images" => &["ClusterImageTemplate"],
        "configs" => &["ClusterConfigTemplate"],
        _ => &[],
    })
}

pub fn validate_delivery(spec: &BlueprintSpec) -> Result {
    for resource in &spec.resources {
        let is_deployment = resource.template_ref.kind == "ClusterDeploymentTemplate";
        if is_deployment && resource.deployment.is_none() {
            return Err(ValidationError::new(format!(
                "spec.resources[{}] is a ClusterDeploymentTemplate and must receive a deployment",
                resource.name
            )));
        }
        if !is_deployment && resource.deployment.is_some() {
            return Err(ValidationError::new(format!(
                "spec.resources[{}] receives a deployment but is not a ClusterDeploymentTemplate",
                resource.name
            )));
        }
        if is_deployment && !resource.configs.is_empty() {
            return Err(ValidationError::new(format!(
                "spec.resources[{}] is a ClusterDeploymentTemplate and must not receive config",
                resource.name
            )));
        }
    }
    validate_blueprint(spec, |field| match field {
        "sources" | "deployment" => &["ClusterSourceTemplate", "ClusterDeploymentTemplate"],
        "configs" => &["ClusterConfigTemplate"],
        _ => &[],
    })
}

fn validate_blueprint(spec: &BlueprintSpec, producers: impl Fn(&str) -> &'static [&'static str]) -> Result {
    if spec.owner_selector().is_empty() {
        return Err(ValidationError::new(
            "at least one selector, selectorMatchExpression, selectorMatchField must be specified",
        ));
    }
    validate_field_requirements(&spec.selector_match_fields)?;

    for param in &spec.params {
        validate_param(param)?;
    }
    for resource in &spec.resources {
        for param in &resource.params {
            validate_param(param).map_err(|e| ValidationError::new(format!("resource [{}] is invalid: {e}", resource.name)))?;
        }
    }

    let mut names = HashSet::new();
    for resource in &spec.resources {
        if !names.insert(resource.name.as_str()) {
            return Err(ValidationError::new(format!("duplicate resource name [{}] found", resource.name)));
        }
    }

    for resource in &spec.resources {
        validate_template_ref(&resource.template_ref)
            .map_err(|e| ValidationError::new(format!("error validating resource [{}]: {e}", resource.name)))?;
    }

    // References must point at an earlier resource, which keeps the graph acyclic.
    for (idx, resource) in spec.resources.iter().enumerate() {
        let earlier = &spec.resources[..idx];
        let deployment = resource
            .deployment
            .as_ref()
            .map(|d| vec![ResourceReference { name: "deployment".into(), resource: d.resource.clone() }])
            .unwrap_or_default();
        for (field, refs) in [
            ("sources", &resource.sources),
            ("images", &resource.images),
            ("configs", &resource.configs),
            ("deployment", &deployment),
        ] {
            for reference in refs {
                let Some(producer) = earlier.iter().find(|r| r.name == reference.resource) else {
                    return Err(ValidationError::new(format!(
                        "invalid {field} for resource [{}]: [{}] is provided by unknown or later resource [{}]",
                        resource.name, reference.name, reference.resource
                    )));
                };
                let allowed = producers(field);
                if !allowed.is_empty() && !allowed.contains(&producer.template_ref.kind.as_str()) {
                    return Err(ValidationError::new(format!(
                        "invalid {field} for resource [{}]: resource [{}] providing [{}] must reference a {}",
                        resource.name,
                        producer.name,
                        reference.name,
                        allowed.join(" or ")
                    )));
                }
            }
        }
    }
    Ok(())
}

fn validate_param(param: &BlueprintParam) -> Result {
    match (&param.value, &param.default) {
        (Some(_), Some(_)) => Err(ValidationError::new(format!(
            "param [{}] is invalid: must set exactly one of value and default",
            param.name
        ))),
        (None, None) => Err(ValidationError::new(format!(
            "param [{}] is invalid: must set exactly one of value and default",
            param.name
        ))),
        _ => Ok(()),
    }
}

fn validate_template_ref(template_ref: &ResourceTemplateRef) -> Result {
    let has_name = template_ref.name.as_deref().map(|n| !n.is_empty()).unwrap_or(false);
    if has_name && !template_ref.options.is_empty() {
        return Err(ValidationError::new(
            "exactly one of templateRef.Name or templateRef.Options must be specified, found both",
        ));
    }
    if !has_name {
        match template_ref.options.len() {
            0 => {
                return Err(ValidationError::new(
                    "exactly one of templateRef.Name or templateRef.Options must be specified, found neither",
                ))
            }
            1 => return Err(ValidationError::new("templateRef.Options must have more than one option")),
            _ => {}
        }
    }
    validate_options(&template_ref.options)
}

fn validate_options(options: &[TemplateOption]) -> Result {
    let pass_throughs = options.iter().filter(|o| o.pass_through.is_some()).count();
    if pass_throughs > 1 {
        return Err(ValidationError::new(format!(
            "cannot have more than one pass through option, found {pass_throughs}"
        )));
    }

    let mut names = HashSet::new();
    for option in options {
        let has_name = option.name.as_deref().map(|n| !n.is_empty()).unwrap_or(false);
        match (has_name, option.pass_through.is_some()) {
            (true, true) => {
                return Err(ValidationError::new(
                    "exactly one of option.Name or option.PassThrough must be specified, found both",
                ))
            }
            (false, false) => {
                return Err(ValidationError::new(
                    "exactly one of option.Name or option.PassThrough must be specified, found neither",
                ))
            }
            _ => {}
        }
        if !names.insert(option.display_name()) {
            return Err(ValidationError::new(format!("duplicate template name [{}] found in options", option.display_name())));
        }
        validate_selector(&option.selector).map_err(|e| {
            ValidationError::new(format!("error validating option [{}] selector: {e}", option.display_name()))
        })?;
    }

    for (i, a) in options.iter().enumerate() {
        for b in &options[i + 1..] {
            if a.selector == b.selector {
                return Err(ValidationError::new(format!(
                    "duplicate selector found in options [{}, {}]",
                    a.display_name(),
                    b.display_name()
                )));
            }
        }
    }
    Ok(())
}

fn validate_selector(selector: &Selector) -> Result {
    if selector.is_empty() {
        return Err(ValidationError::new("at least one of matchLabels, matchExpressions or MatchFields must be specified"));
    }
    // Label syntax and operators are checked by evaluating against an empty label set.
    carto_eval::matches_labels(selector, &Default::default())
        .map_err(|e| ValidationError::new(format!("matchLabels or matchExpressions are not valid: {e}")))?;
    validate_field_requirements(&selector.match_fields)
}

fn validate_field_requirements(reqs: &[FieldSelectorRequirement]) -> Result {
    for req in reqs {
        match req.operator.as_str() {
            OP_EXISTS | OP_DOES_NOT_EXIST if !req.values.is_empty() => {
                return Err(ValidationError::new(format!("cannot specify values with operator [{}]", req.operator)))
            }
            OP_IN | OP_NOT_IN if req.values.is_empty() => {
                return Err(ValidationError::new(format!("must specify values with operator [{}]", req.operator)))
            }
            OP_EXISTS | OP_DOES_NOT_EXIST | OP_IN | OP_NOT_IN => {}
            other => return Err(ValidationError::new(format!("operator [{other}] is invalid"))),
        }
        jsonpath::validate(&req.key)
            .map_err(|e| ValidationError::new(format!("invalid jsonpath for key [{}]: {e}", req.key)))?;
    }
    Ok(())
}

fn validate_path(field: &str, expr: &str) -> Result {
    jsonpath::validate(expr).map_err(|e| ValidationError::new(format!("invalid {field}: {e}")))
}

pub fn validate_template_spec(spec: &TemplateSpec) -> Result {
    match (&spec.template, &spec.ytt) {
        (None, None) => {
            return Err(ValidationError::new("invalid template: must specify one of template or ytt, found neither"))
        }
        (Some(_), Some(_)) => {
            return Err(ValidationError::new("invalid template: must specify one of template or ytt, found both"))
        }
        _ => {}
    }
    if let Some(body) = &spec.template {
        if !body.is_object() {
            return Err(ValidationError::new("invalid template: failed to parse object: template is not an object"));
        }
        reject_namespace(body)?;
    }
    if let Some(rule) = &spec.health_rule {
        validate_health_rule(rule)?;
    }
    if spec.retention_policy.is_some() && spec.lifecycle.unwrap_or_default() == Lifecycle::Mutable {
        return Err(ValidationError::new("invalid template: if lifecycle is mutable, no retention policy may be set"));
    }
    Ok(())
}

fn reject_namespace(body: &Json) -> Result {
    let ns = body.pointer("/metadata/namespace").and_then(|v| v.as_str()).unwrap_or_default();
    if !ns.is_empty() {
        return Err(ValidationError::new("invalid template: template should not set metadata.namespace on the child object"));
    }
    Ok(())
}

fn validate_health_rule(rule: &HealthRule) -> Result {
    let n = [rule.always_healthy.is_some(), rule.single_condition_type.is_some(), rule.multi_match.is_some()]
        .into_iter()
        .filter(|set| *set)
        .count();
    match n {
        0 => Err(ValidationError::new(
            "invalid health rule: must specify one of alwaysHealthy, singleConditionType or multiMatch, found neither",
        )),
        1 => match &rule.multi_match {
            Some(m) if m.unhealthy.is_empty() => Err(ValidationError::new(
                "invalid multi match health rule: unhealthy rule has no matchFields or matchConditions",
            )),
            Some(m) if m.healthy.is_empty() => Err(ValidationError::new(
                "invalid multi match health rule: healthy rule has no matchFields or matchConditions",
            )),
            _ => Ok(()),
        },
        _ => Err(ValidationError::new(
            "invalid health rule: must specify one of alwaysHealthy, singleConditionType or multiMatch, found multiple",
        )),
    }
}

fn validate_deployment_template(t: &ClusterDeploymentTemplate) -> Result {
    validate_template_spec(&t.spec.base)?;
    match (&t.spec.observed_completion, t.spec.observed_matches.is_empty()) {
        (Some(_), false) => Err(ValidationError::new(
            "invalid spec: must set exactly one of spec.ObservedMatches and spec.ObservedCompletion, found both",
        )),
        (None, true) => Err(ValidationError::new(
            "invalid spec: must set exactly one of spec.ObservedMatches and spec.ObservedCompletion, found neither",
        )),
        (Some(c), true) => {
            validate_path("succeededCondition.key", &c.succeeded_condition.key)?;
            match &c.failed_condition {
                Some(f) => validate_path("failedCondition.key", &f.key),
                None => Ok(()),
            }
        }
        (None, false) => {
            for m in &t.spec.observed_matches {
                validate_path("observedMatches.input", &m.input)?;
                validate_path("observedMatches.output", &m.output)?;
            }
            Ok(())
        }
    }
}

fn validate_run_template(t: &ClusterRunTemplate) -> Result {
    if !t.spec.template.is_object() {
        return Err(ValidationError::new("invalid template: failed to parse object: template is not an object"));
    }
    reject_namespace(&t.spec.template)?;
    for (name, expr) in &t.spec.outputs {
        jsonpath::validate(expr)
            .map_err(|e| ValidationError::new(format!("invalid jsonpath for output [{name}]: {e}")))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn supply_chain(resources: Json) -> Json {
        json!({
            "apiVersion": "carto.run/v1alpha1",
            "kind": "ClusterSupplyChain",
            "metadata": { "name": "sc" },
            "spec": { "selector": { "app": "web" }, "resources": resources }
        })
    }

    fn err(kind: &str, obj: &Json) -> String {
        validate_object(kind, obj).unwrap_err().to_string()
    }

    #[test]
    fn accepts_well_formed_supply_chain() {
        let sc = supply_chain(json!([
            { "name": "source", "templateRef": { "kind": "ClusterSourceTemplate", "name": "git" } },
            { "name": "image", "templateRef": { "kind": "ClusterImageTemplate", "name": "kpack" },
              "sources": [{ "name": "src", "resource": "source" }] },
            { "name": "config", "templateRef": { "kind": "ClusterConfigTemplate", "name": "app" },
              "images": [{ "name": "img", "resource": "image" }],
              "params": [{ "name": "port", "default": 8080 }] }
        ]));
        validate_object("ClusterSupplyChain", &sc).unwrap();
    }

    #[test]
    fn duplicate_resource_names() {
        let sc = supply_chain(json!([
            { "name": "a", "templateRef": { "kind": "ClusterTemplate", "name": "x" } },
            { "name": "a", "templateRef": { "kind": "ClusterTemplate", "name": "y" } }
        ]));
        assert_eq!(err("ClusterSupplyChain", &sc), "duplicate resource name [a] found");
    }

    #[test]
    fn references_must_point_backwards() {
        let sc = supply_chain(json!([
            { "name": "image", "templateRef": { "kind": "ClusterImageTemplate", "name": "kpack" },
              "sources": [{ "name": "src", "resource": "source" }] },
            { "name": "source", "templateRef": { "kind": "ClusterSourceTemplate", "name": "git" } }
        ]));
        assert!(err("ClusterSupplyChain", &sc).contains("unknown or later resource [source]"));
    }

    #[test]
    fn references_must_match_producer_kind() {
        let sc = supply_chain(json!([
            { "name": "source", "templateRef": { "kind": "ClusterSourceTemplate", "name": "git" } },
            { "name": "deploy", "templateRef": { "kind": "ClusterTemplate", "name": "app" },
              "images": [{ "name": "img", "resource": "source" }] }
        ]));
        assert!(err("ClusterSupplyChain", &sc).contains("must reference a ClusterImageTemplate"));
    }

    #[test]
    fn template_ref_options() {
        let one = supply_chain(json!([
            { "name": "a", "templateRef": { "kind": "ClusterTemplate", "options": [
                { "name": "x", "selector": { "matchLabels": { "k": "v" } } }
            ] } }
        ]));
        assert!(err("ClusterSupplyChain", &one).contains("must have more than one option"));

        let both = supply_chain(json!([
            { "name": "a", "templateRef": { "kind": "ClusterTemplate", "name": "n", "options": [
                { "name": "x", "selector": { "matchLabels": { "k": "v" } } },
                { "name": "y", "selector": { "matchLabels": { "k": "w" } } }
            ] } }
        ]));
        assert!(err("ClusterSupplyChain", &both).contains("found both"));

        let dup_selector = supply_chain(json!([
            { "name": "a", "templateRef": { "kind": "ClusterTemplate", "options": [
                { "name": "x", "selector": { "matchLabels": { "k": "v" } } },
                { "name": "y", "selector": { "matchLabels": { "k": "v" } } }
            ] } }
        ]));
        assert_eq!(err("ClusterSupplyChain", &dup_selector), "error validating resource [a]: duplicate selector found in options [x, y]");

        let empty_selector = supply_chain(json!([
            { "name": "a", "templateRef": { "kind": "ClusterTemplate", "options": [
                { "name": "x", "selector": {} },
                { "passThrough": "src", "selector": { "matchLabels": { "k": "v" } } }
            ] } }
        ]));
        assert!(err("ClusterSupplyChain", &empty_selector).contains("error validating option [x] selector"));

        let two_pass = supply_chain(json!([
            { "name": "a", "templateRef": { "kind": "ClusterTemplate", "options": [
                { "passThrough": "a", "selector": { "matchLabels": { "k": "v" } } },
                { "passThrough": "b", "selector": { "matchLabels": { "k": "w" } } }
            ] } }
        ]));
        assert!(err("ClusterSupplyChain", &two_pass).contains("more than one pass through option, found 2"));
    }

    #[test]
    fn match_field_operators() {
        let sc = supply_chain(json!([
            { "name": "a", "templateRef": { "kind": "ClusterTemplate", "options": [
                { "name": "x", "selector": { "matchFields": [{ "key": "spec.source.git", "operator": "Exists", "values": ["z"] }] } },
                { "name": "y", "selector": { "matchLabels": { "k": "w" } } }
            ] } }
        ]));
        assert!(err("ClusterSupplyChain", &sc).contains("cannot specify values with operator [Exists]"));
    }

    #[test]
    fn params_need_exactly_one_of_value_and_default() {
        let mut sc = supply_chain(json!([
            { "name": "a", "templateRef": { "kind": "ClusterTemplate", "name": "x" },
              "params": [{ "name": "p", "value": 1, "default": 2 }] }
        ]));
        assert!(err("ClusterSupplyChain", &sc).starts_with("resource [a] is invalid: param [p]"));
        sc["spec"]["resources"][0]["params"] = json!([{ "name": "p" }]);
        assert!(validate_object("ClusterSupplyChain", &sc).is_err());
    }

    #[test]
    fn blueprint_needs_a_selector() {
        let mut sc = supply_chain(json!([]));
        sc["spec"]["selector"] = json!({});
        assert!(err("ClusterSupplyChain", &sc).starts_with("at least one selector"));
    }

    #[test]
    fn delivery_deployment_receivers() {
        let d = json!({
            "apiVersion": "carto.run/v1alpha1", "kind": "ClusterDelivery", "metadata": { "name": "d" },
            "spec": { "selector": { "app": "web" }, "resources": [
                { "name": "source", "templateRef": { "kind": "ClusterSourceTemplate", "name": "git" } },
                { "name": "deployer", "templateRef": { "kind": "ClusterDeploymentTemplate", "name": "app-deploy" } }
            ] }
        });
        assert!(err("ClusterDelivery", &d).contains("must receive a deployment"));

        let mut ok = d.clone();
        ok["spec"]["resources"][1]["deployment"] = json!({ "resource": "source" });
        validate_object("ClusterDelivery", &ok).unwrap();
    }

    #[test]
    fn template_checks() {
        let base = |spec: Json| json!({ "apiVersion": "carto.run/v1alpha1", "kind": "ClusterTemplate", "metadata": { "name": "t" }, "spec": spec });

        assert!(err("ClusterTemplate", &base(json!({}))).contains("found neither"));
        assert!(err("ClusterTemplate", &base(json!({ "template": {}, "ytt": "x" }))).contains("found both"));
        assert!(err("ClusterTemplate", &base(json!({ "template": { "metadata": { "namespace": "x" } } })))
            .contains("should not set metadata.namespace"));
        assert!(err(
            "ClusterTemplate",
            &base(json!({ "template": {}, "lifecycle": "mutable", "retentionPolicy": { "maxFailedRuns": 1, "maxSuccessfulRuns": 1 } }))
        )
        .contains("no retention policy"));
        assert!(err(
            "ClusterTemplate",
            &base(json!({ "template": {}, "healthRule": { "alwaysHealthy": {}, "singleConditionType": "Ready" } }))
        )
        .contains("found multiple"));
        assert!(err(
            "ClusterTemplate",
            &base(json!({ "template": {}, "healthRule": { "multiMatch": {
                "healthy": { "matchConditions": [{ "type": "Ready", "status": "True" }] },
                "unhealthy": {}
            } } }))
        )
        .contains("unhealthy rule has no matchFields"));
        validate_object("ClusterTemplate", &base(json!({ "template": { "kind": "ConfigMap" }, "lifecycle": "immutable" }))).unwrap();
    }

    #[test]
    fn image_template_path_must_parse() {
        let t = json!({
            "apiVersion": "carto.run/v1alpha1", "kind": "ClusterImageTemplate", "metadata": { "name": "t" },
            "spec": { "template": {}, "imagePath": ".data[0" }
        });
        assert!(err("ClusterImageTemplate", &t).starts_with("invalid imagePath"));
    }

    #[test]
    fn deployment_template_completion_rules() {
        let t = |spec: Json| json!({ "apiVersion": "carto.run/v1alpha1", "kind": "ClusterDeploymentTemplate", "metadata": { "name": "t" }, "spec": spec });
        assert!(err("ClusterDeploymentTemplate", &t(json!({ "template": {} }))).contains("found neither"));
        assert!(err(
            "ClusterDeploymentTemplate",
            &t(json!({
                "template": {},
                "observedCompletion": { "succeededCondition": { "key": "status.ok", "value": "True" } },
                "observedMatches": [{ "input": "spec.a", "output": "status.a" }]
            }))
        )
        .contains("found both"));
    }

    #[test]
    fn run_template_outputs_must_parse() {
        let t = json!({
            "apiVersion": "carto.run/v1alpha1", "kind": "ClusterRunTemplate", "metadata": { "name": "t" },
            "spec": { "template": { "kind": "Pod" }, "outputs": { "url": "status.results[?(@.name==\"url\")" } }
        });
        assert!(err("ClusterRunTemplate", &t).contains("invalid jsonpath for output [url]"));
    }

    #[test]
    fn owner_names_are_dns_1035() {
        let w = |name: &str| json!({ "metadata": { "name": name } });
        validate_object("Workload", &w("petclinic")).unwrap();
        assert!(validate_object("Workload", &w("1petclinic")).is_err());
        assert!(validate_object("Workload", &w("Pet")).is_err());
        assert!(validate_object("Deliverable", &w("pet.clinic")).is_err());
    }
}

//! Health of stamped objects, per resource and aggregated for the owner.

use carto_core::api::{HealthMatchFieldSelectorRequirement, HealthMatchRule, HealthRule, MultiMatchHealthRule, RealizedResource};
use carto_core::conditions::{self, reasons};
use carto_core::{Condition, ConditionManager, ConditionStatus, API_VERSION};
use carto_eval::{jsonpath, matches_field};
use serde_json::Value as Json;

fn healthy(status: ConditionStatus, reason: &str) -> Condition {
    Condition::new(conditions::HEALTHY, status, reason)
}

/// A condition read from `status.conditions` of an arbitrary object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectCondition {
    pub status: String,
    pub message: String,
}

pub fn object_condition(obj: &Json, type_: &str) -> Option<ObjectCondition> {
    let conds = obj.pointer("/status/conditions")?.as_array()?;
    let found = conds.iter().find(|c| c.get("type").and_then(|t| t.as_str()) == Some(type_))?;
    let text = |key: &str| found.get(key).and_then(|v| v.as_str()).unwrap_or_default().to_string();
    Some(ObjectCondition { status: text("status"), message: text("message") })
}

fn is_cluster_template(realized: &RealizedResource) -> bool {
    realized
        .template_ref
        .as_ref()
        .map(|r| r.kind == "ClusterTemplate" && r.api_version == API_VERSION)
        .unwrap_or(false)
}

/// `Healthy` condition of one resource.
///
/// Without a rule, health follows outputs: a resource with outputs is healthy, a ClusterTemplate
/// resource is healthy once it stamped something, and anything else waits for an output.
pub fn determine_health(rule: Option<&HealthRule>, realized: Option<&RealizedResource>, stamped: Option<&Json>) -> Condition {
    let Some(rule) = rule else {
        return match realized {
            None => healthy(ConditionStatus::Unknown, reasons::NO_RESOURCE),
            Some(r) if !r.outputs.is_empty() => healthy(ConditionStatus::True, reasons::OUTPUT_AVAILABLE),
            Some(r) if is_cluster_template(r) => match r.stamped_ref {
                Some(_) => healthy(ConditionStatus::True, reasons::ALWAYS_HEALTHY),
                None => healthy(ConditionStatus::Unknown, reasons::NO_STAMPED_OBJECT),
            },
            Some(_) => healthy(ConditionStatus::Unknown, reasons::OUTPUT_NOT_AVAILABLE),
        };
    };
    if rule.always_healthy.is_some() {
        return healthy(ConditionStatus::True, reasons::ALWAYS_HEALTHY);
    }
    if let Some(obj) = stamped {
        if let Some(type_) = rule.single_condition_type.as_deref().filter(|t| !t.is_empty()) {
            return single_condition(type_, obj);
        }
        if let Some(multi) = &rule.multi_match {
            return multi_match(multi, obj);
        }
    }
    healthy(ConditionStatus::Unknown, reasons::UNKNOWN)
}

/// Health status alone, as used to pick and retain immutable objects.
pub fn object_health(rule: Option<&HealthRule>, obj: &Json) -> ConditionStatus {
    match rule {
        Some(rule) => determine_health(Some(rule), None, Some(obj)).status,
        None => ConditionStatus::True,
    }
}

fn single_condition(type_: &str, obj: &Json) -> Condition {
    let reason = format!("{type_}Condition");
    match object_condition(obj, type_) {
        Some(c) => {
            let status = match c.status.as_str() {
                "True" => ConditionStatus::True,
                "False" => ConditionStatus::False,
                _ => ConditionStatus::Unknown,
            };
            healthy(status, &reason).with_message(c.message)
        }
        None => healthy(ConditionStatus::Unknown, &reason)
            .with_message(format!("condition with type [{type_}] not found on resource status")),
    }
}

fn multi_match(rule: &MultiMatchHealthRule, obj: &Json) -> Condition {
    if let Some(c) = any_unhealthy(&rule.unhealthy, obj) {
        return c;
    }
    if let Some(c) = all_healthy(&rule.healthy, obj) {
        return c;
    }
    healthy(ConditionStatus::Unknown, reasons::NO_MATCHES_FULFILLED)
}

fn condition_message(c: &ObjectCondition) -> String {
    format!("condition status: {}, message: {}", c.status, c.message)
}

fn field_message(req: &HealthMatchFieldSelectorRequirement, obj: &Json) -> String {
    let render = |v: Json| match v {
        Json::String(s) => s,
        other => other.to_string(),
    };
    let value = jsonpath::evaluate(&req.requirement.key, obj)
        .map(render)
        .unwrap_or_else(|_| "<error retrieving field value>".to_string());
    let path = req.message_path.as_deref().unwrap_or_default();
    let message = jsonpath::evaluate(path, obj)
        .map(render)
        .unwrap_or_else(|_| format!("unknown, error retrieving message path [{path}]"));
    format!("field value: {value}, message: {message}")
}

fn any_unhealthy(rule: &HealthMatchRule, obj: &Json) -> Option<Condition> {
    for req in &rule.match_conditions {
        if let Some(c) = object_condition(obj, &req.type_).filter(|c| c.status == req.status) {
            return Some(healthy(ConditionStatus::False, reasons::MATCH_CONDITION).with_message(condition_message(&c)));
        }
    }
    for req in &rule.match_fields {
        if matches_field(&req.requirement, obj).unwrap_or(false) {
            return Some(healthy(ConditionStatus::False, reasons::MATCH_FIELD).with_message(field_message(req, obj)));
        }
    }
    None
}

fn all_healthy(rule: &HealthMatchRule, obj: &Json) -> Option<Condition> {
    let mut first: Option<(&str, String)> = None;
    for req in &rule.match_conditions {
        let c = object_condition(obj, &req.type_).filter(|c| c.status == req.status)?;
        if first.is_none() {
            first = Some((reasons::MATCH_CONDITION, condition_message(&c)));
        }
    }
    for req in &rule.match_fields {
        if !matches_field(&req.requirement, obj).unwrap_or(false) {
            return None;
        }
        if first.is_none() {
            first = Some((reasons::MATCH_FIELD, field_message(req, obj)));
        }
    }
    let (reason, message) = first.unwrap_or_default();
    Some(healthy(ConditionStatus::True, reason).with_message(message))
}

/// Owner `ResourcesHealthy`: every resource's `Healthy` condition folded together.
pub fn owner_health_condition(resources: &[RealizedResource], previous: &[Condition], now: &str) -> Condition {
    let prev: Vec<Condition> = conditions::find(previous, conditions::RESOURCES_HEALTHY).cloned().into_iter().collect();
    let mut manager = ConditionManager::new(conditions::RESOURCES_HEALTHY, &prev, now);
    for resource in resources {
        if let Some(c) = conditions::find(&resource.conditions, conditions::HEALTHY) {
            manager.add_positive(c.clone());
        }
    }
    let (conds, _) = manager.finalize();
    let mut top = conds.last().cloned().unwrap_or_else(|| {
        Condition::new(conditions::RESOURCES_HEALTHY, ConditionStatus::Unknown, reasons::UNKNOWN)
    });
    top.reason = reasons::HEALTHY_CONDITION_RULE.to_string();
    top
}

#[cfg(test)]
mod tests {
    use super::*;
    use carto_core::api::{ConditionRequirement, ObjectReference, OutputEntry};
    use carto_core::FieldSelectorRequirement;
    use serde_json::json;

    fn obj(conds: Json) -> Json {
        json!({ "status": { "conditions": conds, "phase": "Failed", "reason": "OOMKilled" } })
    }

    #[test]
    fn no_rule_follows_outputs() {
        assert_eq!(determine_health(None, None, None).reason, "NoResource");

        let mut r = RealizedResource { name: "img".into(), ..Default::default() };
        assert_eq!(determine_health(None, Some(&r), None).reason, "OutputNotAvailable");

        r.outputs.push(OutputEntry {
            name: "image".into(),
            preview: "x".into(),
            digest: "sha256:0".into(),
            last_transition_time: String::new(),
        });
        let c = determine_health(None, Some(&r), None);
        assert_eq!((c.status, c.reason.as_str()), (ConditionStatus::True, "OutputAvailable"));

        let tpl = RealizedResource {
            name: "plain".into(),
            template_ref: Some(ObjectReference {
                kind: "ClusterTemplate".into(),
                namespace: None,
                name: "t".into(),
                api_version: API_VERSION.into(),
            }),
            ..Default::default()
        };
        assert_eq!(determine_health(None, Some(&tpl), None).reason, "NoStampedObject");
    }

    #[test]
    fn single_condition_mirrors_status() {
        let rule = HealthRule::single_condition("Ready");
        let c = determine_health(Some(&rule), None, Some(&obj(json!([{ "type": "Ready", "status": "False", "message": "crash" }]))));
        assert_eq!((c.status, c.reason.as_str(), c.message.as_str()), (ConditionStatus::False, "ReadyCondition", "crash"));

        let missing = determine_health(Some(&rule), None, Some(&obj(json!([]))));
        assert_eq!(missing.status, ConditionStatus::Unknown);
        assert_eq!(missing.message, "condition with type [Ready] not found on resource status");

        assert_eq!(determine_health(Some(&rule), None, None).reason, "Unknown");
    }

    #[test]
    fn multi_match_unhealthy_wins() {
        let rule = HealthRule {
            multi_match: Some(MultiMatchHealthRule {
                healthy: HealthMatchRule {
                    match_conditions: vec![ConditionRequirement { type_: "Ready".into(), status: "True".into() }],
                    match_fields: vec![],
                },
                unhealthy: HealthMatchRule {
                    match_conditions: vec![],
                    match_fields: vec![HealthMatchFieldSelectorRequirement {
                        requirement: FieldSelectorRequirement {
                            key: "status.phase".into(),
                            operator: "In".into(),
                            values: vec!["Failed".into()],
                        },
                        message_path: Some("status.reason".into()),
                    }],
                },
            }),
            ..Default::default()
        };
        let c = determine_health(Some(&rule), None, Some(&obj(json!([{ "type": "Ready", "status": "True" }]))));
        assert_eq!(c.status, ConditionStatus::False);
        assert_eq!(c.reason, "MatchField");
        assert_eq!(c.message, "field value: Failed, message: OOMKilled");

        let pending = json!({ "status": { "phase": "Running", "conditions": [] } });
        assert_eq!(determine_health(Some(&rule), None, Some(&pending)).reason, "NoMatchesFulfilled");

        let ok = json!({ "status": { "phase": "Running", "conditions": [{ "type": "Ready", "status": "True", "message": "up" }] } });
        let c = determine_health(Some(&rule), None, Some(&ok));
        assert_eq!((c.status, c.reason.as_str()), (ConditionStatus::True, "MatchCondition"));
        assert_eq!(c.message, "condition status: True, message: up");
    }

    #[test]
    fn owner_health_uses_rule_reason() {
        let mut a = RealizedResource { name: "a".into(), ..Default::default() };
        a.conditions.push(Condition::new("Healthy", ConditionStatus::True, "OutputAvailable"));
        let mut b = RealizedResource { name: "b".into(), ..Default::default() };
        b.conditions.push(Condition::new("Healthy", ConditionStatus::Unknown, "OutputNotAvailable"));

        let c = owner_health_condition(&[a.clone(), b], &[], "2024-01-01T00:00:00Z");
        assert_eq!((c.type_.as_str(), c.status, c.reason.as_str()), ("ResourcesHealthy", ConditionStatus::Unknown, "HealthyConditionRule"));

        let c = owner_health_condition(&[a], &[], "2024-01-01T00:00:00Z");
        assert_eq!(c.status, ConditionStatus::True);
    }
}

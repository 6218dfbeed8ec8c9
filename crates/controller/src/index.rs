//! Reverse lookups used to enqueue dependents when a blueprint or template changes.

use std::collections::BTreeMap;

use carto_core::api::{BlueprintSpec, RunnableSpec};
use carto_eval::{matches_labels, Selector};

use crate::blueprint::referenced_templates;

/// Whether owner labels satisfy the label part of a blueprint's selector.
///
/// Field requirements are left to selection; erring towards a match only costs a reconcile.
pub fn blueprint_selects_labels(spec: &BlueprintSpec, labels: &BTreeMap<String, String>) -> bool {
    let selector = Selector {
        match_labels: spec.selector.clone(),
        match_expressions: spec.selector_match_expressions.clone(),
        match_fields: Vec::new(),
    };
    matches_labels(&selector, labels).unwrap_or(false)
}

pub fn blueprint_uses_template(spec: &BlueprintSpec, kind: &str, name: &str) -> bool {
    referenced_templates(spec).contains(&(kind.to_string(), name.to_string()))
}

pub fn runnable_uses_template(spec: &RunnableSpec, name: &str) -> bool {
    spec.run_template_ref.name == name
}

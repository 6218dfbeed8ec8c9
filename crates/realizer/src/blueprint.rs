//! Walking a blueprint's resources in order and recording what each one realized.

use carto_core::api::{BlueprintResource, ObjectReference, OutputEntry, RealizedResource, API_VERSION};
use carto_core::conditions::{self, reasons};
use carto_core::{Condition, ConditionManager, ConditionStatus};
use carto_templates::{digest, input_names, preview, Output, OutputsByResource};
use tracing::{debug, info, warn};

use crate::client::ObjectKey;
use crate::errors::RealizerError;
use crate::health::determine_health;
use crate::resource::{Realization, ResourceRealizer};

/// Result of realizing every resource of a blueprint.
#[derive(Debug, Default)]
pub struct BlueprintRealization {
    /// One record per blueprint resource, in blueprint order.
    pub resources: Vec<RealizedResource>,
    pub outputs: OutputsByResource,
    /// The first resource error; later resources were still realized.
    pub first_error: Option<RealizerError>,
}

/// Status entries for an output. `lastTransitionTime` is kept from the previous entry of the same
/// name while its digest is unchanged.
pub fn output_entries(previous: Option<&RealizedResource>, output: Option<&Output>, now: &str) -> Vec<OutputEntry> {
    let Some(output) = output else {
        return Vec::new();
    };
    output
        .entries()
        .into_iter()
        .map(|(name, value)| {
            let digest = digest(value);
            let last_transition_time = previous
                .and_then(|p| p.outputs.iter().find(|o| o.name == name))
                .filter(|o| o.digest == digest)
                .map(|o| o.last_transition_time.clone())
                .unwrap_or_else(|| now.to_string());
            OutputEntry { name: name.to_string(), preview: preview(value), digest, last_transition_time }
        })
        .collect()
}

fn resource_conditions(
    previous: Option<&RealizedResource>,
    error: Option<&RealizerError>,
    healthy: Option<Condition>,
    now: &str,
) -> Vec<Condition> {
    let prev = previous.map(|p| p.conditions.as_slice()).unwrap_or_default();
    let mut manager = ConditionManager::new(conditions::READY, prev, now);
    match error {
        Some(e) => manager.add_positive(e.submitted_condition(conditions::RESOURCE_SUBMITTED)),
        None => manager.add_positive(Condition::new(
            conditions::RESOURCE_SUBMITTED,
            ConditionStatus::True,
            reasons::RESOURCE_SUBMISSION_COMPLETE,
        )),
    }
    if let Some(h) = healthy {
        manager.add_positive(h);
    }
    manager.finalize().0
}

fn realized_resource(
    resource: &BlueprintResource,
    done: &Realization,
    previous: Option<&RealizedResource>,
    now: &str,
) -> (RealizedResource, Option<Condition>) {
    let mut realized = RealizedResource {
        name: resource.name.clone(),
        inputs: input_names(resource),
        stamped_ref: done.stamped.as_ref().map(ObjectReference::from_object),
        ..Default::default()
    };
    if done.template.is_some() || done.pass_through {
        realized.outputs = output_entries(previous, done.output.as_ref(), now);
    }
    let healthy = match &done.template {
        Some(template) => {
            realized.template_ref = Some(ObjectReference {
                kind: template.kind().to_string(),
                namespace: None,
                name: done.template_name.clone(),
                api_version: API_VERSION.to_string(),
            });
            Some(determine_health(template.health_rule().as_ref(), Some(&realized), done.stamped.as_ref()))
        }
        None if done.pass_through => Some(determine_health(None, Some(&realized), None)),
        None => None,
    };
    (realized, healthy)
}

/// Realize `resources` in order. Each resource sees the outputs of the ones before it.
///
/// A resource that produced no template or no stamped object keeps its previous record, with
/// the current error reported on top. Pass-through resources are always recorded afresh.
pub async fn realize_blueprint(
    realizer: &ResourceRealizer<'_>,
    resources: &[BlueprintResource],
    previous: &[RealizedResource],
    now: &str,
) -> BlueprintRealization {
    let mut result = BlueprintRealization::default();
    for resource in resources {
        let done = realizer.realize(resource, &result.outputs).await;
        if let Some(obj) = &done.stamped {
            debug!(resource = %resource.name, object = %ObjectKey::of(obj), "realized resource as object");
        }
        if let Some(out) = &done.output {
            result.outputs.insert(resource.name.clone(), out.clone());
        }

        let prev = previous.iter().find(|p| p.name == resource.name);
        // A pass-through has no object of its own to fall back on; its record always reflects
        // this round, so a failed forward leaves it without outputs.
        let carried = !done.pass_through && (done.stamped.is_none() || done.template.is_none());
        let (mut realized, healthy) = match prev {
            Some(p) if carried => {
                let healthy = conditions::find(&p.conditions, conditions::HEALTHY).cloned();
                (RealizedResource { conditions: Vec::new(), ..p.clone() }, healthy)
            }
            _ => realized_resource(resource, &done, prev, now),
        };

        if prev.map(|p| p.outputs.as_slice()) != Some(realized.outputs.as_slice()) && !realized.outputs.is_empty() {
            info!(resource = %resource.name, pass_through = done.pass_through, "found a new output");
        }
        let was_healthy = prev.and_then(|p| conditions::find(&p.conditions, conditions::HEALTHY)).map(|c| c.status);
        let now_healthy = healthy.as_ref().map(|c| c.status);
        if was_healthy != now_healthy {
            if let Some(status) = now_healthy {
                info!(resource = %resource.name, %status, "healthy status changed");
            }
        }

        realized.conditions = resource_conditions(prev, done.error.as_ref(), healthy, now);
        if let Some(e) = done.error {
            warn!(resource = %resource.name, error = %e, "failed to realize resource");
            if result.first_error.is_none() {
                result.first_error = Some(e);
            }
        }
        result.resources.push(realized);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const T0: &str = "2024-01-01T00:00:00Z";
    const T1: &str = "2024-01-01T00:01:00Z";

    #[test]
    fn output_time_follows_digest() {
        let first = RealizedResource {
            name: "image".into(),
            outputs: output_entries(None, Some(&Output::Image(json!("a"))), T0),
            ..Default::default()
        };
        assert_eq!(first.outputs[0].last_transition_time, T0);

        let same = output_entries(Some(&first), Some(&Output::Image(json!("a"))), T1);
        assert_eq!(same[0].last_transition_time, T0);

        let changed = output_entries(Some(&first), Some(&Output::Image(json!("b"))), T1);
        assert_eq!(changed[0].last_transition_time, T1);
        assert_ne!(changed[0].digest, first.outputs[0].digest);

        assert!(output_entries(Some(&first), None, T1).is_empty());
    }

    #[test]
    fn submitted_and_healthy_fold_into_ready() {
        let conds = resource_conditions(
            None,
            None,
            Some(Condition::new(conditions::HEALTHY, ConditionStatus::True, reasons::OUTPUT_AVAILABLE)),
            T0,
        );
        let types: Vec<_> = conds.iter().map(|c| c.type_.as_str()).collect();
        assert_eq!(types, ["ResourceSubmitted", "Healthy", "Ready"]);
        assert_eq!(conds[2].status, ConditionStatus::True);
    }
}

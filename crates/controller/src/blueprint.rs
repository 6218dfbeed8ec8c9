//! ClusterSupplyChain / ClusterDelivery reconciliation: every referenced template must exist.

use std::collections::BTreeSet;

use carto_core::api::{BlueprintSpec, BlueprintStatus, API_VERSION};
use carto_core::conditions::{self, reasons};
use carto_core::{Condition, ConditionManager, ConditionStatus};
use carto_realizer::client::name_of;
use carto_realizer::{ClusterClient, ObjectKey};
use metrics::counter;
use serde_json::{json, Value as Json};
use tracing::{debug, instrument};

use crate::errors::ReconcileError;

/// `(kind, name)` of every template a blueprint refers to, directly or through options.
pub fn referenced_templates(spec: &BlueprintSpec) -> BTreeSet<(String, String)> {
    let mut refs = BTreeSet::new();
    for resource in &spec.resources {
        let kind = &resource.template_ref.kind;
        if let Some(name) = &resource.template_ref.name {
            refs.insert((kind.clone(), name.clone()));
        }
        for option in &resource.template_ref.options {
            if let Some(name) = &option.name {
                refs.insert((kind.clone(), name.clone()));
            }
        }
    }
    refs
}

/// Reconcile one blueprint object of kind `kind`; returns whether the status was written.
#[instrument(skip_all, fields(kind = kind, name = name_of(blueprint)))]
pub async fn reconcile_blueprint(
    client: &dyn ClusterClient,
    kind: &'static str,
    blueprint: &Json,
    now: &str,
) -> Result<bool, ReconcileError> {
    let spec: BlueprintSpec = serde_json::from_value(blueprint["spec"].clone())
        .map_err(|e| ReconcileError::Decode { kind, message: e.to_string() })?;
    let previous: BlueprintStatus = blueprint
        .get("status")
        .cloned()
        .and_then(|s| serde_json::from_value(s).ok())
        .unwrap_or_default();

    let mut missing = Vec::new();
    for (template_kind, name) in referenced_templates(&spec) {
        match client.get(&ObjectKey::new(API_VERSION, &template_kind, None, &name)).await {
            Ok(_) => {}
            Err(e) if e.is_not_found() => missing.push(format!("{template_kind}/{name}")),
            Err(e) => return Err(ReconcileError::Templates(e)),
        }
    }

    let mut manager = ConditionManager::new(conditions::READY, &previous.conditions, now).with_inherited_reason();
    if missing.is_empty() {
        manager.add_positive(Condition::new(conditions::TEMPLATES_READY, ConditionStatus::True, reasons::READY));
    } else {
        debug!(missing = ?missing, "templates not found");
        manager.add_positive(
            Condition::new(conditions::TEMPLATES_READY, ConditionStatus::False, reasons::TEMPLATES_NOT_FOUND)
                .with_message(format!("templates not found: {}", missing.join(", "))),
        );
    }
    let status = BlueprintStatus {
        observed_generation: blueprint.pointer("/metadata/generation").and_then(|v| v.as_i64()),
        conditions: manager.finalize().0,
    };
    if status == previous {
        counter!("carto_status_updates_skipped_total", 1u64, "kind" => kind);
        return Ok(false);
    }

    let mut updated = blueprint.clone();
    updated["status"] = json!(status);
    client
        .update_status(&updated)
        .await
        .map_err(|source| ReconcileError::StatusUpdate { key: ObjectKey::of(blueprint).to_string(), source })?;
    counter!("carto_status_updates_total", 1u64, "kind" => kind);
    Ok(true)
}

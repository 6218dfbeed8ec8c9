//! Workload and Deliverable reconciliation: pick the blueprint, realize it, report status.

use std::collections::BTreeMap;

use carto_core::api::{BlueprintSpec, ObjectReference, RealizedResource, API_VERSION};
use carto_core::conditions::{self, reasons};
use carto_core::{Condition, ConditionManager, ConditionStatus, OwnerKind, OwnerStatus};
use carto_realizer::client::{name_of, namespace_of};
use carto_realizer::{owner_health_condition, realize_blueprint, ClusterClient, ObjectKey, ResourceRealizer};
use carto_templates::Ytt;
use metrics::counter;
use serde_json::{json, Value as Json};
use tracing::{debug, info, instrument, warn};

use crate::errors::{needs_retry, ReconcileError};
use crate::selection::select_blueprint;
use crate::service_account::{act_as, ServiceAccount};

/// What a reconcile changed.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct OwnerOutcome {
    pub status_updated: bool,
    pub orphans_deleted: usize,
    /// `(apiVersion, kind)` of every object stamped this round.
    pub stamped_kinds: Vec<(String, String)>,
}

fn stamped_kinds(resources: &[RealizedResource]) -> Vec<(String, String)> {
    let mut kinds: Vec<(String, String)> =
        resources.iter().filter_map(|r| r.stamped_ref.as_ref()).map(|r| (r.api_version.clone(), r.kind.clone())).collect();
    kinds.sort();
    kinds.dedup();
    kinds
}

pub struct OwnerReconciler<'a> {
    client: &'a dyn ClusterClient,
    kind: OwnerKind,
    ytt: Option<&'a Ytt>,
}

/// The blueprint's own `Ready` condition, when it is not `True`.
fn blueprint_not_ready(kind: OwnerKind, blueprint: &Json) -> Option<Condition> {
    let conds: Vec<Condition> = blueprint
        .pointer("/status/conditions")
        .cloned()
        .and_then(|c| serde_json::from_value(c).ok())
        .unwrap_or_default();
    match conditions::find(&conds, conditions::READY) {
        Some(c) if c.status == ConditionStatus::True => None,
        Some(c) => Some(
            Condition::new(kind.blueprint_ready_condition(), ConditionStatus::False, &c.reason)
                .with_message(c.message.clone()),
        ),
        None => Some(
            Condition::new(kind.blueprint_ready_condition(), ConditionStatus::False, reasons::UNKNOWN)
                .with_message(format!("{} [{}] has not been reconciled", kind.blueprint_noun(), name_of(blueprint))),
        ),
    }
}

/// Stamped objects recorded in `previous` that no resource in `current` points at any more.
pub fn orphaned_refs<'p>(previous: &'p [RealizedResource], current: &[RealizedResource]) -> Vec<&'p ObjectReference> {
    previous
        .iter()
        .filter_map(|r| r.stamped_ref.as_ref())
        .filter(|old| !current.iter().any(|r| r.stamped_ref.as_ref() == Some(*old)))
        .collect()
}

fn reference_object(r: &ObjectReference) -> Json {
    let mut metadata = json!({ "name": r.name });
    if let Some(ns) = &r.namespace {
        metadata["namespace"] = json!(ns);
    }
    json!({ "apiVersion": r.api_version, "kind": r.kind, "metadata": metadata })
}

async fn delete_orphans(client: &dyn ClusterClient, previous: &[RealizedResource], current: &[RealizedResource]) -> usize {
    let mut deleted = 0;
    for orphan in orphaned_refs(previous, current) {
        let obj = reference_object(orphan);
        match client.delete(&obj).await {
            Ok(()) => {
                info!(object = %ObjectKey::of(&obj), "deleted orphaned stamped object");
                deleted += 1;
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => warn!(object = %ObjectKey::of(&obj), error = %e, "failed to delete orphaned stamped object"),
        }
    }
    deleted
}

impl<'a> OwnerReconciler<'a> {
    pub fn new(client: &'a dyn ClusterClient, kind: OwnerKind) -> Self {
        Self { client, kind, ytt: None }
    }

    pub fn with_ytt(mut self, ytt: &'a Ytt) -> Self {
        self.ytt = Some(ytt);
        self
    }

    async fn blueprints(&self) -> Result<Vec<(Json, BlueprintSpec)>, ReconcileError> {
        let kind = self.kind.blueprint_kind();
        let objects = self
            .client
            .list(API_VERSION, kind, None, &BTreeMap::new())
            .await
            .map_err(|source| ReconcileError::List { kind, source })?;
        Ok(objects
            .into_iter()
            .filter_map(|obj| match serde_json::from_value::<BlueprintSpec>(obj["spec"].clone()) {
                Ok(spec) => Some((obj, spec)),
                Err(e) => {
                    warn!(blueprint = name_of(&obj), error = %e, "skipping undecodable blueprint");
                    None
                }
            })
            .collect())
    }

    #[instrument(skip_all, fields(kind = %self.kind, name = name_of(owner), namespace = ?namespace_of(owner)))]
    pub async fn reconcile(&self, owner: &Json, now: &str) -> Result<OwnerOutcome, ReconcileError> {
        let kind = self.kind;
        let previous = OwnerStatus::from_owner(kind, owner);
        let mut status = OwnerStatus {
            observed_generation: owner.pointer("/metadata/generation").and_then(|v| v.as_i64()),
            ..previous.clone()
        };
        let mut manager = ConditionManager::new(conditions::READY, &previous.conditions, now).with_inherited_reason();
        let mut outcome = OwnerOutcome::default();

        let candidates = self.blueprints().await?;
        let (blueprint, spec) = match select_blueprint(kind, owner, &candidates) {
            Ok(found) => found,
            Err(e) => {
                info!(error = %e, "no blueprint selected");
                manager.add_positive(e.condition(kind));
                status.conditions = manager.finalize().0;
                outcome.status_updated = self.write_status(owner, &previous, status).await?;
                return Ok(outcome);
            }
        };
        let blueprint_name = name_of(blueprint);
        status.blueprint_ref = Some(ObjectReference {
            kind: kind.blueprint_kind().to_string(),
            namespace: None,
            name: blueprint_name.to_string(),
            api_version: API_VERSION.to_string(),
        });

        if let Some(not_ready) = blueprint_not_ready(kind, blueprint) {
            debug!(blueprint = blueprint_name, reason = %not_ready.reason, "blueprint not ready");
            manager.add_positive(not_ready);
            status.conditions = manager.finalize().0;
            outcome.status_updated = self.write_status(owner, &previous, status).await?;
            return Ok(outcome);
        }
        manager.add_positive(Condition::new(kind.blueprint_ready_condition(), ConditionStatus::True, reasons::READY));

        let account = ServiceAccount::resolve(
            namespace_of(owner).unwrap_or_default(),
            owner.pointer("/spec/serviceAccountName").and_then(|v| v.as_str()),
            spec.service_account_ref.as_ref(),
        );
        let acting = match act_as(self.client, &account).await {
            Ok(acting) => acting,
            Err(e) => {
                info!(error = %e, "service account unusable");
                manager.add_positive(e.condition(conditions::RESOURCES_SUBMITTED));
                status.conditions = manager.finalize().0;
                outcome.status_updated = self.write_status(owner, &previous, status).await?;
                return Ok(outcome);
            }
        };
        let client = acting.client();

        let mut realizer = ResourceRealizer::new(client, kind, owner, blueprint_name, &spec.params);
        if let Some(ytt) = self.ytt {
            realizer = realizer.with_ytt(ytt);
        }
        let realized = realize_blueprint(&realizer, &spec.resources, &previous.resources, now).await;

        match &realized.first_error {
            Some(e) => manager.add_positive(e.submitted_condition(conditions::RESOURCES_SUBMITTED)),
            None => manager.add_positive(Condition::new(
                conditions::RESOURCES_SUBMITTED,
                ConditionStatus::True,
                reasons::RESOURCE_SUBMISSION_COMPLETE,
            )),
        }
        manager.add_positive(owner_health_condition(&realized.resources, &previous.conditions, now));
        status.conditions = manager.finalize().0;
        status.resources = realized.resources;
        outcome.stamped_kinds = stamped_kinds(&status.resources);

        outcome.orphans_deleted = delete_orphans(client, &previous.resources, &status.resources).await;
        outcome.status_updated = self.write_status(owner, &previous, status).await?;

        match realized.first_error {
            Some(e) if needs_retry(&e) => Err(ReconcileError::Realize(e)),
            _ => Ok(outcome),
        }
    }

    /// Write `status` unless it equals what the owner already reports.
    async fn write_status(&self, owner: &Json, previous: &OwnerStatus, status: OwnerStatus) -> Result<bool, ReconcileError> {
        let kind = self.kind.kind();
        if status == *previous {
            counter!("carto_status_updates_skipped_total", 1u64, "kind" => kind);
            return Ok(false);
        }
        let mut updated = owner.clone();
        updated["status"] = status.to_json(self.kind);
        self.client.update_status(&updated).await.map_err(|source| ReconcileError::StatusUpdate {
            key: ObjectKey::of(owner).to_string(),
            source,
        })?;
        counter!("carto_status_updates_total", 1u64, "kind" => kind);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stamped(name: &str) -> RealizedResource {
        RealizedResource {
            name: name.into(),
            stamped_ref: Some(ObjectReference {
                kind: "ConfigMap".into(),
                namespace: Some("dev".into()),
                name: format!("{name}-cm"),
                api_version: "v1".into(),
            }),
            ..Default::default()
        }
    }

    #[test]
    fn orphans_are_refs_no_longer_stamped() {
        let previous = [stamped("a"), stamped("b")];
        let current = [stamped("a")];
        let orphans = orphaned_refs(&previous, &current);
        assert_eq!(orphans.len(), 1);
        assert_eq!(orphans[0].name, "b-cm");
        assert_eq!(reference_object(orphans[0])["metadata"], json!({ "name": "b-cm", "namespace": "dev" }));
    }

    #[test]
    fn unreconciled_blueprint_is_not_ready() {
        let bp = json!({ "metadata": { "name": "web" } });
        let c = blueprint_not_ready(OwnerKind::Workload, &bp).unwrap();
        assert_eq!((c.type_.as_str(), c.status), ("SupplyChainReady", ConditionStatus::False));

        let ready = json!({ "metadata": { "name": "web" }, "status": { "conditions": [{ "type": "Ready", "status": "True", "reason": "Ready" }] } });
        assert!(blueprint_not_ready(OwnerKind::Workload, &ready).is_none());

        let missing = json!({ "status": { "conditions": [{ "type": "Ready", "status": "False", "reason": "TemplatesNotFound", "message": "x" }] } });
        assert_eq!(blueprint_not_ready(OwnerKind::Deliverable, &missing).unwrap().reason, "TemplatesNotFound");
    }
}

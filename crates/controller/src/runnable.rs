//! Runnable reconciliation.

use carto_core::api::{Runnable, RunnableStatus};
use carto_core::conditions::{self, reasons};
use carto_core::{Condition, ConditionManager, ConditionStatus};
use carto_realizer::client::{api_version_of, kind_of, name_of, namespace_of};
use carto_realizer::{stamped_object_condition, ClusterClient, ObjectKey, RunnableRealizer};
use carto_templates::Ytt;
use metrics::counter;
use serde_json::{json, Value as Json};
use tracing::{info, instrument};

use crate::errors::ReconcileError;
use crate::service_account::{act_as, ServiceAccount};

const KIND: &str = "Runnable";

/// What a Runnable reconcile changed.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct RunnableOutcome {
    pub status_updated: bool,
    /// `(apiVersion, kind)` of the run object, when one was stamped.
    pub stamped_kind: Option<(String, String)>,
}

/// Reconcile one Runnable.
#[instrument(skip_all, fields(name = name_of(obj), namespace = ?namespace_of(obj)))]
pub async fn reconcile_runnable(
    client: &dyn ClusterClient,
    ytt: Option<&Ytt>,
    obj: &Json,
    now: &str,
) -> Result<RunnableOutcome, ReconcileError> {
    let runnable: Runnable =
        serde_json::from_value(obj.clone()).map_err(|e| ReconcileError::Decode { kind: KIND, message: e.to_string() })?;
    let previous = runnable.status.clone().unwrap_or_default();

    let mut manager = ConditionManager::new(conditions::READY, &previous.conditions, now);
    let account = ServiceAccount::resolve(
        runnable.metadata.namespace.as_deref().unwrap_or_default(),
        runnable.spec.service_account_name.as_deref(),
        None,
    );
    let acting = match act_as(client, &account).await {
        Ok(acting) => acting,
        Err(e) => {
            info!(error = %e, "service account unusable");
            manager.add_positive(e.condition(conditions::RUN_TEMPLATE_READY));
            manager.add_positive(stamped_object_condition(None));
            let status = RunnableStatus {
                observed_generation: runnable.metadata.generation,
                conditions: manager.finalize().0,
                outputs: previous.outputs.clone(),
            };
            let status_updated = write_status(client, obj, &previous, status).await?;
            return Ok(RunnableOutcome { status_updated, stamped_kind: None });
        }
    };

    let mut realizer = RunnableRealizer::new(acting.client());
    if let Some(ytt) = ytt {
        realizer = realizer.with_ytt(ytt);
    }
    let done = realizer.realize(&runnable).await;

    match &done.error {
        Some(e) => {
            info!(error = %e, "runnable not realized");
            manager.add_positive(e.condition());
        }
        None => manager.add_positive(Condition::new(conditions::RUN_TEMPLATE_READY, ConditionStatus::True, reasons::READY)),
    }
    manager.add_positive(stamped_object_condition(done.stamped.as_ref()));

    let status = RunnableStatus {
        observed_generation: runnable.metadata.generation,
        conditions: manager.finalize().0,
        outputs: done.outputs,
    };
    let outcome = RunnableOutcome {
        status_updated: write_status(client, obj, &previous, status).await?,
        stamped_kind: done.stamped.as_ref().map(|s| (api_version_of(s).to_string(), kind_of(s).to_string())),
    };

    match done.error {
        Some(e) if !e.is_handled() => Err(ReconcileError::Runnable(e)),
        _ => Ok(outcome),
    }
}

/// Write `status` unless it equals what the Runnable already reports.
async fn write_status(
    client: &dyn ClusterClient,
    obj: &Json,
    previous: &RunnableStatus,
    status: RunnableStatus,
) -> Result<bool, ReconcileError> {
    let written = if status == *previous {
        counter!("carto_status_updates_skipped_total", 1u64, "kind" => KIND);
        false
    } else {
        let mut updated = obj.clone();
        updated["status"] = json!(status);
        client
            .update_status(&updated)
            .await
            .map_err(|source| ReconcileError::StatusUpdate { key: ObjectKey::of(obj).to_string(), source })?;
        counter!("carto_status_updates_total", 1u64, "kind" => KIND);
        true
    };
    Ok(written)
}

//! Retention of immutable stamped objects: keep the newest N successes and M failures.

use carto_core::api::RetentionPolicy;
use carto_core::labels::TEMPLATE_LIFECYCLE;
use carto_core::ConditionStatus;
use carto_templates::model::creation_timestamp;
use chrono::{DateTime, Utc};
use metrics::counter;
use serde_json::Value as Json;
use tracing::{info, warn};

use crate::client::{labels_of, ClusterClient, ObjectKey};

/// A stamped object with its health already determined.
#[derive(Debug, Clone)]
pub struct ExaminedObject {
    pub object: Json,
    pub health: ConditionStatus,
}

/// Objects to delete, newest first.
///
/// Objects are walked from newest to oldest. Successes beyond `max_successful_runs` and
/// failures beyond `max_failed_runs` are selected; objects in an unknown state are neither
/// counted nor selected unless they were stamped by a mutable template.
pub fn select_for_deletion(examined: &[ExaminedObject], policy: RetentionPolicy) -> Vec<&ExaminedObject> {
    let mut ordered: Vec<&ExaminedObject> = examined.iter().collect();
    ordered.sort_by_key(|e| std::cmp::Reverse(creation_timestamp(&e.object).unwrap_or(DateTime::<Utc>::MIN_UTC)));

    let (mut successes, mut failures) = (0u32, 0u32);
    let mut doomed = Vec::new();
    for e in ordered {
        let stale_mutable = labels_of(&e.object).get(TEMPLATE_LIFECYCLE).map(String::as_str) == Some("mutable");
        let over_limit = match e.health {
            ConditionStatus::True => {
                successes += 1;
                successes > policy.max_successful_runs
            }
            ConditionStatus::False => {
                failures += 1;
                failures > policy.max_failed_runs
            }
            ConditionStatus::Unknown => {
                if !stale_mutable {
                    info!(object = %ObjectKey::of(&e.object), "retaining object in unknown state");
                }
                false
            }
        };
        if over_limit || stale_mutable {
            doomed.push(e);
        }
    }
    doomed
}

/// Delete what [`select_for_deletion`] picks. Failures are logged and skipped.
pub async fn cleanup(client: &dyn ClusterClient, examined: &[ExaminedObject], policy: RetentionPolicy) -> usize {
    let mut deleted = 0;
    for e in select_for_deletion(examined, policy) {
        let key = ObjectKey::of(&e.object);
        match client.delete(&e.object).await {
            Ok(()) => {
                deleted += 1;
                counter!("carto_gc_deleted_total", 1u64);
                info!(object = %key, health = %e.health, "deleted stamped object past retention");
            }
            Err(err) => {
                counter!("carto_gc_delete_errors_total", 1u64);
                warn!(object = %key, error = %err, "failed to delete stamped object");
            }
        }
    }
    deleted
}

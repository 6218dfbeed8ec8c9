//! Choosing the one blueprint whose selector best matches an owner.

use carto_core::api::BlueprintSpec;
use carto_core::{Condition, ConditionStatus, OwnerKind};
use carto_eval::{best_selector_match_indices, labels_of, MatchError};
use carto_realizer::client::name_of;
use serde_json::Value as Json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SelectionError {
    #[error("{owner} is missing required labels")]
    LabelsMissing { owner: &'static str },
    #[error("no {noun} found where full selector is satisfied by labels: {labels}")]
    NotFound { noun: &'static str, labels: String },
    #[error("{owner} may only match a single {noun}'s selector, matched: {}", .matched.join(", "))]
    Multiple { owner: &'static str, noun: &'static str, matched: Vec<String> },
    #[error("error while matching selector of {noun} [{blueprint}]: {source}")]
    Match {
        noun: &'static str,
        blueprint: String,
        #[source]
        source: MatchError,
    },
}

impl SelectionError {
    /// `SupplyChainReady`/`DeliveryReady` condition describing the failure.
    pub fn condition(&self, kind: OwnerKind) -> Condition {
        let reason = match self {
            SelectionError::LabelsMissing { .. } => kind.labels_missing_reason(),
            SelectionError::NotFound { .. } | SelectionError::Match { .. } => kind.blueprint_not_found_reason(),
            SelectionError::Multiple { .. } => kind.multiple_blueprints_reason(),
        };
        Condition::new(kind.blueprint_ready_condition(), ConditionStatus::False, reason).with_message(self.to_string())
    }
}

fn owner_noun(kind: OwnerKind) -> &'static str {
    match kind {
        OwnerKind::Workload => "workload",
        OwnerKind::Deliverable => "deliverable",
    }
}

/// Pick the blueprint for `owner` among `(object, spec)` candidates.
///
/// Only the most specific matches count; exactly one must remain.
pub fn select_blueprint<'b>(
    kind: OwnerKind,
    owner: &Json,
    candidates: &'b [(Json, BlueprintSpec)],
) -> Result<&'b (Json, BlueprintSpec), SelectionError> {
    let labels = labels_of(owner);
    if labels.is_empty() {
        return Err(SelectionError::LabelsMissing { owner: owner_noun(kind) });
    }
    let selectors: Vec<_> = candidates.iter().map(|(_, spec)| spec.owner_selector()).collect();
    let matched = best_selector_match_indices(owner, &selectors).map_err(|source| SelectionError::Match {
        noun: kind.blueprint_noun(),
        blueprint: candidates.get(source.index).map(|(obj, _)| name_of(obj).to_string()).unwrap_or_default(),
        source,
    })?;
    match matched.as_slice() {
        [] => Err(SelectionError::NotFound {
            noun: kind.blueprint_noun(),
            labels: labels.iter().map(|(k, v)| format!("{k}={v}")).collect::<Vec<_>>().join(","),
        }),
        [only] => Ok(&candidates[*only]),
        many => Err(SelectionError::Multiple {
            owner: owner_noun(kind),
            noun: kind.blueprint_noun(),
            matched: many.iter().map(|i| name_of(&candidates[*i].0).to_string()).collect(),
        }),
    }
}

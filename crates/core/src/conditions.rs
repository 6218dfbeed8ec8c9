//! Status conditions and the manager that folds them into a top-level condition.

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const READY: &str = "Ready";

// Owner condition types
pub const SUPPLY_CHAIN_READY: &str = "SupplyChainReady";
pub const DELIVERY_READY: &str = "DeliveryReady";
pub const RESOURCES_SUBMITTED: &str = "ResourcesSubmitted";
pub const RESOURCES_HEALTHY: &str = "ResourcesHealthy";

// Per-resource condition types
pub const RESOURCE_SUBMITTED: &str = "ResourceSubmitted";
pub const HEALTHY: &str = "Healthy";

// Blueprint condition types
pub const TEMPLATES_READY: &str = "TemplatesReady";

// Runnable condition types
pub const RUN_TEMPLATE_READY: &str = "RunTemplateReady";
pub const STAMPED_OBJECT_CONDITION: &str = "StampedObjectCondition";

pub mod reasons {
    pub const READY: &str = "Ready";
    pub const CONDITIONS_UNMET: &str = "ConditionsUnmet";
    pub const CONDITION_IN_UNKNOWN_STATE: &str = "ConditionInUnknownState";
    pub const UNKNOWN: &str = "Unknown";

    pub const WORKLOAD_LABELS_MISSING: &str = "WorkloadLabelsMissing";
    pub const SUPPLY_CHAIN_NOT_FOUND: &str = "SupplyChainNotFound";
    pub const MULTIPLE_SUPPLY_CHAIN_MATCHES: &str = "MultipleSupplyChainMatches";
    pub const DELIVERABLE_LABELS_MISSING: &str = "DeliverableLabelsMissing";
    pub const DELIVERY_NOT_FOUND: &str = "DeliveryNotFound";
    pub const MULTIPLE_DELIVERY_MATCHES: &str = "MultipleDeliveryMatches";

    pub const RESOURCE_SUBMISSION_COMPLETE: &str = "ResourceSubmissionComplete";
    pub const TEMPLATE_OBJECT_RETRIEVAL_FAILURE: &str = "TemplateObjectRetrievalFailure";
    pub const MISSING_VALUE_AT_PATH: &str = "MissingValueAtPath";
    pub const TEMPLATE_STAMP_FAILURE: &str = "TemplateStampFailure";
    pub const TEMPLATE_REJECTED_BY_API_SERVER: &str = "TemplateRejectedByAPIServer";
    pub const RESOLVE_TEMPLATE_OPTIONS_ERROR: &str = "ResolveTemplateOptionsError";
    pub const TEMPLATE_OPTIONS_MATCH_ERROR: &str = "TemplateOptionsMatchError";
    pub const DEPLOYMENT_CONDITION_NOT_MET: &str = "ConditionNotMet";
    pub const DEPLOYMENT_FAILED_CONDITION_MET: &str = "FailedConditionMet";
    pub const NO_HEALTHY_IMMUTABLE_OBJECTS: &str = "NoHealthyImmutableObjects";
    pub const UNKNOWN_ERROR: &str = "UnknownError";
    pub const SERVICE_ACCOUNT_NOT_FOUND: &str = "ServiceAccountNotFound";
    pub const SERVICE_ACCOUNT_ERROR: &str = "ServiceAccountError";

    pub const OUTPUT_AVAILABLE: &str = "OutputAvailable";
    pub const ALWAYS_HEALTHY: &str = "AlwaysHealthy";
    pub const NO_STAMPED_OBJECT: &str = "NoStampedObject";
    pub const NO_RESOURCE: &str = "NoResource";
    pub const OUTPUT_NOT_AVAILABLE: &str = "OutputNotAvailable";
    pub const NO_MATCHES_FULFILLED: &str = "NoMatchesFulfilled";
    pub const MATCH_CONDITION: &str = "MatchCondition";
    pub const MATCH_FIELD: &str = "MatchField";
    pub const HEALTHY_CONDITION_RULE: &str = "HealthyConditionRule";

    pub const TEMPLATES_NOT_FOUND: &str = "TemplatesNotFound";

    pub const RUN_TEMPLATE_NOT_FOUND: &str = "RunTemplateNotFound";
    pub const STAMPED_OBJECT_REJECTED_BY_API_SERVER: &str = "StampedObjectRejectedByAPIServer";
    pub const OUTPUT_PATH_NOT_SATISFIED: &str = "OutputPathNotSatisfied";
    pub const FAILED_TO_LIST_CREATED_OBJECTS: &str = "FailedToListCreatedObjects";
    pub const SUCCEEDED_CONDITION: &str = "SucceededCondition";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
pub enum ConditionStatus {
    True,
    False,
    #[default]
    Unknown,
}

impl ConditionStatus {
    /// Lenient parse of a status string found on an arbitrary object.
    pub fn parse(s: &str) -> Self {
        match s {
            "True" => ConditionStatus::True,
            "False" => ConditionStatus::False,
            _ => ConditionStatus::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConditionStatus::True => "True",
            ConditionStatus::False => "False",
            ConditionStatus::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: ConditionStatus,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub message: String,
    /// RFC3339 timestamp of the last status/reason/message change.
    #[serde(default)]
    pub last_transition_time: String,
}

impl Condition {
    pub fn new(type_: &str, status: ConditionStatus, reason: &str) -> Self {
        Self { type_: type_.to_string(), status, reason: reason.to_string(), message: String::new(), last_transition_time: String::new() }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    fn same_observation(&self, other: &Condition) -> bool {
        self.type_ == other.type_ && self.status == other.status && self.reason == other.reason && self.message == other.message
    }
}

pub fn find<'a>(conditions: &'a [Condition], type_: &str) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.type_ == type_)
}

/// Whether a `True` (positive) or `False` (negative) status counts as success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    Positive,
    Negative,
}

/// Collects conditions, tracks the aggregate status and adds a top-level condition on finalize.
///
/// `lastTransitionTime` of a condition is carried over from the previous set when nothing else
/// about it changed.
#[derive(Debug, Clone)]
pub struct ConditionManager {
    top_level_type: String,
    previous: Vec<Condition>,
    conditions: Vec<Condition>,
    status: ConditionStatus,
    changed: bool,
    now: String,
    inherit_reason: bool,
    first_false: Option<(String, String)>,
    first_unknown: Option<(String, String)>,
}

impl ConditionManager {
    pub fn new(top_level_type: &str, previous: &[Condition], now: &str) -> Self {
        Self {
            top_level_type: top_level_type.to_string(),
            previous: previous.to_vec(),
            conditions: Vec::new(),
            status: ConditionStatus::True,
            changed: false,
            now: now.to_string(),
            inherit_reason: false,
            first_false: None,
            first_unknown: None,
        }
    }

    /// Make a non-True top-level condition carry the reason and message of the first condition
    /// that made it so, instead of the generic `ConditionsUnmet`/`ConditionInUnknownState`.
    pub fn with_inherited_reason(mut self) -> Self {
        self.inherit_reason = true;
        self
    }

    pub fn add(&mut self, mut condition: Condition, polarity: Polarity) {
        let failed = matches!(
            (condition.status, polarity),
            (ConditionStatus::False, Polarity::Positive) | (ConditionStatus::True, Polarity::Negative)
        );
        let cause = || Some((condition.reason.clone(), condition.message.clone()));
        if failed {
            self.status = ConditionStatus::False;
            if self.first_false.is_none() {
                self.first_false = cause();
            }
        } else if condition.status == ConditionStatus::Unknown {
            if self.status == ConditionStatus::True {
                self.status = ConditionStatus::Unknown;
            }
            if self.first_unknown.is_none() {
                self.first_unknown = cause();
            }
        }

        match find(&self.previous, &condition.type_) {
            Some(prev) if prev.same_observation(&condition) && !prev.last_transition_time.is_empty() => {
                condition.last_transition_time = prev.last_transition_time.clone();
            }
            _ => {
                condition.last_transition_time = self.now.clone();
                self.changed = true;
            }
        }
        self.conditions.push(condition);
    }

    pub fn add_positive(&mut self, condition: Condition) {
        self.add(condition, Polarity::Positive)
    }

    pub fn add_negative(&mut self, condition: Condition) {
        self.add(condition, Polarity::Negative)
    }

    /// True unless a failing condition has been added.
    pub fn is_successful(&self) -> bool {
        self.status != ConditionStatus::False
    }

    pub fn status(&self) -> ConditionStatus {
        self.status
    }

    /// All conditions with the top-level condition last, and whether anything changed.
    pub fn finalize(mut self) -> (Vec<Condition>, bool) {
        if self.conditions.is_empty() {
            let mut top = Condition::new(&self.top_level_type, ConditionStatus::Unknown, reasons::UNKNOWN);
            top.last_transition_time = self.now.clone();
            return (vec![top], true);
        }

        let inherited = match self.status {
            ConditionStatus::False if self.inherit_reason => self.first_false.take(),
            ConditionStatus::Unknown if self.inherit_reason => self.first_unknown.take(),
            _ => None,
        };
        let top = match (self.status, inherited) {
            (status, Some((reason, message))) => Condition::new(&self.top_level_type, status, &reason).with_message(message),
            (ConditionStatus::True, None) => Condition::new(&self.top_level_type, ConditionStatus::True, reasons::READY),
            (ConditionStatus::False, None) => {
                Condition::new(&self.top_level_type, ConditionStatus::False, reasons::CONDITIONS_UNMET)
                    .with_message("not all conditions are met")
            }
            (ConditionStatus::Unknown, None) => {
                Condition::new(&self.top_level_type, ConditionStatus::Unknown, reasons::CONDITION_IN_UNKNOWN_STATE)
            }
        };
        self.add_positive(top);
        (self.conditions, self.changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T0: &str = "2024-01-01T00:00:00Z";
    const T1: &str = "2024-01-01T00:05:00Z";

    #[test]
    fn all_true_is_ready() {
        let mut m = ConditionManager::new(READY, &[], T0);
        m.add_positive(Condition::new("A", ConditionStatus::True, "Fine"));
        let (conds, changed) = m.finalize();
        assert!(changed);
        let top = conds.last().unwrap();
        assert_eq!(top.type_, READY);
        assert_eq!(top.status, ConditionStatus::True);
        assert_eq!(top.reason, "Ready");
    }

    #[test]
    fn false_dominates_unknown() {
        let mut m = ConditionManager::new(READY, &[], T0);
        m.add_positive(Condition::new("A", ConditionStatus::Unknown, "Wait"));
        m.add_positive(Condition::new("B", ConditionStatus::False, "Broken"));
        assert!(!m.is_successful());
        let (conds, _) = m.finalize();
        let top = conds.last().unwrap();
        assert_eq!(top.status, ConditionStatus::False);
        assert_eq!(top.reason, "ConditionsUnmet");
    }

    #[test]
    fn unknown_without_false() {
        let mut m = ConditionManager::new(READY, &[], T0);
        m.add_positive(Condition::new("A", ConditionStatus::True, "Fine"));
        m.add_positive(Condition::new("B", ConditionStatus::Unknown, "Wait"));
        let (conds, _) = m.finalize();
        assert_eq!(conds.last().unwrap().reason, "ConditionInUnknownState");
    }

    #[test]
    fn negative_polarity() {
        let mut m = ConditionManager::new(READY, &[], T0);
        m.add_negative(Condition::new("Stalled", ConditionStatus::True, "Stuck"));
        assert!(!m.is_successful());
    }

    #[test]
    fn unchanged_conditions_keep_transition_time() {
        let mut first = ConditionManager::new(READY, &[], T0);
        first.add_positive(Condition::new("A", ConditionStatus::True, "Fine"));
        let (prev, _) = first.finalize();

        let mut second = ConditionManager::new(READY, &prev, T1);
        second.add_positive(Condition::new("A", ConditionStatus::True, "Fine"));
        let (conds, changed) = second.finalize();
        assert!(!changed);
        assert!(conds.iter().all(|c| c.last_transition_time == T0));

        let mut third = ConditionManager::new(READY, &conds, T1);
        third.add_positive(Condition::new("A", ConditionStatus::False, "Broken"));
        let (conds, changed) = third.finalize();
        assert!(changed);
        assert!(conds.iter().all(|c| c.last_transition_time == T1));
    }

    #[test]
    fn inherited_reason_names_first_cause() {
        let mut m = ConditionManager::new(READY, &[], T0).with_inherited_reason();
        m.add_positive(Condition::new("A", ConditionStatus::Unknown, "Waiting").with_message("on a"));
        m.add_positive(Condition::new("B", ConditionStatus::False, "Broken").with_message("b broke"));
        m.add_positive(Condition::new("C", ConditionStatus::False, "AlsoBroken"));
        let (conds, _) = m.finalize();
        let top = conds.last().unwrap();
        assert_eq!((top.status, top.reason.as_str(), top.message.as_str()), (ConditionStatus::False, "Broken", "b broke"));

        let mut m = ConditionManager::new(READY, &[], T0).with_inherited_reason();
        m.add_positive(Condition::new("A", ConditionStatus::Unknown, "Waiting"));
        let (conds, _) = m.finalize();
        assert_eq!(conds.last().unwrap().reason, "Waiting");
    }

    #[test]
    fn empty_manager_reports_unknown() {
        let (conds, changed) = ConditionManager::new(READY, &[], T0).finalize();
        assert!(changed);
        assert_eq!(conds.len(), 1);
        assert_eq!(conds[0].status, ConditionStatus::Unknown);
    }
}

//! Owner kinds (Workload, Deliverable) and the names that differ between them.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::api::{ObjectReference, RealizedResource};
use crate::conditions::{self, reasons, Condition};
use crate::labels;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OwnerKind {
    Workload,
    Deliverable,
}

impl OwnerKind {
    pub fn kind(&self) -> &'static str {
        match self {
            OwnerKind::Workload => "Workload",
            OwnerKind::Deliverable => "Deliverable",
        }
    }

    /// Key under which the owner object is exposed to template tags.
    pub fn context_key(&self) -> &'static str {
        match self {
            OwnerKind::Workload => "workload",
            OwnerKind::Deliverable => "deliverable",
        }
    }

    pub fn blueprint_kind(&self) -> &'static str {
        match self {
            OwnerKind::Workload => "ClusterSupplyChain",
            OwnerKind::Deliverable => "ClusterDelivery",
        }
    }

    pub fn blueprint_ready_condition(&self) -> &'static str {
        match self {
            OwnerKind::Workload => conditions::SUPPLY_CHAIN_READY,
            OwnerKind::Deliverable => conditions::DELIVERY_READY,
        }
    }

    /// Status field holding the selected blueprint reference.
    pub fn blueprint_ref_field(&self) -> &'static str {
        match self {
            OwnerKind::Workload => "supplyChainRef",
            OwnerKind::Deliverable => "deliveryRef",
        }
    }

    pub fn labels_missing_reason(&self) -> &'static str {
        match self {
            OwnerKind::Workload => reasons::WORKLOAD_LABELS_MISSING,
            OwnerKind::Deliverable => reasons::DELIVERABLE_LABELS_MISSING,
        }
    }

    pub fn blueprint_not_found_reason(&self) -> &'static str {
        match self {
            OwnerKind::Workload => reasons::SUPPLY_CHAIN_NOT_FOUND,
            OwnerKind::Deliverable => reasons::DELIVERY_NOT_FOUND,
        }
    }

    pub fn multiple_blueprints_reason(&self) -> &'static str {
        match self {
            OwnerKind::Workload => reasons::MULTIPLE_SUPPLY_CHAIN_MATCHES,
            OwnerKind::Deliverable => reasons::MULTIPLE_DELIVERY_MATCHES,
        }
    }

    /// Human-readable blueprint noun used in condition messages.
    pub fn blueprint_noun(&self) -> &'static str {
        match self {
            OwnerKind::Workload => "supply chain",
            OwnerKind::Deliverable => "delivery",
        }
    }

    pub fn owner_name_label(&self) -> &'static str {
        match self {
            OwnerKind::Workload => labels::WORKLOAD_NAME,
            OwnerKind::Deliverable => labels::DELIVERABLE_NAME,
        }
    }

    pub fn owner_namespace_label(&self) -> &'static str {
        match self {
            OwnerKind::Workload => labels::WORKLOAD_NAMESPACE,
            OwnerKind::Deliverable => labels::DELIVERABLE_NAMESPACE,
        }
    }

    pub fn blueprint_name_label(&self) -> &'static str {
        match self {
            OwnerKind::Workload => labels::SUPPLY_CHAIN_NAME,
            OwnerKind::Deliverable => labels::DELIVERY_NAME,
        }
    }
}

impl fmt::Display for OwnerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind())
    }
}

/// Kind-independent view of an owner's status.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OwnerStatus {
    pub observed_generation: Option<i64>,
    pub conditions: Vec<Condition>,
    pub blueprint_ref: Option<ObjectReference>,
    pub resources: Vec<RealizedResource>,
}

impl OwnerStatus {
    /// Read the status of a dynamic owner object; malformed sections read as empty.
    pub fn from_owner(kind: OwnerKind, owner: &Json) -> Self {
        let Some(status) = owner.get("status") else {
            return Self::default();
        };
        let parse = |key: &str| status.get(key).cloned();
        Self {
            observed_generation: status.get("observedGeneration").and_then(|v| v.as_i64()),
            conditions: parse("conditions").and_then(|v| serde_json::from_value(v).ok()).unwrap_or_default(),
            blueprint_ref: parse(kind.blueprint_ref_field()).and_then(|v| serde_json::from_value(v).ok()),
            resources: parse("resources").and_then(|v| serde_json::from_value(v).ok()).unwrap_or_default(),
        }
    }

    /// Wire form of the status for the given owner kind.
    pub fn to_json(&self, kind: OwnerKind) -> Json {
        let mut map = serde_json::Map::new();
        if let Some(gen) = self.observed_generation {
            map.insert("observedGeneration".into(), gen.into());
        }
        map.insert("conditions".into(), serde_json::to_value(&self.conditions).unwrap_or_default());
        if let Some(r) = &self.blueprint_ref {
            map.insert(kind.blueprint_ref_field().into(), serde_json::to_value(r).unwrap_or_default());
        }
        map.insert("resources".into(), serde_json::to_value(&self.resources).unwrap_or_default());
        Json::Object(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conditions::ConditionStatus;
    use serde_json::json;

    #[test]
    fn status_uses_kind_specific_ref_field() {
        let status = OwnerStatus {
            observed_generation: Some(3),
            conditions: vec![Condition::new("Ready", ConditionStatus::True, "Ready")],
            blueprint_ref: Some(ObjectReference {
                kind: "ClusterDelivery".into(),
                namespace: None,
                name: "deliver".into(),
                api_version: "carto.run/v1alpha1".into(),
            }),
            resources: vec![],
        };
        let wire = status.to_json(OwnerKind::Deliverable);
        assert_eq!(wire["deliveryRef"]["name"], "deliver");
        assert!(wire.get("supplyChainRef").is_none());

        let owner = json!({ "status": wire });
        assert_eq!(OwnerStatus::from_owner(OwnerKind::Deliverable, &owner), status);
    }

    #[test]
    fn missing_status_is_empty() {
        let s = OwnerStatus::from_owner(OwnerKind::Workload, &json!({ "metadata": { "name": "w" } }));
        assert_eq!(s, OwnerStatus::default());
    }
}

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::common::{BlueprintSpec, BlueprintStatus};

#[derive(CustomResource, Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "carto.run",
    version = "v1alpha1",
    kind = "ClusterSupplyChain",
    plural = "clustersupplychains",
    shortname = "csc",
    status = "BlueprintStatus"
)]
pub struct ClusterSupplyChainSpec {
    #[serde(flatten)]
    pub blueprint: BlueprintSpec,
}

#[derive(CustomResource, Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "carto.run",
    version = "v1alpha1",
    kind = "ClusterDelivery",
    plural = "clusterdeliveries",
    status = "BlueprintStatus"
)]
pub struct ClusterDeliverySpec {
    #[serde(flatten)]
    pub blueprint: BlueprintSpec,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn supply_chain_reads_flattened_blueprint() {
        let sc: ClusterSupplyChain = serde_json::from_value(json!({
            "apiVersion": "carto.run/v1alpha1",
            "kind": "ClusterSupplyChain",
            "metadata": { "name": "source-to-url" },
            "spec": {
                "selector": { "apps.tanzu.vmware.com/workload-type": "web" },
                "resources": [
                    { "name": "source-provider", "templateRef": { "kind": "ClusterSourceTemplate", "name": "git" } }
                ]
            }
        }))
        .unwrap();
        let bp = &sc.spec.blueprint;
        assert_eq!(bp.resources.len(), 1);
        assert_eq!(bp.owner_selector().match_labels.len(), 1);
        assert!(bp.resource("source-provider").is_some());
    }
}

//! `carto.run/v1alpha1` resource types.

mod blueprints;
mod common;
mod owners;
mod runnable;
mod templates;

pub use blueprints::*;
pub use common::*;
pub use owners::*;
pub use runnable::*;
pub use templates::*;

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::CustomResourceExt;

/// Every CRD served by the controller.
pub fn crds() -> Vec<CustomResourceDefinition> {
    vec![
        Workload::crd(),
        Deliverable::crd(),
        ClusterSupplyChain::crd(),
        ClusterDelivery::crd(),
        ClusterSourceTemplate::crd(),
        ClusterImageTemplate::crd(),
        ClusterConfigTemplate::crd(),
        ClusterDeploymentTemplate::crd(),
        ClusterTemplate::crd(),
        ClusterRunTemplate::crd(),
        Runnable::crd(),
    ]
}

/// Template kinds a blueprint resource may reference.
pub const TEMPLATE_KINDS: [&str; 5] = [
    "ClusterSourceTemplate",
    "ClusterImageTemplate",
    "ClusterConfigTemplate",
    "ClusterDeploymentTemplate",
    "ClusterTemplate",
];

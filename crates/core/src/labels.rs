//! Label keys written on stamped objects.

pub const WORKLOAD_NAME: &str = "carto.run/workload-name";
pub const WORKLOAD_NAMESPACE: &str = "carto.run/workload-namespace";
pub const SUPPLY_CHAIN_NAME: &str = "carto.run/supply-chain-name";

pub const DELIVERABLE_NAME: &str = "carto.run/deliverable-name";
pub const DELIVERABLE_NAMESPACE: &str = "carto.run/deliverable-namespace";
pub const DELIVERY_NAME: &str = "carto.run/delivery-name";

pub const RESOURCE_NAME: &str = "carto.run/resource-name";
pub const TEMPLATE_KIND: &str = "carto.run/template-kind";
pub const CLUSTER_TEMPLATE_NAME: &str = "carto.run/cluster-template-name";
pub const TEMPLATE_LIFECYCLE: &str = "carto.run/template-lifecycle";
/// Content digest of a stamped object, truncated to the 63 character label limit.
pub const STAMPED_OBJECT_DIGEST: &str = "carto.run/stamped-object-digest";

pub const RUNNABLE_NAME: &str = "carto.run/runnable-name";
pub const RUN_TEMPLATE_NAME: &str = "carto.run/run-template-name";

pub const MAX_LABEL_VALUE_LEN: usize = 63;

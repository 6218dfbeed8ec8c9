#![forbid(unsafe_code)]

use carto_core::api::crds;

#[test]
fn scope_follows_kind() {
    for crd in crds() {
        let kind = crd.spec.names.kind.clone();
        let expected = if kind.starts_with("Cluster") { "Cluster" } else { "Namespaced" };
        assert_eq!(crd.spec.scope, expected, "{kind}");
        assert_eq!(crd.spec.group, "carto.run");
        assert_eq!(crd.spec.versions[0].name, "v1alpha1");
    }
}

#[test]
fn template_bodies_preserve_unknown_fields() {
    let crd = crds().into_iter().find(|c| c.spec.names.kind == "ClusterConfigTemplate").unwrap();
    let schema = serde_json::to_value(&crd.spec.versions[0].schema).unwrap();
    let template = &schema["openAPIV3Schema"]["properties"]["spec"]["properties"]["template"];
    assert_eq!(template["x-kubernetes-preserve-unknown-fields"], true);
}

#[test]
fn owners_carry_status_subresource() {
    for crd in crds().into_iter().filter(|c| ["Workload", "Deliverable", "Runnable"].contains(&c.spec.names.kind.as_str())) {
        assert!(crd.spec.versions[0].subresources.as_ref().and_then(|s| s.status.as_ref()).is_some());
    }
}

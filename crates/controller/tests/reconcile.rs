#![forbid(unsafe_code)]

use carto_controller::{reconcile_blueprint, reconcile_runnable, OwnerReconciler};
use carto_core::conditions::{self, reasons};
use carto_core::{Condition, ConditionStatus, OwnerKind};
use carto_realizer::client::ObjectKey;
use carto_realizer::fake::FakeCluster;
use carto_realizer::ClusterClient;
use serde_json::{json, Value as Json};

const T0: &str = "2024-03-01T10:00:00Z";
const T1: &str = "2024-03-01T10:01:00Z";

fn service_account(name: &str) -> Json {
    json!({ "apiVersion": "v1", "kind": "ServiceAccount", "metadata": { "name": name, "namespace": "dev" } })
}

/// A cluster whose `dev` namespace has its default service account.
fn cluster() -> FakeCluster {
    let fake = FakeCluster::new();
    fake.insert(service_account("default"));
    fake
}

fn workload(labels: Json) -> Json {
    json!({
        "apiVersion": "carto.run/v1alpha1",
        "kind": "Workload",
        "metadata": { "name": "petclinic", "namespace": "dev", "labels": labels },
        "spec": {}
    })
}

fn supply_chain(name: &str, selector: Json, resources: Json) -> Json {
    json!({
        "apiVersion": "carto.run/v1alpha1",
        "kind": "ClusterSupplyChain",
        "metadata": { "name": name },
        "spec": { "selector": selector, "resources": resources },
        "status": { "conditions": [{ "type": "Ready", "status": "True", "reason": "Ready", "lastTransitionTime": T0 }] }
    })
}

fn config_resource(name: &str, template: &str) -> Json {
    json!({ "name": name, "templateRef": { "kind": "ClusterConfigTemplate", "name": template } })
}

fn config_template(name: &str) -> Json {
    json!({
        "apiVersion": "carto.run/v1alpha1",
        "kind": "ClusterConfigTemplate",
        "metadata": { "name": name },
        "spec": {
            "configPath": ".data",
            "template": {
                "apiVersion": "v1",
                "kind": "ConfigMap",
                "metadata": { "name": format!("$(workload.metadata.name)$-{name}") },
                "data": { "greeting": "hello" }
            }
        }
    })
}

async fn reload(fake: &FakeCluster, obj: &Json) -> Json {
    fake.get(&ObjectKey::of(obj)).await.unwrap()
}

fn condition(obj: &Json, type_: &str) -> Condition {
    let conds: Vec<Condition> = serde_json::from_value(obj["status"]["conditions"].clone()).unwrap();
    conditions::find(&conds, type_).cloned().unwrap()
}

#[tokio::test]
async fn most_specific_supply_chain_is_selected_and_status_settles() {
    let fake = cluster();
    fake.insert(config_template("app-config"));
    fake.insert(supply_chain("web", json!({ "app": "web" }), json!([config_resource("config", "app-config")])));
    fake.insert(supply_chain(
        "web-java",
        json!({ "app": "web", "lang": "java" }),
        json!([config_resource("config", "app-config")]),
    ));
    let owner = fake.insert(workload(json!({ "app": "web", "lang": "java" })));
    let reconciler = OwnerReconciler::new(&fake, OwnerKind::Workload);

    let first = reconciler.reconcile(&owner, T0).await.unwrap();
    assert!(first.status_updated);
    assert_eq!(first.stamped_kinds, [("v1".to_string(), "ConfigMap".to_string())]);

    let owner = reload(&fake, &owner).await;
    assert_eq!(owner["status"]["supplyChainRef"]["name"], "web-java");
    assert_eq!(owner["status"]["resources"][0]["stampedRef"]["name"], "petclinic-app-config");
    assert_eq!(condition(&owner, conditions::SUPPLY_CHAIN_READY).status, ConditionStatus::True);
    assert_eq!(condition(&owner, conditions::RESOURCES_SUBMITTED).status, ConditionStatus::True);
    assert_eq!(condition(&owner, conditions::READY).status, ConditionStatus::True);
    assert_eq!(fake.objects_of_kind("ConfigMap").len(), 1);

    let writes = fake.status_updates();
    let second = reconciler.reconcile(&owner, T1).await.unwrap();
    assert!(!second.status_updated);
    assert_eq!(fake.status_updates(), writes);
    assert_eq!(condition(&reload(&fake, &owner).await, conditions::READY).last_transition_time, T0);
}

#[tokio::test]
async fn workload_without_labels_is_not_realized() {
    let fake = cluster();
    fake.insert(config_template("app-config"));
    fake.insert(supply_chain("web", json!({ "app": "web" }), json!([config_resource("config", "app-config")])));
    let owner = fake.insert(workload(json!({})));

    OwnerReconciler::new(&fake, OwnerKind::Workload).reconcile(&owner, T0).await.unwrap();

    let owner = reload(&fake, &owner).await;
    let c = condition(&owner, conditions::SUPPLY_CHAIN_READY);
    assert_eq!((c.status, c.reason.as_str()), (ConditionStatus::False, reasons::WORKLOAD_LABELS_MISSING));
    assert_eq!(condition(&owner, conditions::READY).status, ConditionStatus::False);
    assert!(fake.objects_of_kind("ConfigMap").is_empty());
}

#[tokio::test]
async fn equally_specific_supply_chains_are_ambiguous() {
    let fake = cluster();
    fake.insert(supply_chain("a", json!({ "app": "web" }), json!([config_resource("config", "app-config")])));
    fake.insert(supply_chain("b", json!({ "app": "web" }), json!([config_resource("config", "app-config")])));
    let owner = fake.insert(workload(json!({ "app": "web" })));

    OwnerReconciler::new(&fake, OwnerKind::Workload).reconcile(&owner, T0).await.unwrap();

    let c = condition(&reload(&fake, &owner).await, conditions::SUPPLY_CHAIN_READY);
    assert_eq!(c.reason, reasons::MULTIPLE_SUPPLY_CHAIN_MATCHES);
    assert_eq!(c.message, "workload may only match a single supply chain's selector, matched: a, b");
}

#[tokio::test]
async fn unreconciled_supply_chain_blocks_realization() {
    let fake = cluster();
    fake.insert(config_template("app-config"));
    let mut chain = supply_chain("web", json!({ "app": "web" }), json!([config_resource("config", "app-config")]));
    chain.as_object_mut().unwrap().remove("status");
    fake.insert(chain);
    let owner = fake.insert(workload(json!({ "app": "web" })));

    OwnerReconciler::new(&fake, OwnerKind::Workload).reconcile(&owner, T0).await.unwrap();

    let owner = reload(&fake, &owner).await;
    let c = condition(&owner, conditions::SUPPLY_CHAIN_READY);
    assert_eq!((c.status, c.reason.as_str()), (ConditionStatus::False, reasons::UNKNOWN));
    assert!(c.message.ends_with("[web] has not been reconciled"), "{}", c.message);
    assert_eq!(owner["status"]["supplyChainRef"]["name"], "web");
    assert!(fake.objects_of_kind("ConfigMap").is_empty());
}

#[tokio::test]
async fn resources_dropped_from_the_supply_chain_are_cleaned_up() {
    let fake = cluster();
    fake.insert(config_template("app-config"));
    fake.insert(config_template("extra-config"));
    let chain = fake.insert(supply_chain(
        "web",
        json!({ "app": "web" }),
        json!([config_resource("config", "app-config"), config_resource("extra", "extra-config")]),
    ));
    let owner = fake.insert(workload(json!({ "app": "web" })));
    let reconciler = OwnerReconciler::new(&fake, OwnerKind::Workload);

    reconciler.reconcile(&owner, T0).await.unwrap();
    assert_eq!(fake.objects_of_kind("ConfigMap").len(), 2);

    let mut chain = reload(&fake, &chain).await;
    chain["spec"]["resources"] = json!([config_resource("config", "app-config")]);
    fake.update(&chain).await.unwrap();

    let outcome = reconciler.reconcile(&reload(&fake, &owner).await, T1).await.unwrap();
    assert_eq!(outcome.orphans_deleted, 1);
    let left = fake.objects_of_kind("ConfigMap");
    assert_eq!(left.len(), 1);
    assert_eq!(left[0]["metadata"]["name"], "petclinic-app-config");
    assert_eq!(reload(&fake, &owner).await["status"]["resources"].as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn supply_chain_waits_for_its_templates() {
    let fake = cluster();
    let mut chain = supply_chain("web", json!({ "app": "web" }), json!([config_resource("config", "app-config")]));
    chain.as_object_mut().unwrap().remove("status");
    let chain = fake.insert(chain);

    assert!(reconcile_blueprint(&fake, "ClusterSupplyChain", &chain, T0).await.unwrap());
    let chain = reload(&fake, &chain).await;
    let templates = condition(&chain, conditions::TEMPLATES_READY);
    assert_eq!(templates.message, "templates not found: ClusterConfigTemplate/app-config");
    let ready = condition(&chain, conditions::READY);
    assert_eq!((ready.status, ready.reason.as_str()), (ConditionStatus::False, reasons::TEMPLATES_NOT_FOUND));

    fake.insert(config_template("app-config"));
    assert!(reconcile_blueprint(&fake, "ClusterSupplyChain", &chain, T1).await.unwrap());
    let chain = reload(&fake, &chain).await;
    assert_eq!(condition(&chain, conditions::READY).status, ConditionStatus::True);

    assert!(!reconcile_blueprint(&fake, "ClusterSupplyChain", &chain, T1).await.unwrap());
}

#[tokio::test]
async fn runnable_status_follows_its_run() {
    let fake = cluster();
    fake.insert(json!({
        "apiVersion": "carto.run/v1alpha1",
        "kind": "ClusterRunTemplate",
        "metadata": { "name": "tekton" },
        "spec": {
            "outputs": { "revision": "spec.params[0].value" },
            "template": {
                "apiVersion": "tekton.dev/v1beta1",
                "kind": "TaskRun",
                "metadata": { "generateName": "ci-" },
                "spec": { "params": [{ "name": "revision", "value": "$(runnable.spec.inputs.revision)$" }] }
            }
        }
    }));
    let runnable = fake.insert(json!({
        "apiVersion": "carto.run/v1alpha1",
        "kind": "Runnable",
        "metadata": { "name": "ci", "namespace": "dev" },
        "spec": { "runTemplateRef": { "name": "tekton" }, "inputs": { "revision": "abc" } }
    }));

    let first = reconcile_runnable(&fake, None, &runnable, T0).await.unwrap();
    assert!(first.status_updated);
    assert_eq!(first.stamped_kind, Some(("tekton.dev/v1beta1".to_string(), "TaskRun".to_string())));
    let runnable = reload(&fake, &runnable).await;
    assert_eq!(condition(&runnable, conditions::RUN_TEMPLATE_READY).status, ConditionStatus::True);
    assert_eq!(condition(&runnable, conditions::STAMPED_OBJECT_CONDITION).status, ConditionStatus::Unknown);
    assert_eq!(condition(&runnable, conditions::READY).status, ConditionStatus::Unknown);

    let runs = fake.objects_of_kind("TaskRun");
    assert_eq!(runs.len(), 1);
    fake.set_status(&ObjectKey::of(&runs[0]), json!({ "conditions": [{ "type": "Succeeded", "status": "True" }] }));

    assert!(reconcile_runnable(&fake, None, &runnable, T1).await.unwrap().status_updated);
    let runnable = reload(&fake, &runnable).await;
    assert_eq!(runnable["status"]["outputs"], json!({ "revision": "abc" }));
    let stamped = condition(&runnable, conditions::STAMPED_OBJECT_CONDITION);
    assert_eq!((stamped.status, stamped.reason.as_str()), (ConditionStatus::True, reasons::SUCCEEDED_CONDITION));
    assert_eq!(condition(&runnable, conditions::READY).status, ConditionStatus::True);

    assert!(!reconcile_runnable(&fake, None, &runnable, T1).await.unwrap().status_updated);
    assert_eq!(fake.objects_of_kind("TaskRun").len(), 1);
}

#[tokio::test]
async fn runnable_with_missing_template_reports_it() {
    let fake = cluster();
    let runnable = fake.insert(json!({
        "apiVersion": "carto.run/v1alpha1",
        "kind": "Runnable",
        "metadata": { "name": "ci", "namespace": "dev" },
        "spec": { "runTemplateRef": { "name": "absent" } }
    }));

    let _ = reconcile_runnable(&fake, None, &runnable, T0).await;
    let c = condition(&reload(&fake, &runnable).await, conditions::RUN_TEMPLATE_READY);
    assert_eq!((c.status, c.reason.as_str()), (ConditionStatus::False, reasons::RUN_TEMPLATE_NOT_FOUND));
}

#[tokio::test]
async fn owner_realizes_as_its_service_account() {
    let fake = cluster();
    fake.insert(service_account("builder"));
    fake.insert(config_template("app-config"));
    fake.insert(supply_chain("web", json!({ "app": "web" }), json!([config_resource("config", "app-config")])));
    let mut owner = workload(json!({ "app": "web" }));
    owner["spec"]["serviceAccountName"] = json!("builder");
    let owner = fake.insert(owner);

    OwnerReconciler::new(&fake, OwnerKind::Workload).reconcile(&owner, T0).await.unwrap();

    assert_eq!(fake.impersonated(), ["system:serviceaccount:dev:builder"]);
    assert_eq!(condition(&reload(&fake, &owner).await, conditions::READY).status, ConditionStatus::True);
}

#[tokio::test]
async fn missing_service_account_stops_realization() {
    let fake = FakeCluster::new();
    fake.insert(config_template("app-config"));
    let mut chain = supply_chain("web", json!({ "app": "web" }), json!([config_resource("config", "app-config")]));
    chain["spec"]["serviceAccountRef"] = json!({ "name": "chain-sa", "namespace": "ops" });
    fake.insert(chain);
    let owner = fake.insert(workload(json!({ "app": "web" })));

    let outcome = OwnerReconciler::new(&fake, OwnerKind::Workload).reconcile(&owner, T0).await.unwrap();
    assert!(outcome.status_updated);

    let owner = reload(&fake, &owner).await;
    let submitted = condition(&owner, conditions::RESOURCES_SUBMITTED);
    assert_eq!((submitted.status, submitted.reason.as_str()), (ConditionStatus::False, reasons::SERVICE_ACCOUNT_NOT_FOUND));
    assert_eq!(submitted.message, "service account [chain-sa] not found in namespace [ops]");
    let ready = condition(&owner, conditions::READY);
    assert_eq!((ready.status, ready.reason.as_str()), (ConditionStatus::False, reasons::SERVICE_ACCOUNT_NOT_FOUND));
    assert!(fake.objects_of_kind("ConfigMap").is_empty());
    assert!(fake.impersonated().is_empty());
}

#[tokio::test]
async fn runnable_without_its_service_account_stamps_nothing() {
    let fake = cluster();
    let runnable = fake.insert(json!({
        "apiVersion": "carto.run/v1alpha1",
        "kind": "Runnable",
        "metadata": { "name": "ci", "namespace": "dev" },
        "spec": { "runTemplateRef": { "name": "tekton" }, "serviceAccountName": "ci-runner" }
    }));

    assert!(reconcile_runnable(&fake, None, &runnable, T0).await.unwrap().status_updated);
    let c = condition(&reload(&fake, &runnable).await, conditions::RUN_TEMPLATE_READY);
    assert_eq!((c.status, c.reason.as_str()), (ConditionStatus::False, reasons::SERVICE_ACCOUNT_NOT_FOUND));
    assert!(fake.objects_of_kind("TaskRun").is_empty());
}

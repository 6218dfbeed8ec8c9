//! kube-runtime wiring: one controller per reconciled kind, with watches that fan changes out
//! to dependents. Owners are also requeued when an object they stamped changes.

use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use carto_core::api::{
    BlueprintSpec, ClusterConfigTemplate, ClusterDelivery, ClusterDeploymentTemplate, ClusterImageTemplate,
    ClusterRunTemplate, ClusterSourceTemplate, ClusterSupplyChain, ClusterTemplate, Deliverable, Runnable, Workload,
};
use carto_core::OwnerKind;
use carto_kubehub::KubeCluster;
use chrono::{SecondsFormat, Utc};
use futures::channel::mpsc::UnboundedReceiver;
use futures::{Stream, StreamExt};
use kube::runtime::controller::{self, Action, Controller};
use kube::runtime::reflector::{ObjectRef, Store};
use kube::runtime::watcher;
use kube::{Api, Client, Resource, ResourceExt};
use metrics::{counter, histogram};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as Json;
use tracing::{debug, info, warn};

use crate::blueprint::reconcile_blueprint;
use crate::config::ControllerConfig;
use crate::errors::ReconcileError;
use crate::index::{blueprint_selects_labels, blueprint_uses_template, runnable_uses_template};
use crate::owner::OwnerReconciler;
use crate::runnable::reconcile_runnable;
use crate::tracker::{StampedTracker, TriggerStreams};

pub struct ControllerContext {
    pub cluster: KubeCluster,
    pub config: ControllerConfig,
    pub tracker: StampedTracker,
}

type ReconcileResult<K> = Result<(ObjectRef<K>, Action), controller::Error<ReconcileError, watcher::Error>>;

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn encode<K: Serialize>(kind: &'static str, obj: &K) -> Result<Json, ReconcileError> {
    serde_json::to_value(obj).map_err(|e| ReconcileError::Decode { kind, message: e.to_string() })
}

/// Run one reconcile, record it, and requeue for the periodic resync on success.
async fn timed<T>(
    kind: &'static str,
    ctx: &ControllerContext,
    fut: impl Future<Output = Result<T, ReconcileError>>,
) -> Result<Action, ReconcileError> {
    let started = Instant::now();
    let result = fut.await;
    counter!("carto_reconcile_total", 1u64, "kind" => kind);
    histogram!("carto_reconcile_duration_ms", started.elapsed().as_secs_f64() * 1000.0, "kind" => kind);
    match result {
        Ok(_) => Ok(Action::requeue(ctx.config.resync)),
        Err(e) => {
            counter!("carto_reconcile_errors_total", 1u64, "kind" => kind, "error" => e.metric_label());
            Err(e)
        }
    }
}

fn error_policy<K: Resource<DynamicType = ()>>(obj: Arc<K>, err: &ReconcileError, ctx: Arc<ControllerContext>) -> Action {
    warn!(kind = %K::kind(&()), name = %obj.name_any(), error = %err, "reconcile failed, requeueing");
    Action::requeue(ctx.config.error_requeue)
}

async fn drain<K: Resource>(kind: &'static str, results: impl Stream<Item = ReconcileResult<K>>) {
    results
        .for_each(|res| async move {
            match res {
                Ok((obj, _)) => debug!(kind, name = %obj.name, "reconciled"),
                Err(controller::Error::ReconcilerFailed(..)) => {}
                Err(e) => warn!(kind, error = %e, "controller error"),
            }
        })
        .await;
    info!(kind, "controller stopped");
}

fn supply_chain_spec(sc: &ClusterSupplyChain) -> &BlueprintSpec {
    &sc.spec.blueprint
}

fn delivery_spec(d: &ClusterDelivery) -> &BlueprintSpec {
    &d.spec.blueprint
}

/// Owners in `store` whose labels a blueprint may select.
fn owners_selected_by<O>(store: &Store<O>, spec: &BlueprintSpec) -> Vec<ObjectRef<O>>
where
    O: Resource<DynamicType = ()> + Clone + 'static,
{
    store
        .state()
        .into_iter()
        .filter(|o| blueprint_selects_labels(spec, o.labels()))
        .map(|o| ObjectRef::from_obj(o.as_ref()))
        .collect()
}

fn blueprints_using<B, T>(
    store: Store<B>,
    spec_of: fn(&B) -> &BlueprintSpec,
) -> impl Fn(T) -> Vec<ObjectRef<B>> + Send + Sync + 'static
where
    B: Resource<DynamicType = ()> + Clone + Send + Sync + 'static,
    T: Resource<DynamicType = ()>,
{
    move |template: T| {
        let kind = T::kind(&());
        let name = template.name_any();
        store
            .state()
            .into_iter()
            .filter(|b| blueprint_uses_template(spec_of(b), &kind, &name))
            .map(|b| ObjectRef::from_obj(b.as_ref()))
            .collect()
    }
}

/// Requeue a blueprint whenever one of the templates it references changes.
fn watch_templates<B>(controller: Controller<B>, client: &Client, spec_of: fn(&B) -> &BlueprintSpec) -> Controller<B>
where
    B: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
{
    let store = controller.store();
    let wc = watcher::Config::default;
    controller
        .watches(
            Api::<ClusterSourceTemplate>::all(client.clone()),
            wc(),
            blueprints_using::<B, ClusterSourceTemplate>(store.clone(), spec_of),
        )
        .watches(
            Api::<ClusterImageTemplate>::all(client.clone()),
            wc(),
            blueprints_using::<B, ClusterImageTemplate>(store.clone(), spec_of),
        )
        .watches(
            Api::<ClusterConfigTemplate>::all(client.clone()),
            wc(),
            blueprints_using::<B, ClusterConfigTemplate>(store.clone(), spec_of),
        )
        .watches(
            Api::<ClusterDeploymentTemplate>::all(client.clone()),
            wc(),
            blueprints_using::<B, ClusterDeploymentTemplate>(store.clone(), spec_of),
        )
        .watches(Api::<ClusterTemplate>::all(client.clone()), wc(), blueprints_using::<B, ClusterTemplate>(store, spec_of))
}

async fn reconcile_owner<K: Serialize>(kind: OwnerKind, obj: &K, ctx: &ControllerContext) -> Result<Action, ReconcileError> {
    timed(kind.kind(), ctx, async {
        let json = encode(kind.kind(), obj)?;
        let outcome = OwnerReconciler::new(&ctx.cluster, kind).with_ytt(&ctx.config.ytt).reconcile(&json, &now()).await?;
        ctx.tracker.track(&outcome.stamped_kinds);
        Ok(outcome)
    })
    .await
}

async fn run_workloads(client: Client, ctx: Arc<ControllerContext>, stamped: UnboundedReceiver<ObjectRef<Workload>>) {
    let controller = Controller::new(Api::<Workload>::all(client.clone()), watcher::Config::default());
    let owners = controller.store();
    let results = controller
        .watches(Api::<ClusterSupplyChain>::all(client), watcher::Config::default(), move |sc: ClusterSupplyChain| {
            owners_selected_by(&owners, &sc.spec.blueprint)
        })
        .reconcile_on(stamped)
        .shutdown_on_signal()
        .run(
            |obj, ctx| async move { reconcile_owner(OwnerKind::Workload, obj.as_ref(), &ctx).await },
            error_policy,
            ctx,
        );
    drain("Workload", results).await;
}

async fn run_deliverables(client: Client, ctx: Arc<ControllerContext>, stamped: UnboundedReceiver<ObjectRef<Deliverable>>) {
    let controller = Controller::new(Api::<Deliverable>::all(client.clone()), watcher::Config::default());
    let owners = controller.store();
    let results = controller
        .watches(Api::<ClusterDelivery>::all(client), watcher::Config::default(), move |d: ClusterDelivery| {
            owners_selected_by(&owners, &d.spec.blueprint)
        })
        .reconcile_on(stamped)
        .shutdown_on_signal()
        .run(
            |obj, ctx| async move { reconcile_owner(OwnerKind::Deliverable, obj.as_ref(), &ctx).await },
            error_policy,
            ctx,
        );
    drain("Deliverable", results).await;
}

async fn run_supply_chains(client: Client, ctx: Arc<ControllerContext>) {
    let controller = Controller::new(Api::<ClusterSupplyChain>::all(client.clone()), watcher::Config::default());
    let results = watch_templates(controller, &client, supply_chain_spec).shutdown_on_signal().run(
        |obj, ctx| async move {
            timed("ClusterSupplyChain", &ctx, async {
                let json = encode("ClusterSupplyChain", obj.as_ref())?;
                reconcile_blueprint(&ctx.cluster, "ClusterSupplyChain", &json, &now()).await
            })
            .await
        },
        error_policy,
        ctx,
    );
    drain("ClusterSupplyChain", results).await;
}

async fn run_deliveries(client: Client, ctx: Arc<ControllerContext>) {
    let controller = Controller::new(Api::<ClusterDelivery>::all(client.clone()), watcher::Config::default());
    let results = watch_templates(controller, &client, delivery_spec).shutdown_on_signal().run(
        |obj, ctx| async move {
            timed("ClusterDelivery", &ctx, async {
                let json = encode("ClusterDelivery", obj.as_ref())?;
                reconcile_blueprint(&ctx.cluster, "ClusterDelivery", &json, &now()).await
            })
            .await
        },
        error_policy,
        ctx,
    );
    drain("ClusterDelivery", results).await;
}

async fn run_runnables(client: Client, ctx: Arc<ControllerContext>, stamped: UnboundedReceiver<ObjectRef<Runnable>>) {
    let controller = Controller::new(Api::<Runnable>::all(client.clone()), watcher::Config::default());
    let runnables = controller.store();
    let results = controller
        .watches(Api::<ClusterRunTemplate>::all(client), watcher::Config::default(), move |t: ClusterRunTemplate| {
            let name = t.name_any();
            runnables
                .state()
                .into_iter()
                .filter(|r| runnable_uses_template(&r.spec, &name))
                .map(|r| ObjectRef::from_obj(r.as_ref()))
                .collect::<Vec<_>>()
        })
        .reconcile_on(stamped)
        .shutdown_on_signal()
        .run(
            |obj, ctx| async move {
                timed("Runnable", &ctx, async {
                    let json = encode("Runnable", obj.as_ref())?;
                    let outcome = reconcile_runnable(&ctx.cluster, Some(&ctx.config.ytt), &json, &now()).await?;
                    ctx.tracker.track(outcome.stamped_kind.as_ref());
                    Ok(outcome)
                })
                .await
            },
            error_policy,
            ctx,
        );
    drain("Runnable", results).await;
}

/// Run every controller until a termination signal arrives.
pub async fn run(cluster: KubeCluster, config: ControllerConfig) {
    let client = cluster.client().clone();
    let (tracker, TriggerStreams { workloads, deliverables, runnables }) = StampedTracker::new(client.clone());
    let ctx = Arc::new(ControllerContext { cluster, config, tracker });
    info!(resync = ?ctx.config.resync, "starting controllers");
    tokio::join!(
        run_workloads(client.clone(), ctx.clone(), workloads),
        run_deliverables(client.clone(), ctx.clone(), deliverables),
        run_supply_chains(client.clone(), ctx.clone()),
        run_deliveries(client.clone(), ctx.clone()),
        run_runnables(client, ctx, runnables),
    );
}

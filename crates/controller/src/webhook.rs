//! Validating admission webhook for every `carto.run` kind.

use std::net::SocketAddr;
use std::path::Path;

use anyhow::Context as _;
use axum::routing::{get, post};
use axum::{Json, Router};
use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use carto_core::validate_object;
use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview};
use kube::core::DynamicObject;
use metrics::counter;
use tracing::{debug, info, warn};

/// Kinds with a validation endpoint.
pub const VALIDATED_KINDS: [&str; 11] = [
    "Workload",
    "Deliverable",
    "ClusterSupplyChain",
    "ClusterDelivery",
    "ClusterSourceTemplate",
    "ClusterImageTemplate",
    "ClusterConfigTemplate",
    "ClusterDeploymentTemplate",
    "ClusterTemplate",
    "ClusterRunTemplate",
    "Runnable",
];

pub fn webhook_path(kind: &str) -> String {
    format!("/validate-carto-run-v1alpha1-{}", kind.to_lowercase())
}

/// Answer one admission review for objects of `kind`. Deletes carry no object and are allowed.
pub fn review(kind: &'static str, review: AdmissionReview<DynamicObject>) -> AdmissionReview<DynamicObject> {
    let req: AdmissionRequest<DynamicObject> = match review.try_into() {
        Ok(req) => req,
        Err(e) => {
            warn!(kind, error = %e, "malformed admission review");
            return AdmissionResponse::invalid(e.to_string()).into_review();
        }
    };
    let mut res = AdmissionResponse::from(&req);
    if let Some(obj) = &req.object {
        let verdict = serde_json::to_value(obj)
            .map_err(|e| e.to_string())
            .and_then(|json| validate_object(kind, &json).map_err(|e| e.to_string()));
        if let Err(reason) = verdict {
            debug!(kind, name = %req.name, %reason, "admission denied");
            counter!("carto_admission_denied_total", 1u64, "kind" => kind);
            res = res.deny(reason);
        }
    }
    res.into_review()
}

pub fn router() -> Router {
    let mut router = Router::new().route("/healthz", get(|| async { "ok" }));
    for kind in VALIDATED_KINDS {
        router = router.route(
            &webhook_path(kind),
            post(move |Json(body): Json<AdmissionReview<DynamicObject>>| async move { Json(review(kind, body)) }),
        );
    }
    router
}

/// Serve the webhook over TLS using `tls.crt` and `tls.key` from `cert_dir` until `handle` shuts it down.
pub async fn serve(addr: SocketAddr, cert_dir: &Path, handle: Handle) -> anyhow::Result<()> {
    let tls = RustlsConfig::from_pem_file(cert_dir.join("tls.crt"), cert_dir.join("tls.key"))
        .await
        .with_context(|| format!("loading webhook certificate from {}", cert_dir.display()))?;
    info!(%addr, "admission webhook listening");
    axum_server::bind_rustls(addr, tls)
        .handle(handle)
        .serve(router().into_make_service())
        .await
        .context("admission webhook server")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn admission(kind: &str, object: Value) -> AdmissionReview<DynamicObject> {
        serde_json::from_value(json!({
            "apiVersion": "admission.k8s.io/v1",
            "kind": "AdmissionReview",
            "request": {
                "uid": "5c3b8f1e-0000-4000-8000-000000000001",
                "kind": { "group": "carto.run", "version": "v1alpha1", "kind": kind },
                "resource": { "group": "carto.run", "version": "v1alpha1", "resource": format!("{}s", kind.to_lowercase()) },
                "name": object["metadata"]["name"],
                "operation": "CREATE",
                "userInfo": {},
                "object": object,
                "dryRun": false
            }
        }))
        .unwrap()
    }

    fn response(review: AdmissionReview<DynamicObject>) -> AdmissionResponse {
        review.response.unwrap()
    }

    #[test]
    fn paths_are_lowercase_per_kind() {
        assert_eq!(webhook_path("ClusterSupplyChain"), "/validate-carto-run-v1alpha1-clustersupplychain");
    }

    #[test]
    fn valid_template_is_allowed() {
        let obj = json!({
            "apiVersion": "carto.run/v1alpha1",
            "kind": "ClusterConfigTemplate",
            "metadata": { "name": "app-config" },
            "spec": {
                "configPath": ".data",
                "template": { "apiVersion": "v1", "kind": "ConfigMap", "metadata": { "name": "cfg" } }
            }
        });
        let res = response(review("ClusterConfigTemplate", admission("ClusterConfigTemplate", obj)));
        assert!(res.allowed);
    }

    #[test]
    fn template_with_two_bodies_is_denied() {
        let obj = json!({
            "apiVersion": "carto.run/v1alpha1",
            "kind": "ClusterTemplate",
            "metadata": { "name": "both" },
            "spec": {
                "template": { "apiVersion": "v1", "kind": "ConfigMap", "metadata": { "name": "cfg" } },
                "ytt": "#@ load(\"@ytt:data\", \"data\")"
            }
        });
        let res = response(review("ClusterTemplate", admission("ClusterTemplate", obj)));
        assert!(!res.allowed);
        assert!(!res.result.message.is_empty());
    }
}

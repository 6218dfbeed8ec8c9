use std::collections::BTreeMap;

use carto_core::api::{BlueprintParam, DefaultParam, OwnerParam};
use carto_templates::{interpolate, merge_params, InterpolateError, StampError, Stamper, TemplateBody};
use serde_json::{json, Value as Json};

fn owner() -> Json {
    json!({
        "apiVersion": "carto.run/v1alpha1",
        "kind": "Workload",
        "metadata": { "name": "app", "namespace": "team-a", "uid": "0000-1111" },
        "spec": { "source": { "git": { "url": "https://github.com/org/app", "ref": { "branch": "main" } } } }
    })
}

async fn stamp(body: Json, context: &Json) -> Result<Json, StampError> {
    let owner = owner();
    let labels = BTreeMap::new();
    Stamper::new(&owner, context, &labels).stamp(&TemplateBody::Template(body)).await
}

#[tokio::test]
async fn tagless_bodies_only_gain_ownership() {
    let bodies = [
        json!({ "kind": "ConfigMap", "metadata": { "name": "a" }, "data": { "k": "v" } }),
        json!({ "kind": "Job", "metadata": { "generateName": "run-" }, "spec": { "args": ["$", "()", ")$x", "a $ (b)"] } }),
        json!({ "kind": "Thing", "metadata": { "name": "n", "namespace": "team-a" }, "spec": { "n": 1.5, "b": true, "z": null } }),
    ];
    for body in bodies {
        let mut out = stamp(body.clone(), &json!({})).await.unwrap();
        let meta = out["metadata"].as_object_mut().unwrap();
        assert_eq!(meta.remove("namespace"), Some(json!("team-a")));
        assert_eq!(meta.remove("ownerReferences").unwrap()[0]["uid"], "0000-1111");
        assert_eq!(meta.remove("labels"), Some(json!({})));

        let mut expected = body;
        expected["metadata"].as_object_mut().unwrap().remove("namespace");
        assert_eq!(out, expected);
    }
}

#[tokio::test]
async fn single_tag_keeps_native_type() {
    let ctx = json!({ "params": { "replicas": 3, "enabled": false, "ports": [8080, 9090], "env": { "A": "1" } } });
    let body = json!({
        "spec": {
            "replicas": "$(params.replicas)$",
            "enabled": "$(params.enabled)$",
            "ports": "$(params.ports)$",
            "env": "$(params.env)$"
        }
    });
    let out = stamp(body, &ctx).await.unwrap();
    assert_eq!(out["spec"], json!({ "replicas": 3, "enabled": false, "ports": [8080, 9090], "env": { "A": "1" } }));
}

#[test]
fn multiple_tags_join_as_string() {
    let ctx = json!({ "x": 42, "y": "two", "z": { "k": true } });
    assert_eq!(interpolate(&json!("a $(x)$ b $(y)$"), &ctx).unwrap(), json!("a 42 b two"));
    assert_eq!(interpolate(&json!("$(x)$$(y)$"), &ctx).unwrap(), json!("42two"));
    assert_eq!(interpolate(&json!("cfg=$(z)$"), &ctx).unwrap(), json!(r#"cfg={"k":true}"#));
}

#[test]
fn self_referencing_context_terminates() {
    let ctx = json!({
        "params": {
            "a": "$(params.b)$",
            "b": "prefix-$(params.a)$"
        },
        "loop": "$(loop)$"
    });
    for body in [json!({ "v": "$(params.a)$" }), json!(["$(loop)$"])] {
        let err = interpolate(&body, &ctx).unwrap_err();
        assert!(matches!(err, InterpolateError::InfiniteTagLoop { .. }), "{err}");
    }
}

#[test]
fn params_follow_precedence() {
    let defaults = vec![
        DefaultParam { name: "registry".into(), default: json!("template.io") },
        DefaultParam { name: "tag".into(), default: json!("latest") },
        DefaultParam { name: "mode".into(), default: json!("slow") },
    ];
    let blueprint = vec![
        BlueprintParam { name: "registry".into(), value: Some(json!("platform.io")), default: None },
        BlueprintParam { name: "tag".into(), value: None, default: Some(json!("stable")) },
    ];
    let resource = vec![BlueprintParam { name: "mode".into(), value: Some(json!("fast")), default: None }];
    let owner = vec![
        OwnerParam { name: "registry".into(), value: json!("dev.io") },
        OwnerParam { name: "tag".into(), value: json!("v2") },
        OwnerParam { name: "mode".into(), value: json!("debug") },
    ];

    let merged = merge_params(&defaults, &blueprint, &resource, &owner);
    assert_eq!(merged["registry"], json!("platform.io"));
    assert_eq!(merged["tag"], json!("v2"));
    assert_eq!(merged["mode"], json!("fast"));
}

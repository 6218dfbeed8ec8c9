//! Inputs a resource receives from earlier resources, and the templating context built from them.

use std::collections::BTreeMap;

use carto_core::api::{BlueprintResource, ResourceInput};
use carto_core::OwnerKind;
use serde_json::{json, Map, Value as Json};

use crate::outputs::{Output, SourceOutput};

/// Outputs published so far in one realization, keyed by producing resource name.
pub type OutputsByResource = BTreeMap<String, Output>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Inputs {
    pub sources: BTreeMap<String, SourceOutput>,
    pub images: BTreeMap<String, Json>,
    pub configs: BTreeMap<String, Json>,
    pub deployment: Option<SourceOutput>,
}

impl Inputs {
    /// Gather the outputs a resource references. References whose producer has no output of the
    /// right shape yet are dropped.
    pub fn assemble(resource: &BlueprintResource, outputs: &OutputsByResource) -> Self {
        let mut inputs = Inputs::default();
        for r in &resource.sources {
            if let Some(src) = outputs.get(&r.resource).and_then(Output::as_source) {
                inputs.sources.insert(r.name.clone(), src.clone());
            }
        }
        for r in &resource.images {
            if let Some(img) = outputs.get(&r.resource).and_then(Output::as_image) {
                inputs.images.insert(r.name.clone(), img.clone());
            }
        }
        for r in &resource.configs {
            if let Some(cfg) = outputs.get(&r.resource).and_then(Output::as_config) {
                inputs.configs.insert(r.name.clone(), cfg.clone());
            }
        }
        if let Some(d) = &resource.deployment {
            inputs.deployment = outputs.get(&d.resource).and_then(Output::as_source).cloned();
        }
        inputs
    }

    /// The input a pass-through option forwards, looked up in the category matching the
    /// resource's template kind. Deployment templates forward the deployment input.
    pub fn pass_through(&self, template_kind: &str, name: &str) -> Option<Output> {
        match template_kind {
            "ClusterSourceTemplate" => self.sources.get(name).cloned().map(Output::Source),
            "ClusterImageTemplate" => self.images.get(name).cloned().map(Output::Image),
            "ClusterConfigTemplate" => self.configs.get(name).cloned().map(Output::Config),
            "ClusterDeploymentTemplate" => self.deployment.clone().map(Output::Source),
            _ => None,
        }
    }

    /// The single source, only when exactly one exists.
    pub fn single_source(&self) -> Option<&SourceOutput> {
        single(&self.sources)
    }

    fn context_entries(&self) -> Map<String, Json> {
        let mut ctx = Map::new();
        let sources: Map<String, Json> = self
            .sources
            .iter()
            .map(|(name, s)| (name.clone(), json!({ "url": s.url, "revision": s.revision, "name": name })))
            .collect();
        let images: Map<String, Json> =
            self.images.iter().map(|(name, v)| (name.clone(), json!({ "image": v, "name": name }))).collect();
        let configs: Map<String, Json> =
            self.configs.iter().map(|(name, v)| (name.clone(), json!({ "config": v, "name": name }))).collect();

        if sources.len() == 1 {
            ctx.insert("source".into(), sources.values().next().cloned().unwrap_or_default());
        }
        if let Some(image) = single(&self.images) {
            ctx.insert("image".into(), image.clone());
        }
        if let Some(config) = single(&self.configs) {
            ctx.insert("config".into(), config.clone());
        }
        ctx.insert("sources".into(), Json::Object(sources));
        ctx.insert("images".into(), Json::Object(images));
        ctx.insert("configs".into(), Json::Object(configs));
        ctx.insert(
            "deployment".into(),
            self.deployment.as_ref().map(|d| json!({ "url": d.url, "revision": d.revision })).unwrap_or(Json::Null),
        );
        ctx
    }
}

fn single<V>(map: &BTreeMap<String, V>) -> Option<&V> {
    if map.len() == 1 {
        map.values().next()
    } else {
        None
    }
}

/// Producer resource names a resource consumes, as recorded on its status.
pub fn input_names(resource: &BlueprintResource) -> Vec<ResourceInput> {
    let mut names: Vec<ResourceInput> = Vec::new();
    let refs = resource
        .sources
        .iter()
        .chain(&resource.images)
        .map(|r| r.resource.clone())
        .chain(resource.deployment.iter().map(|d| d.resource.clone()))
        .chain(resource.configs.iter().map(|r| r.resource.clone()));
    for name in refs {
        names.push(ResourceInput { name });
    }
    names
}

/// Context visible to `$(...)$` tags when stamping a blueprint resource. The owner is reachable
/// as both `workload` and `deliverable`, whichever kind it is.
pub fn templating_context(owner: &Json, params: &BTreeMap<String, Json>, inputs: &Inputs) -> Json {
    let mut ctx = inputs.context_entries();
    for key in [OwnerKind::Workload.context_key(), OwnerKind::Deliverable.context_key()] {
        ctx.insert(key.into(), owner.clone());
    }
    ctx.insert("params".into(), json!(params));
    Json::Object(ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use carto_core::api::{DeploymentReference, ResourceReference};

    fn refs(pairs: &[(&str, &str)]) -> Vec<ResourceReference> {
        pairs.iter().map(|(n, r)| ResourceReference { name: n.to_string(), resource: r.to_string() }).collect()
    }

    fn outputs() -> OutputsByResource {
        let mut m = OutputsByResource::new();
        m.insert("git".into(), Output::Source(SourceOutput { url: json!("https://git"), revision: json!("abc") }));
        m.insert("kpack".into(), Output::Image(json!("registry/app@sha256:1")));
        m.insert("conventions".into(), Output::Config(json!({ "spec": { "containers": [] } })));
        m
    }

    #[test]
    fn singular_aliases_only_for_single_entries() {
        let resource = BlueprintResource {
            name: "config".into(),
            sources: refs(&[("src", "git")]),
            images: refs(&[("img", "kpack"), ("other", "kpack")]),
            configs: refs(&[("cfg", "conventions")]),
            ..Default::default()
        };
        let inputs = Inputs::assemble(&resource, &outputs());
        let ctx = templating_context(&json!({ "metadata": { "name": "w" } }), &BTreeMap::new(), &inputs);

        assert_eq!(ctx["source"], json!({ "url": "https://git", "revision": "abc", "name": "src" }));
        assert!(ctx.get("image").is_none());
        assert_eq!(ctx["images"]["other"]["image"], json!("registry/app@sha256:1"));
        assert_eq!(ctx["config"], json!({ "spec": { "containers": [] } }));
        assert_eq!(ctx["workload"]["metadata"]["name"], "w");
        assert!(ctx["deployment"].is_null());
    }

    #[test]
    fn owner_is_reachable_under_both_owner_keys() {
        let owner = json!({ "kind": "Deliverable", "metadata": { "name": "petclinic" } });
        let inputs = Inputs::assemble(&BlueprintResource::default(), &OutputsByResource::new());
        let ctx = templating_context(&owner, &BTreeMap::new(), &inputs);
        assert_eq!(ctx["deliverable"], owner);
        assert_eq!(ctx["workload"], owner);
    }

    #[test]
    fn missing_producers_are_dropped() {
        let resource = BlueprintResource {
            name: "image".into(),
            sources: refs(&[("src", "not-yet-realized")]),
            images: refs(&[("img", "git")]),
            ..Default::default()
        };
        let inputs = Inputs::assemble(&resource, &outputs());
        assert!(inputs.sources.is_empty());
        assert!(inputs.images.is_empty(), "a source output does not satisfy an image reference");
    }

    #[test]
    fn deployment_and_input_names() {
        let resource = BlueprintResource {
            name: "deployer".into(),
            sources: refs(&[("src", "git")]),
            deployment: Some(DeploymentReference { resource: "git".into() }),
            ..Default::default()
        };
        let inputs = Inputs::assemble(&resource, &outputs());
        assert_eq!(inputs.deployment.as_ref().map(|d| d.revision.clone()), Some(json!("abc")));
        assert_eq!(inputs.pass_through("ClusterSourceTemplate", "src"), Some(outputs()["git"].clone()));
        assert_eq!(inputs.pass_through("ClusterDeploymentTemplate", "ignored"), Some(outputs()["git"].clone()));
        assert_eq!(inputs.pass_through("ClusterImageTemplate", "src"), None);
        let names: Vec<_> = input_names(&resource).into_iter().map(|i| i.name).collect();
        assert_eq!(names, ["git", "git"]);
    }
}

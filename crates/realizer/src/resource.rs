//! Realizing one blueprint resource: choose a template, stamp it, apply it, read its output.

use std::collections::BTreeMap;

use carto_core::api::{BlueprintParam, BlueprintResource, OwnerParam, TemplateOption, API_VERSION};
use carto_core::{labels, ConditionStatus, OwnerKind};
use carto_eval::best_selector_match_indices;
use carto_templates::model::creation_timestamp;
use carto_templates::{
    merge_params, templating_context, Inputs, Output, OutputError, OutputsByResource, StampError, Stamper, Template, Ytt,
};
use serde_json::Value as Json;
use tracing::{debug, warn};

use crate::apply::{ensure_immutable, ensure_mutable};
use crate::client::{
    api_version_of, guess_qualified_resource, kind_of, name_of, namespace_of, ClusterClient, ObjectKey,
};
use crate::errors::{BlueprintName, RealizerError, TemplateFetchError};
use crate::gc::{cleanup, ExaminedObject};
use crate::health::object_health;

/// What realizing a resource produced, including partial results when it failed.
#[derive(Debug, Default)]
pub struct Realization {
    pub template: Option<Template>,
    /// Name of the template chosen directly or through an option; empty for pass-through.
    pub template_name: String,
    pub stamped: Option<Json>,
    pub output: Option<Output>,
    pub pass_through: bool,
    pub error: Option<RealizerError>,
}

impl Realization {
    fn failed(mut self, error: RealizerError) -> Self {
        self.error = Some(error);
        self
    }
}

/// Realizes the resources of one blueprint on behalf of one owner.
pub struct ResourceRealizer<'a> {
    client: &'a dyn ClusterClient,
    kind: OwnerKind,
    owner: &'a Json,
    owner_params: Vec<OwnerParam>,
    blueprint: BlueprintName,
    blueprint_params: &'a [BlueprintParam],
    ytt: Option<&'a Ytt>,
}

impl<'a> ResourceRealizer<'a> {
    pub fn new(
        client: &'a dyn ClusterClient,
        kind: OwnerKind,
        owner: &'a Json,
        blueprint_name: &str,
        blueprint_params: &'a [BlueprintParam],
    ) -> Self {
        let owner_params = owner
            .pointer("/spec/params")
            .cloned()
            .and_then(|p| serde_json::from_value(p).ok())
            .unwrap_or_default();
        Self {
            client,
            kind,
            owner,
            owner_params,
            blueprint: BlueprintName { noun: kind.blueprint_noun(), name: blueprint_name.to_string() },
            blueprint_params,
            ytt: None,
        }
    }

    pub fn with_ytt(mut self, ytt: &'a Ytt) -> Self {
        self.ytt = Some(ytt);
        self
    }

    pub fn blueprint(&self) -> &BlueprintName {
        &self.blueprint
    }

    /// Labels identifying the objects stamped for `resource`, without the lifecycle label.
    pub fn resource_labels(&self, resource: &BlueprintResource, template_name: &str) -> BTreeMap<String, String> {
        let owner_ns = namespace_of(self.owner).unwrap_or_default();
        BTreeMap::from([
            (self.kind.owner_name_label().to_string(), name_of(self.owner).to_string()),
            (self.kind.owner_namespace_label().to_string(), owner_ns.to_string()),
            (self.kind.blueprint_name_label().to_string(), self.blueprint.name.clone()),
            (labels::RESOURCE_NAME.to_string(), resource.name.clone()),
            (labels::TEMPLATE_KIND.to_string(), resource.template_ref.kind.clone()),
            (labels::CLUSTER_TEMPLATE_NAME.to_string(), template_name.to_string()),
        ])
    }

    fn select_option<'r>(&self, resource: &'r BlueprintResource) -> Result<&'r TemplateOption, RealizerError> {
        let options = &resource.template_ref.options;
        let selectors: Vec<_> = options.iter().map(|o| o.selector.clone()).collect();
        let matched = best_selector_match_indices(self.owner, &selectors).map_err(|source| {
            RealizerError::ResolveTemplateOption {
                option: options.get(source.index).map(|o| o.display_name().to_string()).unwrap_or_default(),
                resource: resource.name.clone(),
                blueprint: self.blueprint.clone(),
                source,
            }
        })?;
        match matched.as_slice() {
            [only] => Ok(&options[*only]),
            _ => Err(RealizerError::TemplateOptionsMatch {
                resource: resource.name.clone(),
                options: matched.iter().filter_map(|i| options.get(*i)).map(|o| o.display_name().to_string()).collect(),
                blueprint: self.blueprint.clone(),
            }),
        }
    }

    async fn fetch_template(&self, kind: &str, name: &str) -> Result<Template, TemplateFetchError> {
        let obj = self.client.get(&ObjectKey::new(API_VERSION, kind, None, name)).await?;
        Ok(Template::from_object(kind, obj)?)
    }

    async fn qualified_resource(&self, obj: &Json) -> String {
        let (api_version, kind) = (api_version_of(obj), kind_of(obj));
        match self.client.qualified_resource(api_version, kind).await {
            Ok(q) => q,
            Err(e) => {
                warn!(error = %e, kind, "failed to resolve qualified resource name");
                guess_qualified_resource(api_version, kind)
            }
        }
    }

    /// Realize `resource` given the outputs of the resources before it.
    pub async fn realize(&self, resource: &BlueprintResource, outputs: &OutputsByResource) -> Realization {
        let mut done = Realization::default();
        let inputs = Inputs::assemble(resource, outputs);

        let template_name = if resource.template_ref.options.is_empty() {
            resource.template_ref.name.clone().unwrap_or_default()
        } else {
            let option = match self.select_option(resource) {
                Ok(o) => o,
                Err(e) => return done.failed(e),
            };
            if let Some(input) = option.pass_through.as_deref() {
                debug!(resource = %resource.name, input, "passing input through");
                done.pass_through = true;
                let kind = resource.template_ref.kind.as_str();
                return match inputs.pass_through(kind, input) {
                    Some(out) => {
                        done.output = Some(out);
                        done
                    }
                    None => done.failed(RealizerError::PassThroughInputNotFound {
                        input: input.to_string(),
                        category: pass_through_category(kind),
                        resource: resource.name.clone(),
                        blueprint: self.blueprint.clone(),
                    }),
                };
            }
            option.name.clone().unwrap_or_default()
        };
        done.template_name = template_name.clone();

        let kind = resource.template_ref.kind.as_str();
        debug!(resource = %resource.name, template = %format!("{kind}/{template_name}"), "realizing template");
        let template = match self.fetch_template(kind, &template_name).await {
            Ok(t) => t,
            Err(source) => {
                return done.failed(RealizerError::GetTemplate {
                    template: template_name,
                    resource: resource.name.clone(),
                    blueprint: self.blueprint.clone(),
                    source,
                })
            }
        };

        let resource_labels = self.resource_labels(resource, &template_name);
        let mut stamp_labels = resource_labels.clone();
        stamp_labels.insert(labels::TEMPLATE_LIFECYCLE.to_string(), template.lifecycle().as_str().to_string());

        let params = merge_params(template.default_params(), self.blueprint_params, &resource.params, &self.owner_params);
        let context = templating_context(self.owner, &params, &inputs);
        let mut stamper = Stamper::new(self.owner, &context, &stamp_labels);
        if let Some(ytt) = self.ytt {
            stamper = stamper.with_ytt(ytt);
        }
        let stamp_result = match template.body() {
            Some(body) => stamper.stamp(&body).await,
            None => Err(StampError::NoBody),
        };
        let stamped = match stamp_result {
            Ok(obj) => obj,
            Err(source) => {
                let error = RealizerError::Stamp {
                    resource: resource.name.clone(),
                    template_kind: kind.to_string(),
                    template: template_name,
                    blueprint: self.blueprint.clone(),
                    source,
                };
                done.template = Some(template);
                return done.failed(error);
            }
        };

        let applied = if template.lifecycle().is_immutable() {
            ensure_immutable(self.client, stamped.clone(), &stamp_labels).await
        } else {
            ensure_mutable(self.client, stamped.clone(), &stamp_labels).await
        };
        let live = match applied {
            Ok(obj) => obj,
            Err(source) => {
                let error = RealizerError::ApplyStampedObject {
                    namespace: namespace_of(&stamped).unwrap_or_default().to_string(),
                    name: name_of(&stamped).to_string(),
                    resource: resource.name.clone(),
                    blueprint: self.blueprint.clone(),
                    source,
                };
                done.template = Some(template);
                return done.failed(error);
            }
        };

        let output = if template.lifecycle().is_immutable() {
            self.immutable_output(resource, &template, &live, &resource_labels, &inputs).await
        } else {
            match template.output(&live, &inputs) {
                Ok(out) => Ok(out),
                Err(source) => Err(self.retrieve_output_error(resource, &live, source).await),
            }
        };
        done.template = Some(template);
        done.stamped = Some(live);
        match output {
            Ok(out) => {
                done.output = out;
                done
            }
            Err(e) => done.failed(e),
        }
    }

    async fn retrieve_output_error(&self, resource: &BlueprintResource, read_from: &Json, source: OutputError) -> RealizerError {
        RealizerError::RetrieveOutput {
            resource: resource.name.clone(),
            blueprint: self.blueprint.clone(),
            namespace: namespace_of(read_from).unwrap_or_default().to_string(),
            name: name_of(read_from).to_string(),
            qualified_resource: self.qualified_resource(read_from).await,
            source,
        }
    }

    /// Output of the newest healthy object stamped for an immutable resource. Objects past the
    /// template's retention policy are cleaned up first.
    async fn immutable_output(
        &self,
        resource: &BlueprintResource,
        template: &Template,
        live: &Json,
        resource_labels: &BTreeMap<String, String>,
        inputs: &Inputs,
    ) -> Result<Option<Output>, RealizerError> {
        let namespace = namespace_of(live).unwrap_or_default();
        let objects = self
            .client
            .list(api_version_of(live), kind_of(live), namespace_of(live), resource_labels)
            .await
            .map_err(|source| RealizerError::ListCreatedObjects {
                namespace: namespace.to_string(),
                labels: resource_labels.clone(),
                source,
            })?;

        let rule = template.health_rule();
        let examined: Vec<ExaminedObject> = objects
            .into_iter()
            .map(|object| ExaminedObject { health: object_health(rule.as_ref(), &object), object })
            .collect();
        cleanup(self.client, &examined, template.retention_policy()).await;

        let latest = examined
            .iter()
            .filter(|e| e.health == ConditionStatus::True)
            .max_by_key(|e| creation_timestamp(&e.object));
        match latest {
            Some(e) => match template.output(&e.object, inputs) {
                Ok(out) => Ok(out),
                Err(source) => Err(self.retrieve_output_error(resource, &e.object, source).await),
            },
            None if matches!(template, Template::Generic(_)) => Ok(None),
            None => {
                debug!(resource = %resource.name, considered = examined.len(), "no healthy immutable object");
                Err(RealizerError::NoHealthyImmutableObjects {
                    resource: resource.name.clone(),
                    blueprint: self.blueprint.clone(),
                    namespace: namespace.to_string(),
                    qualified_resource: self.qualified_resource(live).await,
                })
            }
        }
    }
}

fn pass_through_category(template_kind: &str) -> &'static str {
    match template_kind {
        "ClusterSourceTemplate" => "sources",
        "ClusterImageTemplate" => "images",
        "ClusterConfigTemplate" => "configs",
        "ClusterDeploymentTemplate" => "deployment",
        _ => "inputs",
    }
}

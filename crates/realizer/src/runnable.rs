//! Runnables: stamp a ClusterRunTemplate once per distinct input, keep a bounded history of runs
//! and surface the outputs of the newest successful one.

use std::collections::BTreeMap;

use carto_core::api::{ResourceSelector, Runnable, API_VERSION};
use carto_core::conditions::{self, reasons};
use carto_core::{labels, Condition, ConditionStatus};
use carto_templates::model::condition_status;
use carto_templates::{OutputError, RunTemplate, StampError, Stamper, Ytt};
use serde_json::{json, Value as Json};
use thiserror::Error;
use tracing::{debug, warn};

use crate::apply::ensure_immutable;
use crate::client::{api_version_of, guess_qualified_resource, kind_of, name_of, namespace_of, ClusterClient, ClusterError, ObjectKey};
use crate::errors::TemplateFetchError;
use crate::gc::{cleanup, ExaminedObject};

pub const RUN_TEMPLATE_KIND: &str = "ClusterRunTemplate";

#[derive(Debug, Error)]
pub enum SelectedObjectError {
    #[error("selector did not match any objects")]
    NoMatch,
    #[error("selector matched multiple objects")]
    MultipleMatches,
    #[error(transparent)]
    Cluster(#[from] ClusterError),
}

#[derive(Debug, Error)]
pub enum RunnableError {
    #[error("unable to encode runnable [{namespace}/{name}] for templating: {source}")]
    Encode {
        namespace: String,
        name: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("unable to get run template [{template}] for runnable [{namespace}/{name}]: {source}")]
    GetRunTemplate {
        template: String,
        namespace: String,
        name: String,
        #[source]
        source: TemplateFetchError,
    },
    #[error("unable to resolve selector [{matching_labels:?}], apiVersion [{api_version}], kind [{kind}]: {source}")]
    ResolveSelector {
        matching_labels: BTreeMap<String, String>,
        api_version: String,
        kind: String,
        #[source]
        source: SelectedObjectError,
    },
    #[error("unable to stamp object [{namespace}/{name}]: {source}")]
    Stamp {
        namespace: String,
        name: String,
        #[source]
        source: StampError,
    },
    #[error("unable to apply stamped object [{namespace}/{name}]: {source}")]
    ApplyStampedObject {
        namespace: String,
        name: String,
        #[source]
        source: ClusterError,
    },
    #[error("unable to list objects in namespace [{namespace}] with labels [{labels:?}]: {source}")]
    ListCreatedObjects {
        namespace: String,
        labels: BTreeMap<String, String>,
        #[source]
        source: ClusterError,
    },
    #[error("unable to retrieve outputs from stamped object [{namespace}/{name}] of type [{qualified_resource}]: {source}")]
    RetrieveOutput {
        namespace: String,
        name: String,
        qualified_resource: String,
        #[source]
        source: OutputError,
    },
}

impl RunnableError {
    /// `RunTemplateReady` condition describing this error.
    pub fn condition(&self) -> Condition {
        let (reason, message) = match self {
            RunnableError::Encode { .. } => (reasons::UNKNOWN_ERROR, self.to_string()),
            RunnableError::GetRunTemplate { .. } => (reasons::RUN_TEMPLATE_NOT_FOUND, self.to_string()),
            RunnableError::ResolveSelector { .. } | RunnableError::Stamp { .. } => {
                (reasons::TEMPLATE_STAMP_FAILURE, self.to_string())
            }
            RunnableError::ApplyStampedObject { .. } => (reasons::STAMPED_OBJECT_REJECTED_BY_API_SERVER, self.to_string()),
            RunnableError::ListCreatedObjects { .. } => (reasons::FAILED_TO_LIST_CREATED_OBJECTS, self.to_string()),
            RunnableError::RetrieveOutput { namespace, name, qualified_resource, .. } => {
                let ns = if namespace.is_empty() { String::new() } else { format!(" in namespace [{namespace}]") };
                (
                    reasons::OUTPUT_PATH_NOT_SATISFIED,
                    format!("waiting to read value from resource [{qualified_resource}/{name}]{ns}: {self}"),
                )
            }
        };
        Condition::new(conditions::RUN_TEMPLATE_READY, ConditionStatus::False, reason).with_message(message)
    }

    /// Errors the user has to fix; retrying sooner than the next resync does not help.
    pub fn is_handled(&self) -> bool {
        match self {
            RunnableError::ResolveSelector { .. } | RunnableError::Stamp { .. } | RunnableError::RetrieveOutput { .. } => true,
            RunnableError::ApplyStampedObject { source, .. } => matches!(source, ClusterError::Rejected(_)),
            RunnableError::Encode { .. }
            | RunnableError::GetRunTemplate { .. }
            | RunnableError::ListCreatedObjects { .. } => false,
        }
    }
}

/// What one Runnable reconcile produced.
#[derive(Debug, Default)]
pub struct RunnableRealization {
    /// The object stamped for the current inputs, when stamping got that far.
    pub stamped: Option<Json>,
    pub outputs: BTreeMap<String, Json>,
    pub error: Option<RunnableError>,
}

pub struct RunnableRealizer<'a> {
    client: &'a dyn ClusterClient,
    ytt: Option<&'a Ytt>,
}

impl<'a> RunnableRealizer<'a> {
    pub fn new(client: &'a dyn ClusterClient) -> Self {
        Self { client, ytt: None }
    }

    pub fn with_ytt(mut self, ytt: &'a Ytt) -> Self {
        self.ytt = Some(ytt);
        self
    }

    /// Resolve `selector` to the single object it names in `namespace`, or at cluster scope for
    /// cluster-scoped kinds.
    pub async fn resolve_selector(
        &self,
        selector: &ResourceSelector,
        namespace: &str,
    ) -> Result<Json, SelectedObjectError> {
        let (api_version, kind) = (&selector.resource.api_version, &selector.resource.kind);
        let scope = if self.client.is_namespaced(api_version, kind).await? { Some(namespace) } else { None };
        let mut found = self.client.list(api_version, kind, scope, &selector.matching_labels).await?;
        match found.len() {
            0 => Err(SelectedObjectError::NoMatch),
            1 => Ok(found.remove(0)),
            _ => Err(SelectedObjectError::MultipleMatches),
        }
    }

    pub async fn realize(&self, runnable: &Runnable) -> RunnableRealization {
        let mut done = RunnableRealization {
            outputs: runnable.status.as_ref().map(|s| s.outputs.clone()).unwrap_or_default(),
            ..Default::default()
        };
        match self.run(runnable, &mut done).await {
            Ok(()) => done,
            Err(e) => {
                done.error = Some(e);
                done
            }
        }
    }

    async fn run(&self, runnable: &Runnable, done: &mut RunnableRealization) -> Result<(), RunnableError> {
        let owner = serde_json::to_value(runnable).map_err(|source| RunnableError::Encode {
            namespace: runnable.metadata.namespace.clone().unwrap_or_default(),
            name: runnable.metadata.name.clone().unwrap_or_default(),
            source,
        })?;
        let name = name_of(&owner).to_string();
        let namespace = namespace_of(&owner).unwrap_or_default().to_string();
        let spec = &runnable.spec;

        let template_name = spec.run_template_ref.name.clone();
        let template = self
            .fetch(&template_name)
            .await
            .map_err(|source| RunnableError::GetRunTemplate {
                template: template_name.clone(),
                namespace: namespace.clone(),
                name: name.clone(),
                source,
            })?;

        let run_labels = BTreeMap::from([
            (labels::RUNNABLE_NAME.to_string(), name.clone()),
            (labels::RUN_TEMPLATE_NAME.to_string(), template.name().to_string()),
        ]);

        let selected = match &spec.selector {
            Some(selector) => self.resolve_selector(selector, &namespace).await.map_err(|source| {
                RunnableError::ResolveSelector {
                    matching_labels: selector.matching_labels.clone(),
                    api_version: selector.resource.api_version.clone(),
                    kind: selector.resource.kind.clone(),
                    source,
                }
            })?,
            None => Json::Null,
        };

        let context = json!({ "runnable": owner, "selected": selected });
        let mut stamper = Stamper::new(&owner, &context, &run_labels);
        if let Some(ytt) = self.ytt {
            stamper = stamper.with_ytt(ytt);
        }
        let stamped = stamper.stamp(&template.body()).await.map_err(|source| RunnableError::Stamp {
            namespace: namespace.clone(),
            name: name.clone(),
            source,
        })?;

        let live = ensure_immutable(self.client, stamped.clone(), &run_labels).await.map_err(|source| {
            let shown = match name_of(&stamped) {
                "" => stamped.pointer("/metadata/generateName").and_then(|v| v.as_str()).unwrap_or_default(),
                n => n,
            };
            RunnableError::ApplyStampedObject { namespace: namespace.clone(), name: shown.to_string(), source }
        })?;
        debug!(object = %ObjectKey::of(&live), "realized run object");
        done.stamped = Some(live.clone());

        let runs = self
            .client
            .list(api_version_of(&live), kind_of(&live), namespace_of(&live), &run_labels)
            .await
            .map_err(|source| RunnableError::ListCreatedObjects {
                namespace: namespace.clone(),
                labels: run_labels.clone(),
                source,
            })?;

        let examined: Vec<ExaminedObject> = runs
            .iter()
            .map(|obj| ExaminedObject {
                health: ConditionStatus::parse(&condition_status(obj, "Succeeded").unwrap_or_default()),
                object: obj.clone(),
            })
            .collect();
        cleanup(self.client, &examined, spec.retention_policy.unwrap_or_default()).await;

        match template.outputs(&runs) {
            Ok(Some(outputs)) if !outputs.is_empty() => done.outputs = outputs,
            Ok(_) => debug!(runnable = %name, "no outputs retrieved, keeping previous outputs"),
            Err(source) => {
                let qualified_resource = match self.client.qualified_resource(api_version_of(&live), kind_of(&live)).await {
                    Ok(q) => q,
                    Err(e) => {
                        warn!(error = %e, "failed to resolve qualified resource name");
                        guess_qualified_resource(api_version_of(&live), kind_of(&live))
                    }
                };
                return Err(RunnableError::RetrieveOutput {
                    namespace: namespace_of(&live).unwrap_or_default().to_string(),
                    name: name_of(&live).to_string(),
                    qualified_resource,
                    source,
                });
            }
        }
        Ok(())
    }

    async fn fetch(&self, name: &str) -> Result<RunTemplate, TemplateFetchError> {
        let obj = self.client.get(&ObjectKey::new(API_VERSION, RUN_TEMPLATE_KIND, None, name)).await?;
        Ok(RunTemplate::from_object(obj)?)
    }
}

/// `StampedObjectCondition` mirroring the `Succeeded` condition of the current run.
pub fn stamped_object_condition(stamped: Option<&Json>) -> Condition {
    match stamped.and_then(|obj| condition_status(obj, "Succeeded")) {
        Some(status) => Condition::new(
            conditions::STAMPED_OBJECT_CONDITION,
            ConditionStatus::parse(&status),
            reasons::SUCCEEDED_CONDITION,
        ),
        None => Condition::new(conditions::STAMPED_OBJECT_CONDITION, ConditionStatus::Unknown, reasons::UNKNOWN),
    }
}

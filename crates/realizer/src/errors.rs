use std::collections::BTreeMap;
use std::fmt;

use carto_core::conditions::reasons;
use carto_core::{Condition, ConditionStatus};
use carto_eval::MatchError;
use carto_templates::{OutputError, StampError, TemplateModelError};
use thiserror::Error;

use crate::client::ClusterError;

/// A blueprint as it is named in error messages, e.g. `supply chain [web]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlueprintName {
    pub noun: &'static str,
    pub name: String,
}

impl fmt::Display for BlueprintName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.noun, self.name)
    }
}

#[derive(Debug, Error)]
pub enum TemplateFetchError {
    #[error(transparent)]
    Cluster(#[from] ClusterError),
    #[error(transparent)]
    Model(#[from] TemplateModelError),
}

/// Why realizing one blueprint resource stopped.
#[derive(Debug, Error)]
pub enum RealizerError {
    #[error("error matching against template option [{option}] for resource [{resource}] in {blueprint}: {source}")]
    ResolveTemplateOption {
        option: String,
        resource: String,
        blueprint: BlueprintName,
        #[source]
        source: MatchError,
    },
    #[error(
        "expected exactly 1 option to match, found [{}] matching options {}for resource [{resource}] in {blueprint}",
        .options.len(),
        option_list(.options)
    )]
    TemplateOptionsMatch { resource: String, options: Vec<String>, blueprint: BlueprintName },
    #[error("unable to get template [{template}] for resource [{resource}] in {blueprint}: {source}")]
    GetTemplate {
        template: String,
        resource: String,
        blueprint: BlueprintName,
        #[source]
        source: TemplateFetchError,
    },
    #[error("unable to stamp object for resource [{resource}] for template [{template_kind}/{template}] in {blueprint}: {source}")]
    Stamp {
        resource: String,
        template_kind: String,
        template: String,
        blueprint: BlueprintName,
        #[source]
        source: StampError,
    },
    #[error("unable to apply object [{namespace}/{name}] for resource [{resource}] in {blueprint}: {source}")]
    ApplyStampedObject {
        namespace: String,
        name: String,
        resource: String,
        blueprint: BlueprintName,
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
    #[error("{}", retrieve_output_message(.resource, .blueprint, .namespace, .name, .qualified_resource, .source))]
    RetrieveOutput {
        resource: String,
        blueprint: BlueprintName,
        namespace: String,
        name: String,
        qualified_resource: String,
        #[source]
        source: OutputError,
    },
    #[error("input [{input}] not found in {category} for pass through resource [{resource}] in {blueprint}")]
    PassThroughInputNotFound { input: String, category: &'static str, resource: String, blueprint: BlueprintName },
    #[error("no healthy objects of type [{qualified_resource}] in namespace [{namespace}] for immutable resource [{resource}] in {blueprint}")]
    NoHealthyImmutableObjects {
        resource: String,
        blueprint: BlueprintName,
        namespace: String,
        qualified_resource: String,
    },
}

fn option_list(options: &[String]) -> String {
    if options.is_empty() {
        String::new()
    } else {
        format!("[{}] ", options.join(", "))
    }
}

fn retrieve_output_message(
    resource: &str,
    blueprint: &BlueprintName,
    namespace: &str,
    name: &str,
    qualified: &str,
    source: &OutputError,
) -> String {
    match source.expression() {
        Some(expr) => format!(
            "unable to retrieve outputs [{expr}] from stamped object [{namespace}/{name}] of type [{qualified}] for resource [{resource}] in {blueprint}: {source}"
        ),
        None => format!(
            "unable to retrieve outputs from stamped object [{namespace}/{name}] of type [{qualified}] for resource [{resource}] in {blueprint}: {source}"
        ),
    }
}

impl RealizerError {
    pub fn resource(&self) -> Option<&str> {
        match self {
            RealizerError::ResolveTemplateOption { resource, .. }
            | RealizerError::TemplateOptionsMatch { resource, .. }
            | RealizerError::GetTemplate { resource, .. }
            | RealizerError::Stamp { resource, .. }
            | RealizerError::ApplyStampedObject { resource, .. }
            | RealizerError::RetrieveOutput { resource, .. }
            | RealizerError::PassThroughInputNotFound { resource, .. }
            | RealizerError::NoHealthyImmutableObjects { resource, .. } => Some(resource),
            RealizerError::ListCreatedObjects { .. } => None,
        }
    }

    /// The JSONPath expression behind a missing value, for output and stamping failures.
    pub fn expression(&self) -> Option<&str> {
        match self {
            RealizerError::RetrieveOutput { source, .. } => source.expression(),
            RealizerError::Stamp { source, .. } => source.expression(),
            _ => None,
        }
    }

    /// Errors that wait on the cluster to converge rather than on a user fix.
    pub fn is_pending(&self) -> bool {
        self.submitted_condition(carto_core::conditions::RESOURCE_SUBMITTED).status == ConditionStatus::Unknown
    }

    /// The `ResourceSubmitted`-style condition describing this error.
    pub fn submitted_condition(&self, type_: &str) -> Condition {
        let (status, reason, message) = match self {
            RealizerError::GetTemplate { .. } => {
                (ConditionStatus::False, reasons::TEMPLATE_OBJECT_RETRIEVAL_FAILURE, self.to_string())
            }
            RealizerError::Stamp { .. } => (ConditionStatus::False, reasons::TEMPLATE_STAMP_FAILURE, self.to_string()),
            RealizerError::ApplyStampedObject { .. } => {
                (ConditionStatus::False, reasons::TEMPLATE_REJECTED_BY_API_SERVER, self.to_string())
            }
            RealizerError::ResolveTemplateOption { .. } => {
                (ConditionStatus::False, reasons::RESOLVE_TEMPLATE_OPTIONS_ERROR, self.to_string())
            }
            RealizerError::TemplateOptionsMatch { .. } => {
                (ConditionStatus::False, reasons::TEMPLATE_OPTIONS_MATCH_ERROR, self.to_string())
            }
            RealizerError::NoHealthyImmutableObjects { .. } => {
                (ConditionStatus::Unknown, reasons::NO_HEALTHY_IMMUTABLE_OBJECTS, self.to_string())
            }
            RealizerError::RetrieveOutput { resource, namespace, name, qualified_resource, source, .. } => match source {
                OutputError::JsonPath { expression, .. } => {
                    let ns = if namespace.is_empty() { String::new() } else { format!(" in namespace [{namespace}]") };
                    (
                        ConditionStatus::Unknown,
                        reasons::MISSING_VALUE_AT_PATH,
                        format!("waiting to read value [{expression}] from resource [{qualified_resource}/{name}]{ns}"),
                    )
                }
                OutputError::ObservedGeneration(_) => (
                    ConditionStatus::False,
                    reasons::TEMPLATE_STAMP_FAILURE,
                    format!("resource [{resource}] cannot satisfy observedCompletion without observedGeneration in object status"),
                ),
                OutputError::DeploymentCondition(_) => (
                    ConditionStatus::Unknown,
                    reasons::DEPLOYMENT_CONDITION_NOT_MET,
                    format!("resource [{resource}] condition not met: {source}"),
                ),
                OutputError::DeploymentFailedConditionMet(_) => (
                    ConditionStatus::False,
                    reasons::DEPLOYMENT_FAILED_CONDITION_MET,
                    format!("resource [{resource}] failed condition met: {source}"),
                ),
                OutputError::MissingDeployment => (ConditionStatus::False, reasons::UNKNOWN_ERROR, self.to_string()),
            },
            RealizerError::ListCreatedObjects { .. } | RealizerError::PassThroughInputNotFound { .. } => {
                (ConditionStatus::False, reasons::UNKNOWN_ERROR, self.to_string())
            }
        };
        Condition::new(type_, status, reason).with_message(message)
    }
}

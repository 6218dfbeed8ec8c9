use carto_realizer::{ClusterError, RealizerError, RunnableError, TemplateFetchError};
use thiserror::Error;

/// Failure of one reconcile; the object is requeued after the configured delay.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("decoding {kind}: {message}")]
    Decode { kind: &'static str, message: String },
    #[error("listing {kind}: {source}")]
    List {
        kind: &'static str,
        #[source]
        source: ClusterError,
    },
    #[error("updating status of {key}: {source}")]
    StatusUpdate {
        key: String,
        #[source]
        source: ClusterError,
    },
    #[error("realizing resources: {0}")]
    Realize(#[source] RealizerError),
    #[error("realizing runnable: {0}")]
    Runnable(#[source] RunnableError),
    #[error("checking templates: {0}")]
    Templates(#[source] ClusterError),
}

impl ReconcileError {
    /// Short label used for metrics.
    pub fn metric_label(&self) -> &'static str {
        match self {
            ReconcileError::Decode { .. } => "decode",
            ReconcileError::List { .. } => "list",
            ReconcileError::StatusUpdate { .. } => "status_update",
            ReconcileError::Realize(_) => "realize",
            ReconcileError::Runnable(_) => "runnable",
            ReconcileError::Templates(_) => "templates",
        }
    }
}

/// Realizer errors a retry may fix without the user changing anything: API failures other
/// than a rejection of the stamped object. Everything else is reported in status and waits for
/// the next change or resync.
pub fn needs_retry(err: &RealizerError) -> bool {
    match err {
        RealizerError::GetTemplate { source: TemplateFetchError::Cluster(e), .. } => !e.is_not_found(),
        RealizerError::ApplyStampedObject { source, .. } => !matches!(source, ClusterError::Rejected(_)),
        RealizerError::ListCreatedObjects { .. } => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use carto_realizer::BlueprintName;

    fn bp() -> BlueprintName {
        BlueprintName { noun: "supply chain", name: "web".into() }
    }

    #[test]
    fn only_transient_api_failures_retry() {
        let apply = |source| RealizerError::ApplyStampedObject {
            namespace: "dev".into(),
            name: "app".into(),
            resource: "image".into(),
            blueprint: bp(),
            source,
        };
        assert!(!needs_retry(&apply(ClusterError::Rejected("denied".into()))));
        assert!(needs_retry(&apply(ClusterError::Api("timeout".into()))));

        let missing = RealizerError::GetTemplate {
            template: "image".into(),
            resource: "image".into(),
            blueprint: bp(),
            source: TemplateFetchError::Cluster(ClusterError::NotFound("image".into())),
        };
        assert!(!needs_retry(&missing));
    }
}

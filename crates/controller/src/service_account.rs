//! The identity stamped objects are written with.
//!
//! Owners and Runnables name a service account; everything realized for them goes through a
//! client impersonating it, so RBAC on that account bounds what a template may create.

use carto_core::api::ServiceAccountRef;
use carto_core::conditions::reasons;
use carto_core::{Condition, ConditionStatus};
use carto_realizer::{ClusterClient, ClusterError, ObjectKey};
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_SERVICE_ACCOUNT: &str = "default";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceAccount {
    pub namespace: String,
    pub name: String,
}

impl ServiceAccount {
    /// The object's own account, else the blueprint's reference, else `default`. Accounts
    /// without a namespace live in the object's namespace.
    pub fn resolve(namespace: &str, own: Option<&str>, blueprint: Option<&ServiceAccountRef>) -> Self {
        let own = own.filter(|n| !n.is_empty());
        match (own, blueprint) {
            (Some(name), _) => Self { namespace: namespace.to_string(), name: name.to_string() },
            (None, Some(r)) if !r.name.is_empty() => Self {
                namespace: r.namespace.clone().filter(|ns| !ns.is_empty()).unwrap_or_else(|| namespace.to_string()),
                name: r.name.clone(),
            },
            _ => Self { namespace: namespace.to_string(), name: DEFAULT_SERVICE_ACCOUNT.to_string() },
        }
    }
}

#[derive(Debug, Error)]
pub enum ServiceAccountError {
    #[error("service account [{name}] not found in namespace [{namespace}]")]
    NotFound { namespace: String, name: String },

    #[error("unable to act as service account [{name}] in namespace [{namespace}]: {source}")]
    Unusable {
        namespace: String,
        name: String,
        #[source]
        source: ClusterError,
    },
}

impl ServiceAccountError {
    fn unusable(account: &ServiceAccount, source: ClusterError) -> Self {
        Self::Unusable { namespace: account.namespace.clone(), name: account.name.clone(), source }
    }

    pub fn condition(&self, type_: &str) -> Condition {
        let reason = match self {
            Self::NotFound { .. } => reasons::SERVICE_ACCOUNT_NOT_FOUND,
            Self::Unusable { .. } => reasons::SERVICE_ACCOUNT_ERROR,
        };
        Condition::new(type_, ConditionStatus::False, reason).with_message(self.to_string())
    }
}

/// The client to realize with.
pub enum Acting<'a> {
    /// The cluster cannot impersonate; keep its own identity.
    Borrowed(&'a dyn ClusterClient),
    Impersonating(Box<dyn ClusterClient>),
}

impl Acting<'_> {
    pub fn client(&self) -> &dyn ClusterClient {
        match self {
            Acting::Borrowed(client) => *client,
            Acting::Impersonating(client) => client.as_ref(),
        }
    }
}

/// Check that `account` exists and get a client acting as it.
pub async fn act_as<'a>(client: &'a dyn ClusterClient, account: &ServiceAccount) -> Result<Acting<'a>, ServiceAccountError> {
    let key = ObjectKey::new("v1", "ServiceAccount", Some(&account.namespace), &account.name);
    match client.get(&key).await {
        Ok(_) => {}
        Err(e) if e.is_not_found() => {
            return Err(ServiceAccountError::NotFound { namespace: account.namespace.clone(), name: account.name.clone() })
        }
        Err(e) => return Err(ServiceAccountError::unusable(account, e)),
    }
    match client.impersonate(&account.namespace, &account.name).await {
        Ok(Some(acting)) => {
            debug!(namespace = %account.namespace, name = %account.name, "acting as service account");
            Ok(Acting::Impersonating(acting))
        }
        Ok(None) => Ok(Acting::Borrowed(client)),
        Err(e) => Err(ServiceAccountError::unusable(account, e)),
    }
}

//! Cartographer controller: reconcilers for owners, blueprints and runnables, their
//! kube-runtime wiring, and the validating admission webhook.
//!
//! The reconcilers work on JSON objects through [`carto_realizer::ClusterClient`] so they run
//! the same against the API server and the in-memory test cluster.

#![forbid(unsafe_code)]

pub mod blueprint;
pub mod config;
pub mod errors;
pub mod index;
pub mod owner;
pub mod run;
pub mod runnable;
pub mod selection;
pub mod service_account;
pub mod tracker;
pub mod webhook;

pub use blueprint::reconcile_blueprint;
pub use config::ControllerConfig;
pub use errors::ReconcileError;
pub use owner::{OwnerOutcome, OwnerReconciler};
pub use run::run;
pub use runnable::{reconcile_runnable, RunnableOutcome};
pub use service_account::{ServiceAccount, ServiceAccountError};

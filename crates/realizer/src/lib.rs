//! Cartographer realization: stamping blueprint resources onto the cluster, reading their
//! outputs and health, and running Runnables with bounded history.

#![forbid(unsafe_code)]

pub mod apply;
pub mod blueprint;
pub mod client;
pub mod errors;
#[cfg(any(test, feature = "testing"))]
pub mod fake;
pub mod gc;
pub mod health;
pub mod resource;
pub mod runnable;

pub use blueprint::{output_entries, realize_blueprint, BlueprintRealization};
pub use client::{ClusterClient, ClusterError, ClusterResult, ObjectKey};
pub use errors::{BlueprintName, RealizerError, TemplateFetchError};
pub use health::{determine_health, owner_health_condition};
pub use resource::{Realization, ResourceRealizer};
pub use runnable::{stamped_object_condition, RunnableError, RunnableRealization, RunnableRealizer};

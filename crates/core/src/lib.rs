//! Cartographer core types: `carto.run` resources, label keys, status conditions and admission checks.

#![forbid(unsafe_code)]

pub mod api;
pub mod conditions;
pub mod labels;
pub mod owner;
pub mod validation;

pub use api::API_VERSION;
pub use carto_eval::{FieldSelectorRequirement, LabelSelectorRequirement, Selector};
pub use conditions::{Condition, ConditionManager, ConditionStatus};
pub use owner::{OwnerKind, OwnerStatus};
pub use validation::{validate_object, ValidationError};

pub mod prelude {
    pub use super::api::*;
    pub use super::conditions::{Condition, ConditionManager, ConditionStatus};
    pub use super::owner::{OwnerKind, OwnerStatus};
}

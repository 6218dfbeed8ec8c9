//! Cartographer expression evaluation: JSONPath over dynamic objects and selector scoring.

#![forbid(unsafe_code)]

pub mod jsonpath;
pub mod selector;

pub use jsonpath::{evaluate, normalize, JsonPath, JsonPathError};
pub use selector::{
    best_selector_match_indices, labels_of, matches_field, matches_labels, FieldSelectorRequirement,
    LabelSelectorRequirement, MatchError, Selector, SelectorError,
};

//! Label/field selectors and "most specific match" scoring.

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use thiserror::Error;

use crate::jsonpath;

pub const OP_IN: &str = "In";
pub const OP_NOT_IN: &str = "NotIn";
pub const OP_EXISTS: &str = "Exists";
pub const OP_DOES_NOT_EXIST: &str = "DoesNotExist";

/// Selector evaluated against an owner: labels, label expressions and JSONPath field requirements.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Selector {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub match_labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub match_expressions: Vec<LabelSelectorRequirement>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub match_fields: Vec<FieldSelectorRequirement>,
}

impl Selector {
    pub fn is_empty(&self) -> bool {
        self.match_labels.is_empty() && self.match_expressions.is_empty() && self.match_fields.is_empty()
    }

    pub fn specificity(&self) -> usize {
        self.match_labels.len() + self.match_expressions.len() + self.match_fields.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LabelSelectorRequirement {
    pub key: String,
    pub operator: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FieldSelectorRequirement {
    /// JSONPath into the candidate object.
    pub key: String,
    pub operator: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectorError {
    #[error("invalid label key [{0}]")]
    InvalidLabelKey(String),
    #[error("invalid label value [{value}] for key [{key}]")]
    InvalidLabelValue { key: String, value: String },
    #[error("\"{0}\" is not a valid label selector operator")]
    UnknownLabelOperator(String),
    #[error("values must be specified for operator [{0}]")]
    MissingValues(String),
    #[error("values may not be specified for operator [{0}]")]
    UnexpectedValues(String),
    #[error("invalid operator {0} for field selector")]
    UnknownFieldOperator(String),
    #[error("unable to match field requirement with key [{key}] operator [{operator}] values [{values:?}]: {source}")]
    Field {
        key: String,
        operator: String,
        values: Vec<String>,
        #[source]
        source: jsonpath::JsonPathError,
    },
}

/// Error while scoring a list of selectors, attributed to the offending selector.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}: {source}")]
pub struct MatchError {
    pub index: usize,
    pub message: &'static str,
    #[source]
    pub source: SelectorError,
}

impl MatchError {
    pub fn selector_index(&self) -> usize {
        self.index
    }
}

/// Labels of a candidate object (`metadata.labels`), empty when absent.
pub fn labels_of(candidate: &Json) -> BTreeMap<String, String> {
    candidate
        .get("metadata")
        .and_then(|m| m.get("labels"))
        .and_then(|l| l.as_object())
        .map(|m| {
            m.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

/// Does the label part (`matchLabels` + `matchExpressions`) of a selector match?
pub fn matches_labels(selector: &Selector, labels: &BTreeMap<String, String>) -> Result<bool, SelectorError> {
    for (k, v) in &selector.match_labels {
        validate_label_key(k)?;
        validate_label_value(k, v)?;
    }
    for req in &selector.match_expressions {
        validate_label_key(&req.key)?;
        match req.operator.as_str() {
            OP_IN | OP_NOT_IN => {
                if req.values.is_empty() {
                    return Err(SelectorError::MissingValues(req.operator.clone()));
                }
                for v in &req.values {
                    validate_label_value(&req.key, v)?;
                }
            }
            OP_EXISTS | OP_DOES_NOT_EXIST => {
                if !req.values.is_empty() {
                    return Err(SelectorError::UnexpectedValues(req.operator.clone()));
                }
            }
            other => return Err(SelectorError::UnknownLabelOperator(other.to_string())),
        }
    }

    let labels_ok = selector.match_labels.iter().all(|(k, v)| labels.get(k) == Some(v));
    let exprs_ok = selector.match_expressions.iter().all(|req| {
        let actual = labels.get(&req.key);
        match req.operator.as_str() {
            OP_IN => actual.map(|a| req.values.contains(a)).unwrap_or(false),
            OP_NOT_IN => actual.map(|a| !req.values.contains(a)).unwrap_or(true),
            OP_EXISTS => actual.is_some(),
            _ => actual.is_none(),
        }
    });
    Ok(labels_ok && exprs_ok)
}

/// Evaluate one field requirement. A path that does not exist satisfies only `DoesNotExist`.
pub fn matches_field(req: &FieldSelectorRequirement, candidate: &Json) -> Result<bool, SelectorError> {
    let actual = match jsonpath::evaluate(&req.key, candidate) {
        Ok(v) => Some(v),
        Err(e) if e.is_not_found() => None,
        Err(e) => {
            return Err(SelectorError::Field {
                key: req.key.clone(),
                operator: req.operator.clone(),
                values: req.values.clone(),
                source: e,
            })
        }
    };
    let present = actual.as_ref().map(|v| !v.is_null()).unwrap_or(false);
    let as_str = actual.as_ref().and_then(|v| v.as_str());
    match req.operator.as_str() {
        OP_IN => Ok(as_str.map(|s| req.values.iter().any(|v| v == s)).unwrap_or(false)),
        OP_NOT_IN => {
            if actual.is_none() {
                return Ok(false);
            }
            Ok(!as_str.map(|s| req.values.iter().any(|v| v == s)).unwrap_or(false))
        }
        OP_EXISTS => Ok(present),
        OP_DOES_NOT_EXIST => Ok(!present),
        other => Err(SelectorError::UnknownFieldOperator(other.to_string())),
    }
}

fn matches_all_fields(reqs: &[FieldSelectorRequirement], candidate: &Json) -> Result<bool, SelectorError> {
    for req in reqs {
        if !matches_field(req, candidate)? {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Indices of the selectors that match `candidate` with the highest specificity.
///
/// A selector scoring zero (empty) never matches.
pub fn best_selector_match_indices(candidate: &Json, selectors: &[Selector]) -> Result<Vec<usize>, MatchError> {
    let labels = labels_of(candidate);
    let mut best: Vec<usize> = Vec::new();
    let mut high_water = 1usize;

    for (idx, selector) in selectors.iter().enumerate() {
        let labels_match = matches_labels(selector, &labels).map_err(|source| MatchError {
            index: idx,
            message: "selector labels or matchExpressions are not valid",
            source,
        })?;
        if !labels_match {
            continue;
        }
        let fields_match = matches_all_fields(&selector.match_fields, candidate).map_err(|source| MatchError {
            index: idx,
            message: "failed to evaluate selector matchFields",
            source,
        })?;
        if !fields_match {
            continue;
        }

        let score = selector.specificity();
        if score == high_water {
            best.push(idx);
        } else if score > high_water {
            high_water = score;
            best = vec![idx];
        }
    }
    Ok(best)
}

fn validate_label_key(key: &str) -> Result<(), SelectorError> {
    let (prefix, name) = match key.split_once('/') {
        Some((p, n)) => (Some(p), n),
        None => (None, key),
    };
    let prefix_ok = prefix
        .map(|p| !p.is_empty() && p.len() <= 253 && p.split('.').all(is_dns_label))
        .unwrap_or(true);
    if !prefix_ok || !is_label_name(name) {
        return Err(SelectorError::InvalidLabelKey(key.to_string()));
    }
    Ok(())
}

fn validate_label_value(key: &str, value: &str) -> Result<(), SelectorError> {
    if value.is_empty() || is_label_name(value) {
        Ok(())
    } else {
        Err(SelectorError::InvalidLabelValue { key: key.to_string(), value: value.to_string() })
    }
}

fn is_label_name(s: &str) -> bool {
    let bytes = s.as_bytes();
    !s.is_empty()
        && s.len() <= 63
        && bytes[0].is_ascii_alphanumeric()
        && bytes[bytes.len() - 1].is_ascii_alphanumeric()
        && bytes.iter().all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'))
}

fn is_dns_label(s: &str) -> bool {
    let bytes = s.as_bytes();
    !s.is_empty()
        && s.len() <= 63
        && bytes[0].is_ascii_alphanumeric()
        && bytes[bytes.len() - 1].is_ascii_alphanumeric()
        && bytes.iter().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || *b == b'-')
}

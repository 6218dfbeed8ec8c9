//! `$(expr)$` tag interpolation over JSON template bodies.
//!
//! A string leaf that is exactly one tag is replaced by the native value the tag evaluates to;
//! any other leaf containing tags becomes a string with each tag rendered in place (strings
//! verbatim, everything else JSON-encoded). Values produced by a tag are interpolated again, so
//! a tag may resolve to another tag. Object keys are never interpolated.

use std::fmt::Write as _;

use carto_eval::{jsonpath, JsonPathError};
use serde_json::Value as Json;
use thiserror::Error;

const OPEN: &str = "$(";
const CLOSE: &str = ")$";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InterpolateError {
    #[error("failed to interpolate template at path [{path}]: empty tag")]
    EmptyTag { path: String },
    #[error("failed to interpolate template at path [{path}]: unterminated tag in [{leaf}]")]
    UnterminatedTag { path: String, leaf: String },
    #[error("failed to interpolate template at path [{path}]: evaluate tag $({expression})$: {source}")]
    EvaluateTag {
        path: String,
        expression: String,
        #[source]
        source: JsonPathError,
    },
    #[error("failed to interpolate template at path [{path}]: tag must not point to nil value: {expression}")]
    NilTag { path: String, expression: String },
    #[error("failed to interpolate template at path [{path}]: infinite tag loop detected: {chain}")]
    InfiniteTagLoop { path: String, chain: String },
}

impl InterpolateError {
    /// The tag expression that failed, when one is known.
    pub fn expression(&self) -> Option<&str> {
        match self {
            InterpolateError::EvaluateTag { expression, .. } | InterpolateError::NilTag { expression, .. } => Some(expression),
            _ => None,
        }
    }
}

/// Interpolate every string leaf of `body` against `context`.
pub fn interpolate(body: &Json, context: &Json) -> Result<Json, InterpolateError> {
    Interpolator { context, expanding: Vec::new() }.value(body, &mut PathStack::default())
}

#[derive(Debug, Default)]
struct PathStack(Vec<PathPart>);

#[derive(Debug)]
enum PathPart {
    Key(String),
    Index(usize),
}

impl PathStack {
    fn render(&self) -> String {
        let mut out = String::new();
        for part in &self.0 {
            match part {
                PathPart::Key(k) => {
                    if !out.is_empty() {
                        out.push('.');
                    }
                    out.push_str(k);
                }
                PathPart::Index(i) => {
                    let _ = write!(out, "[{i}]");
                }
            }
        }
        out
    }
}

#[derive(Debug, PartialEq)]
enum Piece<'a> {
    Text(&'a str),
    Tag(&'a str),
}

/// Split a leaf into literal text and tag expressions.
fn scan(leaf: &str) -> Result<Vec<Piece<'_>>, ()> {
    let mut pieces = Vec::new();
    let mut rest = leaf;
    while let Some(start) = rest.find(OPEN) {
        if start > 0 {
            pieces.push(Piece::Text(&rest[..start]));
        }
        let after = &rest[start + OPEN.len()..];
        let end = after.find(CLOSE).ok_or(())?;
        pieces.push(Piece::Tag(&after[..end]));
        rest = &after[end + CLOSE.len()..];
    }
    if !rest.is_empty() {
        pieces.push(Piece::Text(rest));
    }
    Ok(pieces)
}

struct Interpolator<'a> {
    context: &'a Json,
    /// Tag expressions currently being expanded, outermost first.
    expanding: Vec<String>,
}

impl Interpolator<'_> {
    fn value(&mut self, value: &Json, path: &mut PathStack) -> Result<Json, InterpolateError> {
        match value {
            Json::String(s) => self.leaf(s, path),
            Json::Object(map) => {
                let mut out = serde_json::Map::with_capacity(map.len());
                for (k, v) in map {
                    path.0.push(PathPart::Key(k.clone()));
                    let stamped = self.value(v, path)?;
                    path.0.pop();
                    out.insert(k.clone(), stamped);
                }
                Ok(Json::Object(out))
            }
            Json::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for (i, v) in items.iter().enumerate() {
                    path.0.push(PathPart::Index(i));
                    let stamped = self.value(v, path)?;
                    path.0.pop();
                    out.push(stamped);
                }
                Ok(Json::Array(out))
            }
            other => Ok(other.clone()),
        }
    }

    fn leaf(&mut self, leaf: &str, path: &mut PathStack) -> Result<Json, InterpolateError> {
        let pieces = scan(leaf).map_err(|_| InterpolateError::UnterminatedTag { path: path.render(), leaf: leaf.to_string() })?;
        match pieces.as_slice() {
            [] => Ok(Json::String(String::new())),
            [Piece::Tag(expr)] => self.tag(expr, path),
            _ if pieces.iter().all(|p| matches!(p, Piece::Text(_))) => Ok(Json::String(leaf.to_string())),
            _ => {
                let mut out = String::new();
                for piece in pieces {
                    match piece {
                        Piece::Text(t) => out.push_str(t),
                        Piece::Tag(expr) => match self.tag(expr, path)? {
                            Json::String(s) => out.push_str(&s),
                            other => out.push_str(&other.to_string()),
                        },
                    }
                }
                Ok(Json::String(out))
            }
        }
    }

    fn tag(&mut self, expr: &str, path: &mut PathStack) -> Result<Json, InterpolateError> {
        let expr = expr.trim();
        if expr.is_empty() {
            return Err(InterpolateError::EmptyTag { path: path.render() });
        }
        if self.expanding.iter().any(|e| e == expr) {
            let mut chain = self.expanding.clone();
            chain.push(expr.to_string());
            return Err(InterpolateError::InfiniteTagLoop { path: path.render(), chain: chain.join(" -> ") });
        }
        let found = jsonpath::evaluate(expr, self.context).map_err(|source| InterpolateError::EvaluateTag {
            path: path.render(),
            expression: expr.to_string(),
            source,
        })?;
        if found.is_null() {
            return Err(InterpolateError::NilTag { path: path.render(), expression: expr.to_string() });
        }

        self.expanding.push(expr.to_string());
        let expanded = self.value(&found, path);
        self.expanding.pop();
        expanded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> Json {
        json!({
            "workload": { "metadata": { "name": "petclinic" }, "spec": { "replicas": 2 } },
            "params": { "port": 8080, "labels": { "tier": "web" }, "host": "example.com" }
        })
    }

    #[test]
    fn no_tags_is_identity() {
        let body = json!({ "a": ["x", 1, true, null, { "b": "plain $ text (not a tag)" }] });
        assert_eq!(interpolate(&body, &ctx()).unwrap(), body);
    }

    #[test]
    fn single_tag_keeps_native_type() {
        let body = json!({ "port": "$(params.port)$", "labels": "$(params.labels)$", "name": "$(workload.metadata.name)$" });
        assert_eq!(
            interpolate(&body, &ctx()).unwrap(),
            json!({ "port": 8080, "labels": { "tier": "web" }, "name": "petclinic" })
        );
    }

    #[test]
    fn multiple_tags_join_as_string() {
        let body = json!("http://$(params.host)$:$(params.port)$/ $(params.labels)$");
        assert_eq!(
            interpolate(&body, &ctx()).unwrap(),
            json!("http://example.com:8080/ {\"tier\":\"web\"}")
        );
    }

    #[test]
    fn keys_are_not_interpolated() {
        let body = json!({ "$(params.host)$": "x" });
        assert_eq!(interpolate(&body, &ctx()).unwrap(), body);
    }

    #[test]
    fn tags_resolving_to_tags_are_expanded() {
        let ctx = json!({ "params": { "a": "$(params.b)$", "b": { "deep": "$(params.c)$-x" }, "c": 3 } });
        assert_eq!(interpolate(&json!("$(params.a)$"), &ctx).unwrap(), json!({ "deep": "3-x" }));
    }

    #[test]
    fn loops_are_detected() {
        let ctx = json!({ "params": { "a": "$(params.b)$", "b": "$(params.a)$" } });
        let err = interpolate(&json!({ "spec": ["$(params.a)$"] }), &ctx).unwrap_err();
        match err {
            InterpolateError::InfiniteTagLoop { path, chain } => {
                assert_eq!(path, "spec[0]");
                assert_eq!(chain, "params.a -> params.b -> params.a");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn repeated_tag_in_one_leaf_is_not_a_loop() {
        let out = interpolate(&json!("$(params.port)$/$(params.port)$"), &ctx()).unwrap();
        assert_eq!(out, json!("8080/8080"));
    }

    #[test]
    fn malformed_tags() {
        assert!(matches!(interpolate(&json!("$()$"), &ctx()), Err(InterpolateError::EmptyTag { .. })));
        assert!(matches!(interpolate(&json!("x $(params.port"), &ctx()), Err(InterpolateError::UnterminatedTag { .. })));
        let err = interpolate(&json!({ "a": "$(params.missing)$" }), &ctx()).unwrap_err();
        assert_eq!(err.expression(), Some("params.missing"));
        assert!(err.to_string().starts_with("failed to interpolate template at path [a]"));

        let nil = json!({ "params": { "gone": null } });
        assert!(matches!(interpolate(&json!("$(params.gone)$"), &nil), Err(InterpolateError::NilTag { .. })));
    }
}

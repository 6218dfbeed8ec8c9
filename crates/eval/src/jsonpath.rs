//! A small JSONPath dialect over `serde_json::Value`.
//!
//! Supported: `.field`, `['quoted.field']`, `[n]` (negative counts from the end), `*` / `[*]`,
//! `..field` (recursive descent) and filters `[?(@.k=="v")]`, `[?(@.k!=1)]`, `[?(@.k)]`.
//! Expressions may be written as `a.b`, `.a.b` or `{.a.b}`; all are normalized to the braced form.

use serde_json::Value as Json;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JsonPathError {
    /// The expression is well formed but selects nothing. Selectors treat this as "no match".
    #[error("jsonpath returned empty list: {0}")]
    NotFound(String),
    #[error("too many results for the query: {0}")]
    TooManyResults(String),
    #[error("empty jsonpath not allowed")]
    Empty,
    #[error("failed to parse jsonpath '{expr}': {reason}")]
    Parse { expr: String, reason: String },
}

impl JsonPathError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, JsonPathError::NotFound(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Field(String),
    Wildcard,
    Index(i64),
    Recursive(String),
    Filter(Filter),
}

#[derive(Debug, Clone, PartialEq)]
struct Filter {
    path: Vec<Segment>,
    cmp: Option<(CmpOp, Json)>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// A parsed expression, reusable across objects.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonPath {
    expr: String,
    segments: Vec<Segment>,
}

/// Wrap an expression into the braced `{.a.b}` form.
pub fn normalize(expr: &str) -> String {
    let mut out = if expr.starts_with("{.") {
        expr.to_string()
    } else if expr.starts_with('.') {
        format!("{{{}", expr)
    } else {
        format!("{{.{}", expr)
    };
    if !out.ends_with('}') {
        out.push('}');
    }
    out
}

/// Evaluate `expr` against `obj`, requiring exactly one result.
pub fn evaluate(expr: &str, obj: &Json) -> Result<Json, JsonPathError> {
    JsonPath::parse(expr)?.evaluate(obj)
}

/// Check an expression parses without evaluating it.
pub fn validate(expr: &str) -> Result<(), JsonPathError> {
    JsonPath::parse(expr).map(|_| ())
}

impl JsonPath {
    pub fn parse(expr: &str) -> Result<Self, JsonPathError> {
        if expr.is_empty() {
            return Err(JsonPathError::Empty);
        }
        let wrapped = normalize(expr);
        let inner = &wrapped[1..wrapped.len() - 1];
        let chars: Vec<char> = inner.chars().collect();
        let mut pos = 0usize;
        let segments = parse_segments(&chars, &mut pos, false).map_err(|reason| JsonPathError::Parse {
            expr: wrapped.clone(),
            reason,
        })?;
        Ok(Self { expr: expr.to_string(), segments })
    }

    pub fn expression(&self) -> &str {
        &self.expr
    }

    /// All values selected by the expression, in document order.
    pub fn find<'a>(&self, obj: &'a Json) -> Vec<&'a Json> {
        walk(&self.segments, obj)
    }

    pub fn evaluate(&self, obj: &Json) -> Result<Json, JsonPathError> {
        let found = self.find(obj);
        match found.len() {
            0 => Err(JsonPathError::NotFound(self.expr.clone())),
            1 => Ok(found[0].clone()),
            _ => Err(JsonPathError::TooManyResults(self.expr.clone())),
        }
    }
}

fn unrecognized(c: char) -> String {
    format!("unrecognized character in action: U+{:04X} '{}'", c as u32, c)
}

/// Parse segments starting at `pos`. Inside a filter (`nested`), parsing stops at the first
/// character that cannot continue a path (comparison operators, closing paren, whitespace).
fn parse_segments(chars: &[char], pos: &mut usize, nested: bool) -> Result<Vec<Segment>, String> {
    let mut segments = Vec::new();
    while *pos < chars.len() {
        match chars[*pos] {
            '.' => {
                *pos += 1;
                if *pos < chars.len() && chars[*pos] == '.' {
                    *pos += 1;
                    let name = read_name(chars, pos);
                    if name.is_empty() {
                        return Err("missing field name after '..'".to_string());
                    }
                    segments.push(Segment::Recursive(name));
                    continue;
                }
                let name = read_name(chars, pos);
                match name.as_str() {
                    "" => {
                        // bare "." addresses the current node
                        if *pos < chars.len() && chars[*pos] != '[' && !nested {
                            return Err(unrecognized(chars[*pos]));
                        }
                    }
                    "*" => segments.push(Segment::Wildcard),
                    _ => segments.push(Segment::Field(name)),
                }
            }
            '[' => {
                let close = find_closing_bracket(chars, *pos).ok_or_else(|| "unterminated array".to_string())?;
                let body: String = chars[*pos + 1..close].iter().collect();
                segments.push(parse_bracket(body.trim())?);
                *pos = close + 1;
            }
            _ if nested => break,
            c => return Err(unrecognized(c)),
        }
    }
    Ok(segments)
}

fn read_name(chars: &[char], pos: &mut usize) -> String {
    let mut name = String::new();
    while *pos < chars.len() {
        let c = chars[*pos];
        if c == '\\' && *pos + 1 < chars.len() {
            name.push(chars[*pos + 1]);
            *pos += 2;
            continue;
        }
        if matches!(c, '.' | '[' | ']' | '(' | ')' | '{' | '}' | '=' | '!' | '<' | '>') || c.is_whitespace() {
            break;
        }
        name.push(c);
        *pos += 1;
    }
    name
}

fn find_closing_bracket(chars: &[char], open: usize) -> Option<usize> {
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    for (i, c) in chars.iter().enumerate().skip(open) {
        match quote {
            Some(q) => {
                if *c == q {
                    quote = None;
                }
            }
            None => match c {
                '\'' | '"' => quote = Some(*c),
                '[' => depth += 1,
                ']' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(i);
                    }
                }
                _ => {}
            },
        }
    }
    None
}

fn parse_bracket(body: &str) -> Result<Segment, String> {
    if body == "*" {
        return Ok(Segment::Wildcard);
    }
    if let Some(rest) = body.strip_prefix("?(") {
        let inner = rest.strip_suffix(')').ok_or_else(|| "unclosed filter expression".to_string())?;
        return parse_filter(inner.trim()).map(Segment::Filter);
    }
    if let Some(name) = unquote(body) {
        return Ok(Segment::Field(name));
    }
    if let Ok(idx) = body.parse::<i64>() {
        return Ok(Segment::Index(idx));
    }
    match body.chars().next() {
        Some(c) => Err(unrecognized(c)),
        None => Err("empty array subscript".to_string()),
    }
}

fn unquote(s: &str) -> Option<String> {
    let bytes = s.as_bytes();
    if s.len() >= 2 {
        let (first, last) = (bytes[0], bytes[s.len() - 1]);
        if (first == b'\'' || first == b'"') && first == last {
            return Some(s[1..s.len() - 1].to_string());
        }
    }
    None
}

fn parse_filter(expr: &str) -> Result<Filter, String> {
    let chars: Vec<char> = expr.chars().collect();
    if chars.first() != Some(&'@') {
        return Err(format!("filter must start with '@': {}", expr));
    }
    let mut pos = 1usize;
    let path = parse_segments(&chars, &mut pos, true)?;
    let rest: String = chars[pos..].iter().collect();
    let rest = rest.trim();
    if rest.is_empty() {
        return Ok(Filter { path, cmp: None });
    }
    let (op, literal) = if let Some(v) = rest.strip_prefix("==") {
        (CmpOp::Eq, v)
    } else if let Some(v) = rest.strip_prefix("!=") {
        (CmpOp::Ne, v)
    } else if let Some(v) = rest.strip_prefix("<=") {
        (CmpOp::Le, v)
    } else if let Some(v) = rest.strip_prefix(">=") {
        (CmpOp::Ge, v)
    } else if let Some(v) = rest.strip_prefix('<') {
        (CmpOp::Lt, v)
    } else if let Some(v) = rest.strip_prefix('>') {
        (CmpOp::Gt, v)
    } else {
        let c = rest.chars().next().unwrap_or(' ');
        return Err(unrecognized(c));
    };
    Ok(Filter { path, cmp: Some((op, parse_literal(literal.trim())?)) })
}

fn parse_literal(s: &str) -> Result<Json, String> {
    if let Some(text) = unquote(s) {
        return Ok(Json::String(text));
    }
    match s {
        "true" => return Ok(Json::Bool(true)),
        "false" => return Ok(Json::Bool(false)),
        "null" => return Ok(Json::Null),
        _ => {}
    }
    serde_json::from_str::<serde_json::Number>(s)
        .map(Json::Number)
        .map_err(|_| format!("invalid filter literal: {}", s))
}

fn walk<'a>(segments: &[Segment], root: &'a Json) -> Vec<&'a Json> {
    let mut current = vec![root];
    for seg in segments {
        let mut next = Vec::new();
        for node in current {
            apply(seg, node, &mut next);
        }
        current = next;
        if current.is_empty() {
            break;
        }
    }
    current
}

fn apply<'a>(seg: &Segment, node: &'a Json, out: &mut Vec<&'a Json>) {
    match seg {
        Segment::Field(name) => {
            if let Some(v) = node.as_object().and_then(|m| m.get(name)) {
                out.push(v);
            }
        }
        Segment::Wildcard => match node {
            Json::Object(m) => out.extend(m.values()),
            Json::Array(a) => out.extend(a.iter()),
            _ => {}
        },
        Segment::Index(idx) => {
            if let Some(arr) = node.as_array() {
                let len = arr.len() as i64;
                let i = if *idx < 0 { len + idx } else { *idx };
                if i >= 0 && i < len {
                    out.push(&arr[i as usize]);
                }
            }
        }
        Segment::Recursive(name) => collect_recursive(name, node, out),
        Segment::Filter(filter) => {
            let items: Vec<&Json> = match node {
                Json::Array(a) => a.iter().collect(),
                Json::Object(m) => m.values().collect(),
                _ => Vec::new(),
            };
            for item in items {
                if filter_matches(filter, item) {
                    out.push(item);
                }
            }
        }
    }
}

fn collect_recursive<'a>(name: &str, node: &'a Json, out: &mut Vec<&'a Json>) {
    match node {
        Json::Object(m) => {
            if let Some(v) = m.get(name) {
                out.push(v);
            }
            for v in m.values() {
                collect_recursive(name, v, out);
            }
        }
        Json::Array(a) => {
            for v in a {
                collect_recursive(name, v, out);
            }
        }
        _ => {}
    }
}

fn filter_matches(filter: &Filter, item: &Json) -> bool {
    let found = walk(&filter.path, item);
    match &filter.cmp {
        None => !found.is_empty(),
        Some((op, literal)) => found.iter().any(|v| compare(*op, v, literal)),
    }
}

fn compare(op: CmpOp, left: &Json, right: &Json) -> bool {
    match op {
        CmpOp::Eq => loosely_equal(left, right),
        CmpOp::Ne => !loosely_equal(left, right),
        _ => match (left.as_f64(), right.as_f64()) {
            (Some(l), Some(r)) => match op {
                CmpOp::Lt => l < r,
                CmpOp::Le => l <= r,
                CmpOp::Gt => l > r,
                CmpOp::Ge => l >= r,
                CmpOp::Eq | CmpOp::Ne => false,
            },
            _ => false,
        },
    }
}

fn loosely_equal(left: &Json, right: &Json) -> bool {
    match (left.as_f64(), right.as_f64()) {
        (Some(l), Some(r)) => l == r,
        _ => left == right,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj() -> Json {
        json!({
            "spec": { "source": { "git": { "url": "https://example.com/repo" } } },
            "status": {
                "conditions": [
                    { "type": "Ready", "status": "True" },
                    { "type": "Succeeded", "status": "False" }
                ]
            },
            "metadata": { "labels": { "carto.run/workload-name": "app" } },
            "data": { "none": null }
        })
    }

    #[test]
    fn normalizes_all_surface_forms() {
        assert_eq!(normalize("a.b"), "{.a.b}");
        assert_eq!(normalize(".a.b"), "{.a.b}");
        assert_eq!(normalize("{.a.b}"), "{.a.b}");
        for e in ["spec.source.git.url", ".spec.source.git.url", "{.spec.source.git.url}"] {
            assert_eq!(evaluate(e, &obj()).unwrap(), json!("https://example.com/repo"));
        }
    }

    #[test]
    fn filter_selects_single_condition() {
        let v = evaluate(r#".status.conditions[?(@.type=="Succeeded")].status"#, &obj()).unwrap();
        assert_eq!(v, json!("False"));
        let v = evaluate(".status.conditions[?(@.type=='Ready')].status", &obj()).unwrap();
        assert_eq!(v, json!("True"));
    }

    #[test]
    fn quoted_keys_and_indices() {
        assert_eq!(evaluate(".metadata.labels['carto.run/workload-name']", &obj()).unwrap(), json!("app"));
        assert_eq!(evaluate(".status.conditions[-1].type", &obj()).unwrap(), json!("Succeeded"));
    }

    #[test]
    fn missing_path_is_not_found() {
        let err = evaluate(".data.does-not-exist", &obj()).unwrap_err();
        assert!(err.is_not_found());
        let err = evaluate(".status.conditions[5]", &obj()).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn explicit_null_is_a_result() {
        assert_eq!(evaluate(".data.none", &obj()).unwrap(), Json::Null);
    }

    #[test]
    fn multiple_results_are_rejected() {
        let err = evaluate(".status.conditions[*].type", &obj()).unwrap_err();
        assert!(matches!(err, JsonPathError::TooManyResults(_)));
        assert!(err.to_string().contains("too many results"));
    }

    #[test]
    fn malformed_expressions() {
        let err = evaluate(".status.conditions[0", &obj()).unwrap_err();
        assert!(err.to_string().contains("unterminated array"), "{}", err);
        let err = evaluate(".spec.source}x", &obj()).unwrap_err();
        assert!(err.to_string().contains("unrecognized character"), "{}", err);
        assert_eq!(evaluate("", &obj()).unwrap_err(), JsonPathError::Empty);
    }

    #[test]
    fn recursive_descent() {
        assert_eq!(evaluate("..url", &obj()).unwrap(), json!("https://example.com/repo"));
    }
}

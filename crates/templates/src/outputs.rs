//! Canonical resource outputs and their digests.

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use sha2::{Digest, Sha256};

pub const PREVIEW_CHARACTER_LIMIT: usize = 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceOutput {
    pub url: Json,
    pub revision: Json,
}

/// What a realized resource hands to the resources after it.
#[derive(Debug, Clone, PartialEq)]
pub enum Output {
    Source(SourceOutput),
    Image(Json),
    Config(Json),
}

impl Output {
    /// Named values recorded on the owner status, in display order.
    pub fn entries(&self) -> Vec<(&'static str, &Json)> {
        match self {
            Output::Source(s) => vec![("url", &s.url), ("revision", &s.revision)],
            Output::Image(v) => vec![("image", v)],
            Output::Config(v) => vec![("config", v)],
        }
    }

    pub fn as_source(&self) -> Option<&SourceOutput> {
        match self {
            Output::Source(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_image(&self) -> Option<&Json> {
        match self {
            Output::Image(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_config(&self) -> Option<&Json> {
        match self {
            Output::Config(v) => Some(v),
            _ => None,
        }
    }
}

/// Compact JSON with object keys sorted at every level.
pub fn canonical_json(value: &Json) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Json, out: &mut String) {
    match value {
        Json::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, k) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Json::String(k.clone()).to_string());
                out.push(':');
                if let Some(v) = map.get(k) {
                    write_canonical(v, out);
                }
            }
            out.push('}');
        }
        Json::Array(items) => {
            out.push('[');
            for (i, v) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(v, out);
            }
            out.push(']');
        }
        other => out.push_str(&other.to_string()),
    }
}

/// `sha256:<hex>` over the canonical JSON encoding.
pub fn digest(value: &Json) -> String {
    let sum = Sha256::digest(canonical_json(value).as_bytes());
    let hex: String = sum.iter().map(|b| format!("{b:02x}")).collect();
    format!("sha256:{hex}")
}

/// Human-readable rendering capped at [`PREVIEW_CHARACTER_LIMIT`] characters.
pub fn preview(value: &Json) -> String {
    let text = match value {
        Json::String(s) => s.clone(),
        other => canonical_json(other),
    };
    text.chars().take(PREVIEW_CHARACTER_LIMIT).collect()
}

//! Finds the workflow JSON among an image's metadata fields.
//!
//! Fields are tried in a fixed priority order and the first one that parses
//! wins. A field that fails to decompress or parse is logged and skipped; it
//! never aborts the search.

use anyhow::{Context, Result};
use serde_json::{Map, Value};

use crate::metadata::MetadataMap;

/// Field names tried by the locator, in the order they are consulted.
pub const PROMPT_FIELD: &str = "prompt";
pub const WORKFLOW_FIELD: &str = "workflow";
pub const PARAMETERS_FIELD: &str = "parameters";
/// Fallback fields. Their values may wrap the workflow in a `prompt` key.
pub const TEXT_CHUNK_FIELDS: &[&str] = &["tEXt", "zTXt"];

const CLASS_TYPE_KEY: &str = "class_type";

/// Which fields a pipeline consults, and whether the text-chunk fallback runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocatorProfile {
    pub fields: &'static [&'static str],
    pub scan_text_chunks: bool,
}

impl LocatorProfile {
    /// `prompt`, `workflow`, then any `tEXt`/`zTXt` field holding a workflow.
    pub const EMBED: Self = Self {
        fields: &[PROMPT_FIELD, WORKFLOW_FIELD],
        scan_text_chunks: true,
    };

    /// `prompt`, `workflow`, `parameters`.
    pub const EXTRACT: Self = Self {
        fields: &[PROMPT_FIELD, WORKFLOW_FIELD, PARAMETERS_FIELD],
        scan_text_chunks: false,
    };
}

/// A workflow document and the field it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Located {
    /// Name of the metadata field that held the document.
    pub field: String,
    /// The parsed workflow document.
    pub document: Value,
    /// When the document was unwrapped from an object's `prompt` key, that object
    /// (still holding the original `prompt` value).
    pub envelope: Option<Map<String, Value>>,
}

impl Located {
    /// Serialize `document` the way it should be stored back into [`Located::field`].
    ///
    /// Unwrapped documents are put back under the envelope's `prompt` key so the
    /// envelope's other keys survive.
    pub fn field_text(&self, document: &Value) -> Result<String> {
        let value = match &self.envelope {
            Some(envelope) => {
                let mut envelope = envelope.clone();
                if let Some(slot) = envelope.get_mut(PROMPT_FIELD) {
                    *slot = document.clone();
                }
                Value::Object(envelope)
            }
            None => document.clone(),
        };
        serde_json::to_string(&value).context("Failed to serialize workflow JSON")
    }
}

/// Search `metadata` for a workflow document.
///
/// `label` names the file in log lines. Returns `None` when no field yields a
/// document.
pub fn locate(metadata: &MetadataMap, profile: &LocatorProfile, label: &str) -> Option<Located> {
    for &field in profile.fields {
        let Some(value) = metadata.get(field) else {
            continue;
        };
        let parsed = value
            .decode()
            .and_then(|text| parse_json(&text));
        match parsed {
            Ok(document) => {
                log::info!("Found workflow JSON in '{field}' for {label}");
                return Some(Located {
                    field: field.to_string(),
                    document,
                    envelope: None,
                });
            }
            Err(e) => log::warn!("'{field}' in {label} is not valid workflow JSON: {e:#}"),
        }
    }

    if profile.scan_text_chunks {
        return scan_text_chunks(metadata, label);
    }

    None
}

fn scan_text_chunks(metadata: &MetadataMap, label: &str) -> Option<Located> {
    for (name, value) in metadata.iter() {
        if !TEXT_CHUNK_FIELDS.contains(&name) {
            continue;
        }

        let parsed = match value.decode().and_then(|text| parse_json(&text)) {
            Ok(parsed) => parsed,
            Err(e) => {
                log::warn!("Skipping '{name}' in {label}: {e:#}");
                continue;
            }
        };

        match parsed {
            Value::Object(envelope) if envelope.contains_key(PROMPT_FIELD) => {
                let document = envelope.get(PROMPT_FIELD).cloned().unwrap_or(Value::Null);
                log::info!("Found workflow JSON under '{name}' and 'prompt' for {label}");
                return Some(Located {
                    field: name.to_string(),
                    document,
                    envelope: Some(envelope),
                });
            }
            Value::Object(map) if looks_like_workflow(&map) => {
                log::info!("Found direct workflow JSON under '{name}' for {label}");
                return Some(Located {
                    field: name.to_string(),
                    document: Value::Object(map),
                    envelope: None,
                });
            }
            _ => log::warn!(
                "'{name}' in {label} is JSON but does not look like a workflow"
            ),
        }
    }
    None
}

/// At least one value is an object with a `class_type` key.
fn looks_like_workflow(map: &Map<String, Value>) -> bool {
    map.values()
        .any(|v| v.as_object().is_some_and(|node| node.contains_key(CLASS_TYPE_KEY)))
}

fn parse_json(text: &str) -> Result<Value> {
    serde_json::from_str(text).context("Failed to parse JSON")
}

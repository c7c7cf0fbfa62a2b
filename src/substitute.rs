//! Literal text substitution over a workflow document.
//!
//! Two engines share the same rule semantics (exact, case-sensitive substring
//! replacement, rules applied in order):
//!
//! - [`substitute_structural`] walks the JSON tree and only rewrites string
//!   leaves. Keys, nesting, array order and non-string values never change.
//! - [`substitute_coarse`] rewrites the serialized text and parses it back. It
//!   also touches keys, and fails if a replacement breaks the JSON syntax.

use anyhow::{Context, Result};
use serde_json::Value;

use crate::config::{ReplacementRule, SubstitutionMode};

/// Apply `rules` to `document` in place using the chosen engine.
///
/// Returns the number of replacements made. In coarse mode a result that no
/// longer parses is discarded: `document` is left untouched and an error is
/// returned.
pub fn apply(
    document: &mut Value,
    rules: &[ReplacementRule],
    mode: SubstitutionMode,
) -> Result<usize> {
    match mode {
        SubstitutionMode::Structural => Ok(substitute_structural(document, rules)),
        SubstitutionMode::Coarse => {
            let (rewritten, count) = substitute_coarse(document, rules)?;
            *document = rewritten;
            Ok(count)
        }
    }
}

/// Whether any rule's `old` text occurs where `mode` would look for it.
///
/// Structural mode checks string leaves; coarse mode checks the serialized text.
pub fn mentions_any(
    document: &Value,
    rules: &[ReplacementRule],
    mode: SubstitutionMode,
) -> Result<bool> {
    match mode {
        SubstitutionMode::Structural => Ok(rules.iter().any(|r| leaf_contains(document, &r.old))),
        SubstitutionMode::Coarse => {
            let text = serialize(document)?;
            Ok(rules.iter().any(|r| text.contains(&r.old)))
        }
    }
}

fn leaf_contains(value: &Value, needle: &str) -> bool {
    match value {
        Value::String(s) => s.contains(needle),
        Value::Array(items) => items.iter().any(|v| leaf_contains(v, needle)),
        Value::Object(map) => map.values().any(|v| leaf_contains(v, needle)),
        Value::Null | Value::Bool(_) | Value::Number(_) => false,
    }
}

/// Rewrite every string leaf of `value` in place. Returns the replacement count.
pub fn substitute_structural(value: &mut Value, rules: &[ReplacementRule]) -> usize {
    match value {
        Value::String(s) => replace_all(s, rules),
        Value::Array(items) => items
            .iter_mut()
            .map(|v| substitute_structural(v, rules))
            .sum(),
        Value::Object(map) => map
            .values_mut()
            .map(|v| substitute_structural(v, rules))
            .sum(),
        Value::Null | Value::Bool(_) | Value::Number(_) => 0,
    }
}

fn replace_all(text: &mut String, rules: &[ReplacementRule]) -> usize {
    let mut count = 0;
    for rule in rules {
        let hits = text.matches(rule.old.as_str()).count();
        if hits > 0 {
            *text = text.replace(rule.old.as_str(), &rule.new);
            count += hits;
        }
    }
    count
}

/// Serialize `document`, replace over the whole text, and parse it back.
pub fn substitute_coarse(document: &Value, rules: &[ReplacementRule]) -> Result<(Value, usize)> {
    let mut text = serialize(document)?;
    let count = replace_all(&mut text, rules);
    let rewritten = serde_json::from_str(&text)
        .context("Replacement produced invalid JSON; coarse result discarded")?;
    Ok((rewritten, count))
}

/// Compact JSON with non-ASCII characters left unescaped.
fn serialize(document: &Value) -> Result<String> {
    serde_json::to_string(document).context("Failed to serialize workflow JSON")
}

//! Argument reference resolution
//!
//! A reference is either a plain variable name or a dotted path into nested
//! mappings (`config.template_key`). References that do not resolve are
//! passed through as the literal string.

use serde_json::Value as JsonValue;

use super::store::VariableStore;
use crate::types::Variables;

pub const PATH_SEPARATOR: char = '.';

/// Resolve a reference, falling back to the reference text itself
pub fn resolve(reference: &str, store: &VariableStore) -> JsonValue {
    lookup(reference, store.as_map())
        .cloned()
        .unwrap_or_else(|| JsonValue::String(reference.to_string()))
}

/// Look a reference up without the literal fallback
///
/// Returns `None` when a plain name is absent, or when any step of a dotted
/// path hits a missing key or a non-mapping value.
pub fn lookup<'a>(reference: &str, vars: &'a Variables) -> Option<&'a JsonValue> {
    if !reference.contains(PATH_SEPARATOR) {
        return vars.get(reference);
    }

    let mut keys = reference.split(PATH_SEPARATOR);
    let first = keys.next()?;
    let mut current = vars.get(first)?;
    for key in keys {
        current = current.as_object()?.get(key)?;
    }
    Some(current)
}

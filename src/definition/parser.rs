//! Statement parser
//!
//! Turns a raw document node (already decoded from YAML or JSON) into the
//! statement model. Argument strings are kept as-is; they are references
//! resolved at execution time, never evaluated here.

use serde_json::Value as JsonValue;

use super::model::{ActivityStatement, ParallelStatement, SequenceStatement, Statement};

/// Keys that select a statement variant; a node must carry exactly one
pub const STATEMENT_KEYS: [&str; 3] = ["activity", "sequence", "parallel"];

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseError {
    #[error("unknown statement type at {path}: expected exactly one of activity, sequence, parallel (found keys: [{}])", keys.join(", "))]
    UnknownStatementType { path: String, keys: Vec<String> },

    #[error("missing required field '{field}' at {path}")]
    MissingField { path: String, field: String },

    #[error("invalid field '{field}' at {path}: expected {expected}")]
    InvalidField {
        path: String,
        field: String,
        expected: String,
    },
}

/// Parse a raw statement node
pub fn parse_statement(raw: &JsonValue) -> Result<Statement, ParseError> {
    parse_at(raw, "root")
}

fn parse_at(raw: &JsonValue, path: &str) -> Result<Statement, ParseError> {
    let Some(node) = raw.as_object() else {
        return Err(ParseError::UnknownStatementType {
            path: path.to_string(),
            keys: Vec::new(),
        });
    };

    let present: Vec<&str> = STATEMENT_KEYS
        .iter()
        .copied()
        .filter(|key| node.contains_key(*key))
        .collect();

    match present.as_slice() {
        ["activity"] => parse_activity(&node["activity"], &format!("{path}.activity")),
        ["sequence"] => parse_sequence(&node["sequence"], &format!("{path}.sequence")),
        ["parallel"] => parse_parallel(&node["parallel"], &format!("{path}.parallel")),
        _ => Err(ParseError::UnknownStatementType {
            path: path.to_string(),
            keys: node.keys().cloned().collect(),
        }),
    }
}

fn parse_activity(raw: &JsonValue, path: &str) -> Result<Statement, ParseError> {
    let body = expect_mapping(raw, path)?;

    let name = match body.get("name") {
        None | Some(JsonValue::Null) => return Err(missing(path, "name")),
        Some(JsonValue::String(name)) if !name.trim().is_empty() => name.clone(),
        Some(_) => return Err(invalid(path, "name", "a non-empty string")),
    };

    let arguments = match body.get("arguments") {
        None | Some(JsonValue::Null) => Vec::new(),
        Some(JsonValue::Array(items)) => items
            .iter()
            .map(argument_reference)
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| invalid(path, "arguments", "a list of scalar references"))?,
        Some(_) => return Err(invalid(path, "arguments", "a list of scalar references")),
    };

    // An empty result name means the result is discarded
    let result_name = match body.get("result") {
        None | Some(JsonValue::Null) => None,
        Some(JsonValue::String(result)) if result.is_empty() => None,
        Some(JsonValue::String(result)) => Some(result.clone()),
        Some(_) => return Err(invalid(path, "result", "a string")),
    };

    Ok(Statement::Activity(ActivityStatement {
        name,
        arguments,
        result_name,
    }))
}

/// YAML happily decodes `- 10` as a number; references are strings, so
/// scalars are kept in their textual form.
fn argument_reference(item: &JsonValue) -> Option<String> {
    match item {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        JsonValue::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn parse_sequence(raw: &JsonValue, path: &str) -> Result<Statement, ParseError> {
    let elements = parse_children(raw, path, "elements")?;
    Ok(Statement::Sequence(SequenceStatement { elements }))
}

fn parse_parallel(raw: &JsonValue, path: &str) -> Result<Statement, ParseError> {
    let branches = parse_children(raw, path, "branches")?;
    Ok(Statement::Parallel(ParallelStatement { branches }))
}

fn parse_children(raw: &JsonValue, path: &str, field: &str) -> Result<Vec<Statement>, ParseError> {
    let body = expect_mapping(raw, path)?;

    let items = match body.get(field) {
        None | Some(JsonValue::Null) => return Err(missing(path, field)),
        Some(JsonValue::Array(items)) => items,
        Some(_) => return Err(invalid(path, field, "a list of statements")),
    };

    items
        .iter()
        .enumerate()
        .map(|(idx, item)| parse_at(item, &format!("{path}.{field}[{idx}]")))
        .collect()
}

fn expect_mapping<'a>(
    raw: &'a JsonValue,
    path: &str,
) -> Result<&'a serde_json::Map<String, JsonValue>, ParseError> {
    raw.as_object().ok_or_else(|| {
        let (parent, field) = path.rsplit_once('.').unwrap_or(("", path));
        invalid(parent, field, "a mapping")
    })
}

fn missing(path: &str, field: &str) -> ParseError {
    ParseError::MissingField {
        path: path.to_string(),
        field: field.to_string(),
    }
}

fn invalid(path: &str, field: &str, expected: &str) -> ParseError {
    ParseError::InvalidField {
        path: path.to_string(),
        field: field.to_string(),
        expected: expected.to_string(),
    }
}

#[cfg(test)]
#[path = "parser_tests.rs"]
mod tests;

//! Predicate evaluation against schema-less documents.
//!
//! A filter maps field names to either a literal (equality) or an operator
//! object such as `{"$in": [..]}` / `{"$nin": [..]}`. All fields must match.
//! Ranges, disjunctions and dotted paths are not supported.

use serde_json::Value;

use crate::document::{Document, Filter};

pub const IN: &str = "$in";
pub const NOT_IN: &str = "$nin";

/// How a missing or falsy document value is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Absence {
    /// `null`, `false`, `0`, `""`, `[]` and `{}` never satisfy equality or `$in`.
    Falsy,
    /// A missing field compares as `null`, like the document store does.
    Null,
}

/// Snapshot semantics: absent and falsy values are indistinguishable and never
/// match equality or `$in`.
pub fn matches(document: &Document, filter: &Filter) -> bool {
    evaluate(document, filter, Absence::Falsy)
}

/// Document-store semantics: a missing field equals `null`, and falsy values
/// compare like any other value.
pub fn matches_nullable(document: &Document, filter: &Filter) -> bool {
    evaluate(document, filter, Absence::Null)
}

pub fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
    }
}

fn evaluate(document: &Document, filter: &Filter, absence: Absence) -> bool {
    filter
        .iter()
        .all(|(field, predicate)| field_matches(document.get(field), predicate, absence))
}

fn field_matches(value: Option<&Value>, predicate: &Value, absence: Absence) -> bool {
    let present = match (absence, value) {
        (Absence::Falsy, Some(v)) if !is_falsy(v) => Some(v),
        (Absence::Falsy, _) => None,
        (Absence::Null, v) => Some(v.unwrap_or(&Value::Null)),
    };

    match operators(predicate) {
        Some(ops) => ops.iter().all(|(op, operand)| apply(op, operand, present, value)),
        None => present.map_or(false, |v| v == predicate),
    }
}

fn apply(op: &str, operand: &Value, present: Option<&Value>, raw: Option<&Value>) -> bool {
    let candidates = match operand.as_array() {
        Some(candidates) => candidates,
        None => return false,
    };
    match op {
        IN => present.map_or(false, |v| candidates.contains(v)),
        NOT_IN => !candidates.contains(raw.unwrap_or(&Value::Null)),
        _ => false,
    }
}

/// Returns the operator map if every key of `predicate` is a `$`-operator.
fn operators(predicate: &Value) -> Option<&serde_json::Map<String, Value>> {
    match predicate {
        Value::Object(map) if !map.is_empty() && map.keys().all(|k| k.starts_with('$')) => Some(map),
        _ => None,
    }
}

//! Schema-less documents and conversions to and from the typed entities.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::{Error, Result};

/// Field name → value mapping, the unit of storage in every table.
pub type Document = Map<String, Value>;

/// Predicate set: field name → literal or `{ "$op": operand }`.
pub type Filter = Document;

/// Key the transactional store uses for its own generated identifier.
pub const STORE_ID_KEY: &str = "_id";

/// Unwraps a `json!({...})` literal into a document. Non-object values yield
/// an empty document.
pub fn document(value: Value) -> Document {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

pub fn to_document<T: Serialize>(entity: &T) -> Result<Document> {
    match serde_json::to_value(entity)? {
        Value::Object(map) => Ok(map),
        other => Err(Error::InvalidState(format!(
            "Expected an object when converting to a document, got `{}`",
            other
        ))),
    }
}

pub fn from_document<T: DeserializeOwned>(mut document: Document) -> Result<T> {
    document.remove(STORE_ID_KEY);
    Ok(serde_json::from_value(Value::Object(document))?)
}

/// Parses an ISO-8601 timestamp. Values without an offset are taken as UTC.
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_document_drops_store_id() {
        let doc = document(json!({"_id": "abc", "status": "pending", "time_changed": "2024-01-01T00:00:00Z"}));
        let timestamp: crate::StatusTimestamp = from_document(doc).unwrap();
        assert_eq!(timestamp.status, crate::TaskStatus::Pending);
        assert_eq!(timestamp.desc, None);
    }

    #[test]
    fn test_parse_timestamp_variants() {
        let with_offset = parse_timestamp("2023-05-04T12:30:00+02:00").unwrap();
        assert_eq!(with_offset.to_rfc3339(), "2023-05-04T10:30:00+00:00");

        let naive = parse_timestamp("2023-05-04T12:30:00.123456").unwrap();
        assert_eq!(naive.timestamp_subsec_micros(), 123456);

        assert!(parse_timestamp("2023-05-04 12:30:00").is_some());
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn test_document_of_non_object_is_empty() {
        assert!(document(json!([1, 2])).is_empty());
    }
}

//! Document representation shared by the stores, history and migrations.

use serde_json::{Map, Value};

/// A schemaless document: top-level field name to JSON value.
pub type Document = Map<String, Value>;

/// Field holding the store-assigned document identity.
pub const ID_FIELD: &str = "_id";

/// Field holding the store-managed revision counter.
pub const REVISION_FIELD: &str = "__v";

/// Identity fields every store maintains on its own.
pub const DEFAULT_IDENTITY_FIELDS: [&str; 2] = [ID_FIELD, REVISION_FIELD];

/// Get the document id, if present.
///
/// Ids are always strings; stores reject any other `_id` on insert, so a
/// non-string value here is treated as absent.
pub fn document_id(doc: &Document) -> Option<String> {
    doc.get(ID_FIELD)?.as_str().map(str::to_string)
}

/// Return a copy of `doc` without the given fields.
pub fn without_fields(doc: &Document, fields: &[String]) -> Document {
    doc.iter()
        .filter(|(k, _)| !fields.iter().any(|f| f == *k))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Canonical serialized form of a value, used for byte-for-byte comparison.
pub fn canonical(value: &Value) -> String {
    value.to_string()
}

/// Build a document from a JSON object literal.
///
/// Non-object values produce an empty document.
pub fn from_value(value: Value) -> Document {
    match value {
        Value::Object(map) => map,
        _ => Document::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_document_id_variants() {
        assert_eq!(document_id(&from_value(json!({"_id": "a"}))), Some("a".to_string()));
        assert_eq!(document_id(&from_value(json!({"_id": 7}))), None);
        assert_eq!(document_id(&from_value(json!({"name": "x"}))), None);
    }

    #[test]
    fn test_without_fields() {
        let doc = from_value(json!({"_id": "a", "__v": 2, "name": "x"}));
        let stripped = without_fields(&doc, &["_id".to_string(), "__v".to_string()]);
        assert_eq!(Value::Object(stripped), json!({"name": "x"}));
    }
}

use serde_json::Value;

use crate::Document;

pub(crate) const T0: i64 = 1_700_000_000;

/// Builds a document from a `json!` object literal.
pub(crate) fn json_doc(value: Value) -> Document {
    Document::from_value(value).expect("test documents are JSON objects")
}

pub(crate) fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

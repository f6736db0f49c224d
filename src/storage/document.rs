use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

use super::parse_timestamp;
use crate::constants::BOOKKEEPING_FIELDS;
use crate::constants::FIELD_DELETED_AT;
use crate::constants::FIELD_EXTRACTED_AT;
use crate::constants::FIELD_IS_DELETED;
use crate::constants::FIELD_RECEIVED_AT;

/// Ordered field map carried by every record.
///
/// Fields are opaque except for a handful the engine reasons about:
/// deletion markers, business timestamps, the last-modifier identity and
/// the bookkeeping stamps written on every accepted write.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document(Map<String, Value>);

impl Document {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Accepts JSON objects only.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    pub fn get(
        &self,
        field: &str,
    ) -> Option<&Value> {
        self.0.get(field)
    }

    /// String value of `field`; `None` for missing, null or non-string values.
    pub fn get_str(
        &self,
        field: &str,
    ) -> Option<&str> {
        self.0.get(field).and_then(Value::as_str)
    }

    /// Non-empty identifier-like value of `field`.
    ///
    /// Strings are returned as-is, numbers in their JSON rendering.
    pub fn get_id(
        &self,
        field: &str,
    ) -> Option<String> {
        match self.0.get(field)? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    pub fn insert(
        &mut self,
        field: impl Into<String>,
        value: impl Into<Value>,
    ) -> Option<Value> {
        self.0.insert(field.into(), value.into())
    }

    pub fn remove(
        &mut self,
        field: &str,
    ) -> Option<Value> {
        self.0.remove(field)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    /// Soft-delete marker: any non-null value other than an empty string.
    pub fn deleted_at(&self) -> Option<&Value> {
        match self.0.get(FIELD_DELETED_AT)? {
            Value::Null => None,
            Value::String(s) if s.is_empty() => None,
            v => Some(v),
        }
    }

    pub fn is_deleted_flag(&self) -> bool {
        self.0.get(FIELD_IS_DELETED).and_then(Value::as_bool) == Some(true)
    }

    /// True when either deletion marker is set.
    pub fn is_deletion_marked(&self) -> bool {
        self.is_deleted_flag() || self.deleted_at().is_some()
    }

    /// Business timestamp stored under `field`, if it parses.
    pub fn timestamp(
        &self,
        field: &str,
    ) -> Option<DateTime<Utc>> {
        self.get_str(field).and_then(parse_timestamp)
    }

    pub fn last_modified_by(
        &self,
        field: &str,
    ) -> Option<&str> {
        self.get_str(field)
    }

    /// Field-wise equality, ignoring the bookkeeping stamps.
    pub fn same_content(
        &self,
        other: &Document,
    ) -> bool {
        let visible = |doc: &Document| {
            doc.0
                .iter()
                .filter(|(k, _)| !BOOKKEEPING_FIELDS.contains(&k.as_str()))
                .count()
        };
        if visible(self) != visible(other) {
            return false;
        }
        self.0
            .iter()
            .filter(|(k, _)| !BOOKKEEPING_FIELDS.contains(&k.as_str()))
            .all(|(k, v)| other.0.get(k) == Some(v))
    }

    /// Stamps the bookkeeping fields of an accepted write.
    pub(crate) fn stamp(
        &mut self,
        extracted_at: Option<&str>,
        received_at: String,
    ) {
        if let Some(extracted_at) = extracted_at {
            self.insert(FIELD_EXTRACTED_AT, extracted_at);
        }
        self.insert(FIELD_RECEIVED_AT, received_at);
    }
}

impl From<Map<String, Value>> for Document {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl FromIterator<(String, Value)> for Document {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

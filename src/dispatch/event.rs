//! Inbound change event shapes and canonical key derivation.
use bytes::Bytes;
use chrono::DateTime;
use chrono::SecondsFormat;
use chrono::Utc;
use serde::Deserialize;
use serde_json::Map;
use serde_json::Value;

use crate::constants::COMPOSITE_KEY_SEPARATOR;
use crate::constants::KEY_DELIMITER;
use crate::constants::KV_OPERATION_HEADER;
use crate::Delivery;
use crate::DispatchError;
use crate::Document;

/// Upstream feeding a consumer pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventSource {
    /// Replicated key-value bucket watcher
    KeyWatch,
    /// Write-ahead-log change stream
    LogChange,
    /// Table change stream
    TableStream,
}

impl EventSource {
    pub fn label(self) -> &'static str {
        match self {
            EventSource::KeyWatch => "key_watch",
            EventSource::LogChange => "log_change",
            EventSource::TableStream => "table_stream",
        }
    }
}

/// What the store should do with an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionClass {
    Upsert,
    SoftDelete,
    Ignore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KvOperation {
    Put,
    Delete,
    Purge,
}

#[derive(Debug, Clone, PartialEq)]
pub struct KeyWatchEvent {
    pub key: String,
    pub operation: KvOperation,
    pub value: Bytes,
}

impl KeyWatchEvent {
    const KIND: &'static str = "key-watch";

    /// Decodes a bucket watch message. The subject is `$KV.{bucket}.{key}`;
    /// the operation header is absent for puts.
    pub fn from_delivery(delivery: &dyn Delivery) -> Result<Self, DispatchError> {
        let subject = delivery.subject();
        let key = subject
            .strip_prefix("$KV.")
            .and_then(|rest| rest.split_once(KEY_DELIMITER))
            .map(|(_bucket, key)| key)
            .ok_or_else(|| DispatchError::Decode {
                kind: Self::KIND,
                reason: format!("unexpected subject {subject}"),
            })?;
        if key.is_empty() {
            return Err(DispatchError::Validation {
                kind: Self::KIND,
                field: "key".to_string(),
            });
        }

        let operation = match delivery.header(KV_OPERATION_HEADER) {
            None | Some("") | Some("PUT") => KvOperation::Put,
            Some("DEL") => KvOperation::Delete,
            Some("PURGE") => KvOperation::Purge,
            Some(other) => {
                return Err(DispatchError::Decode {
                    kind: Self::KIND,
                    reason: format!("unknown operation {other}"),
                })
            }
        };

        Ok(Self {
            key: key.to_string(),
            operation,
            value: Bytes::copy_from_slice(delivery.payload()),
        })
    }

    /// Key up to the first delimiter; the whole key when there is none.
    pub fn prefix(&self) -> &str {
        key_prefix(&self.key)
    }
}

pub fn key_prefix(key: &str) -> &str {
    key.split_once(KEY_DELIMITER).map_or(key, |(prefix, _)| prefix)
}

/// Row change emitted by the write-ahead-log listener
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct LogChangeEvent {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub schema: String,
    #[serde(default)]
    pub table: String,
    #[serde(default)]
    pub action: String,
    /// New row image; empty for deletes
    #[serde(default)]
    pub data: Option<Document>,
    /// Previous row image, used by deletes
    #[serde(default, rename = "dataOld")]
    pub data_old: Option<Document>,
    #[serde(default, rename = "commitTime")]
    pub commit_time: Option<String>,
}

impl LogChangeEvent {
    const KIND: &'static str = "log-change";

    pub fn decode(bytes: &[u8]) -> Result<Self, DispatchError> {
        let event: Self = serde_json::from_slice(bytes).map_err(|e| DispatchError::Decode {
            kind: Self::KIND,
            reason: e.to_string(),
        })?;
        for (field, value) in [("schema", &event.schema), ("table", &event.table), ("action", &event.action)] {
            if value.is_empty() {
                return Err(DispatchError::Validation {
                    kind: Self::KIND,
                    field: field.to_string(),
                });
            }
        }
        Ok(event)
    }

    /// Case-insensitive action match
    pub fn action_class(&self) -> ActionClass {
        match self.action.to_ascii_uppercase().as_str() {
            "INSERT" | "UPDATE" => ActionClass::Upsert,
            "DELETE" => ActionClass::SoftDelete,
            _ => ActionClass::Ignore,
        }
    }

    /// Row image the event is about: the old image for deletes
    pub fn image(&self) -> Option<&Document> {
        match self.action_class() {
            ActionClass::SoftDelete => self.data_old.as_ref(),
            _ => self.data.as_ref(),
        }
    }

    /// `{schema}-{table}.{primary key}`
    pub fn store_key(
        &self,
        primary_key_field: &str,
    ) -> Result<String, DispatchError> {
        let id = self
            .image()
            .and_then(|image| image.get_id(primary_key_field))
            .ok_or_else(|| DispatchError::Validation {
                kind: Self::KIND,
                field: primary_key_field.to_string(),
            })?;
        Ok(format!("{}-{}{}{}", self.schema, self.table, KEY_DELIMITER, id))
    }
}

/// Item change emitted by the table stream publisher
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TableStreamEvent {
    #[serde(default)]
    pub event_id: String,
    #[serde(default)]
    pub event_name: String,
    #[serde(default)]
    pub table_name: String,
    #[serde(default)]
    pub sequence_number: String,
    #[serde(default)]
    pub approximate_creation_time: Option<DateTime<Utc>>,
    /// Primary key attributes only
    #[serde(default)]
    pub keys: Map<String, Value>,
    #[serde(default)]
    pub new_image: Option<Document>,
    #[serde(default)]
    pub old_image: Option<Document>,
}

impl TableStreamEvent {
    const KIND: &'static str = "table-stream";

    pub fn decode(bytes: &[u8]) -> Result<Self, DispatchError> {
        let event: Self = serde_json::from_slice(bytes).map_err(|e| DispatchError::Decode {
            kind: Self::KIND,
            reason: e.to_string(),
        })?;
        if event.table_name.is_empty() {
            return Err(event.missing("table_name"));
        }
        if event.event_name.is_empty() {
            return Err(event.missing("event_name"));
        }
        if event.keys.is_empty() {
            return Err(event.missing("keys"));
        }
        Ok(event)
    }

    pub fn action_class(&self) -> ActionClass {
        match self.event_name.to_ascii_uppercase().as_str() {
            "INSERT" | "MODIFY" => ActionClass::Upsert,
            "REMOVE" => ActionClass::SoftDelete,
            _ => ActionClass::Ignore,
        }
    }

    /// `{table}.{v1#v2#...}` with key values ordered by attribute name, so
    /// attribute order in the source payload never changes the key.
    pub fn store_key(&self) -> String {
        let mut names: Vec<&String> = self.keys.keys().collect();
        names.sort();
        let parts: Vec<String> = names
            .into_iter()
            .map(|name| match &self.keys[name.as_str()] {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect();
        format!("{}{}{}", self.table_name, KEY_DELIMITER, parts.join(COMPOSITE_KEY_SEPARATOR))
    }

    /// Creation time in RFC 3339, used as the source commit time
    pub fn creation_time(&self) -> Option<String> {
        self.approximate_creation_time
            .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
    }

    pub(crate) fn missing(
        &self,
        field: &str,
    ) -> DispatchError {
        DispatchError::Validation {
            kind: Self::KIND,
            field: field.to_string(),
        }
    }
}

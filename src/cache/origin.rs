use std::time::Duration;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde_json::Value;
use tracing::debug;

use crate::OriginError;

/// External service resolving an identifier to a JSON record
#[cfg_attr(test, automock)]
#[async_trait]
pub trait OriginFetcher: Send + Sync + 'static {
    async fn fetch(
        &self,
        id: &str,
    ) -> std::result::Result<Value, OriginError>;
}

/// Origin reached over HTTP: `GET {base_url}{id}` returning a JSON object.
///
/// Authentication is expected to be handled by the client passed in.
#[derive(Debug, Clone)]
pub struct HttpOrigin {
    client: reqwest::Client,
    base_url: String,
    required_field: String,
}

impl HttpOrigin {
    pub fn new(
        base_url: impl Into<String>,
        required_field: impl Into<String>,
        timeout: Duration,
    ) -> std::result::Result<Self, OriginError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, base_url, required_field))
    }

    pub fn with_client(
        client: reqwest::Client,
        base_url: impl Into<String>,
        required_field: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            required_field: required_field.into(),
        }
    }

    pub fn url_for(
        &self,
        id: &str,
    ) -> String {
        format!("{}{}", self.base_url, id)
    }
}

#[async_trait]
impl OriginFetcher for HttpOrigin {
    async fn fetch(
        &self,
        id: &str,
    ) -> std::result::Result<Value, OriginError> {
        let url = self.url_for(id);
        debug!(id, %url, "fetching from origin");

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        let body = response.bytes().await?;
        if !status.is_success() {
            return Err(OriginError::Status {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        let record: Value = serde_json::from_slice(&body).map_err(|e| OriginError::InvalidData {
            id: id.to_string(),
            reason: e.to_string(),
        })?;
        validate_record(id, record, &self.required_field)
    }
}

/// Accepts JSON objects whose `required_field` is a non-empty string.
pub fn validate_record(
    id: &str,
    record: Value,
    required_field: &str,
) -> std::result::Result<Value, OriginError> {
    let invalid = |reason: String| OriginError::InvalidData {
        id: id.to_string(),
        reason,
    };
    let Some(object) = record.as_object() else {
        return Err(invalid("response is not a JSON object".to_string()));
    };
    let present = matches!(
        object.get(required_field).and_then(Value::as_str),
        Some(v) if !v.trim().is_empty()
    );
    if !present {
        return Err(invalid(format!("empty {required_field}")));
    }
    Ok(record)
}

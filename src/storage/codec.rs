use bytes::Bytes;
use serde::Deserialize;
use serde::Serialize;

use super::Document;
use crate::Result;
use crate::StorageError;

/// Serialization of stored documents
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadFormat {
    #[default]
    Json,
    Msgpack,
}

impl PayloadFormat {
    pub fn alternate(self) -> Self {
        match self {
            PayloadFormat::Json => PayloadFormat::Msgpack,
            PayloadFormat::Msgpack => PayloadFormat::Json,
        }
    }

    fn encode(
        self,
        doc: &Document,
    ) -> std::result::Result<Vec<u8>, String> {
        match self {
            PayloadFormat::Json => serde_json::to_vec(doc).map_err(|e| e.to_string()),
            PayloadFormat::Msgpack => rmp_serde::to_vec_named(doc).map_err(|e| e.to_string()),
        }
    }

    fn decode(
        self,
        bytes: &[u8],
    ) -> std::result::Result<Document, String> {
        match self {
            PayloadFormat::Json => serde_json::from_slice(bytes).map_err(|e| e.to_string()),
            PayloadFormat::Msgpack => rmp_serde::from_slice(bytes).map_err(|e| e.to_string()),
        }
    }
}

/// Writes in one format, reads any known format.
///
/// Decoders are tried in order, primary first; each attempt is independent,
/// so historical records written under the other format stay readable.
#[derive(Debug, Clone)]
pub struct PayloadCodec {
    decoders: Vec<PayloadFormat>,
}

impl PayloadCodec {
    pub fn new(primary: PayloadFormat) -> Self {
        Self {
            decoders: vec![primary, primary.alternate()],
        }
    }

    pub fn primary(&self) -> PayloadFormat {
        self.decoders[0]
    }

    pub fn encode(
        &self,
        doc: &Document,
    ) -> Result<Bytes> {
        let bytes = self.primary().encode(doc).map_err(StorageError::Encode)?;
        Ok(Bytes::from(bytes))
    }

    pub fn decode(
        &self,
        key: &str,
        bytes: &[u8],
    ) -> Result<Document> {
        let mut reasons = Vec::with_capacity(self.decoders.len());
        for format in &self.decoders {
            match format.decode(bytes) {
                Ok(doc) => return Ok(doc),
                Err(reason) => reasons.push(format!("{format:?}: {reason}")),
            }
        }
        Err(StorageError::Decode {
            key: key.to_string(),
            reason: reasons.join("; "),
        }
        .into())
    }
}

impl Default for PayloadCodec {
    fn default() -> Self {
        Self::new(PayloadFormat::default())
    }
}

use std::collections::HashMap;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;

use crate::constants::KV_OPERATION_HEADER;
use crate::Delivery;
use crate::Result;

/// Delivery recording how it was settled.
#[derive(Default)]
pub(crate) struct FakeDelivery {
    subject: String,
    headers: HashMap<String, String>,
    payload: Bytes,
    acks: AtomicUsize,
    naks: AtomicUsize,
}

impl FakeDelivery {
    pub(crate) fn new(
        subject: &str,
        payload: impl Into<Bytes>,
    ) -> Self {
        Self {
            subject: subject.to_string(),
            payload: payload.into(),
            ..Default::default()
        }
    }

    pub(crate) fn json(
        subject: &str,
        payload: &Value,
    ) -> Self {
        Self::new(subject, serde_json::to_vec(payload).expect("serializable"))
    }

    /// Key-watch put of a JSON record into `bucket`
    pub(crate) fn kv_put(
        bucket: &str,
        key: &str,
        record: &Value,
    ) -> Self {
        Self::json(&format!("$KV.{bucket}.{key}"), record)
    }

    /// Key-watch delete (`DEL`) or purge (`PURGE`)
    pub(crate) fn kv_op(
        bucket: &str,
        key: &str,
        operation: &str,
    ) -> Self {
        Self::new(&format!("$KV.{bucket}.{key}"), Bytes::new()).with_header(KV_OPERATION_HEADER, operation)
    }

    pub(crate) fn with_header(
        mut self,
        name: &str,
        value: &str,
    ) -> Self {
        self.headers.insert(name.to_string(), value.to_string());
        self
    }

    pub(crate) fn acks(&self) -> usize {
        self.acks.load(Ordering::SeqCst)
    }

    pub(crate) fn naks(&self) -> usize {
        self.naks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Delivery for FakeDelivery {
    fn subject(&self) -> &str {
        &self.subject
    }

    fn header(
        &self,
        name: &str,
    ) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    fn payload(&self) -> &[u8] {
        &self.payload
    }

    fn delivery_count(&self) -> u32 {
        1
    }

    async fn ack(&self) -> Result<()> {
        self.acks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn nak(&self) -> Result<()> {
        self.naks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

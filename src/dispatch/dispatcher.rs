use std::sync::Arc;

use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::trace;
use tracing::warn;

use super::ActionClass;
use super::EventSource;
use super::HandlerOutcome;
use super::HandlerRegistry;
use super::KeyWatchEvent;
use super::KvOperation;
use super::LogChangeEvent;
use super::TableStreamEvent;
use crate::metrics::DISPATCH_OUTCOMES;
use crate::utils::time::now_rfc3339;
use crate::Delivery;
use crate::DispatchConfig;
use crate::DispatchError;
use crate::Document;
use crate::ErrorClass;
use crate::KvBucket;
use crate::PayloadCodec;
use crate::Result;
use crate::VersionedObjectStore;
use crate::WriteOutcome;

/// What the transport should do with a delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckDecision {
    /// Permanently handled, including permanently unprocessable
    Ack,
    /// Request redelivery
    Retry,
}

/// How an event was handled before the ack decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Disposition {
    Applied,
    /// Filtered, ignored or unroutable
    Dropped,
    Retry,
}

impl From<WriteOutcome> for Disposition {
    fn from(outcome: WriteOutcome) -> Self {
        if outcome.needs_retry() {
            Disposition::Retry
        } else {
            Disposition::Applied
        }
    }
}

impl From<HandlerOutcome> for Disposition {
    fn from(outcome: HandlerOutcome) -> Self {
        match outcome {
            HandlerOutcome::Done => Disposition::Applied,
            HandlerOutcome::Retry => Disposition::Retry,
        }
    }
}

/// Routes change events from every source into the object store or a
/// record handler and turns the result into an ack decision.
///
/// The only retryable outcome is a lost revision race. Malformed events
/// and backend failures are acked: redelivery cannot fix the first, and
/// would only pile onto the second.
pub struct Dispatcher<B: KvBucket> {
    store: VersionedObjectStore<B>,
    registry: Arc<HandlerRegistry>,
    codec: PayloadCodec,
    config: DispatchConfig,
}

impl<B: KvBucket> Dispatcher<B> {
    pub fn new(
        store: VersionedObjectStore<B>,
        registry: Arc<HandlerRegistry>,
        codec: PayloadCodec,
        config: DispatchConfig,
    ) -> Self {
        Self {
            store,
            registry,
            codec,
            config,
        }
    }

    pub fn store(&self) -> &VersionedObjectStore<B> {
        &self.store
    }

    pub async fn dispatch(
        &self,
        source: EventSource,
        delivery: &dyn Delivery,
    ) -> AckDecision {
        let result = match source {
            EventSource::KeyWatch => self.dispatch_key_watch(delivery).await,
            EventSource::LogChange => self.dispatch_log_change(delivery.payload()).await,
            EventSource::TableStream => self.dispatch_table_stream(delivery.payload()).await,
        };

        let subject = delivery.subject();
        let (decision, label) = match result {
            Ok(Disposition::Applied) => (AckDecision::Ack, "ack"),
            Ok(Disposition::Dropped) => (AckDecision::Ack, "dropped"),
            Ok(Disposition::Retry) => {
                debug!(subject, source = source.label(), "conflict, requesting redelivery");
                (AckDecision::Retry, "retry")
            }
            Err(e) => match e.class() {
                ErrorClass::Terminal => {
                    warn!(subject, source = source.label(), "dropping unprocessable event: {}", e);
                    (AckDecision::Ack, "invalid")
                }
                ErrorClass::Transient => {
                    debug!(subject, source = source.label(), "transient failure, requesting redelivery: {}", e);
                    (AckDecision::Retry, "retry")
                }
                ErrorClass::Operational => {
                    error!(subject, source = source.label(), "event dropped on backend failure: {:?}", e);
                    (AckDecision::Ack, "failed")
                }
            },
        };
        DISPATCH_OUTCOMES.with_label_values(&[source.label(), label]).inc();
        decision
    }

    fn originated_here(
        &self,
        payload: Option<&Document>,
    ) -> bool {
        if self.config.writer_identity.is_empty() {
            return false;
        }
        let modifier = payload.and_then(|p| p.last_modified_by(&self.config.last_modified_by_field));
        if modifier == Some(self.config.writer_identity.as_str()) {
            debug!(modifier = %self.config.writer_identity, "skipping record that originated here");
            return true;
        }
        false
    }

    async fn dispatch_key_watch(
        &self,
        delivery: &dyn Delivery,
    ) -> Result<Disposition> {
        let event = KeyWatchEvent::from_delivery(delivery)?;
        let Some(handler) = self.registry.get(event.prefix()) else {
            warn!(key = %event.key, "unknown object type, ignoring");
            return Ok(Disposition::Dropped);
        };

        let outcome = match event.operation {
            KvOperation::Delete | KvOperation::Purge => handler.handle_delete(&event.key, None).await?,
            KvOperation::Put => {
                let payload = self
                    .codec
                    .decode(&event.key, &event.value)
                    .map_err(|e| DispatchError::Decode {
                        kind: "key-watch",
                        reason: e.to_string(),
                    })?;
                if self.originated_here(Some(&payload)) {
                    return Ok(Disposition::Dropped);
                }
                if payload.is_deletion_marked() {
                    handler.handle_delete(&event.key, Some(&payload)).await?
                } else {
                    handler.handle_upsert(&event.key, &payload).await?
                }
            }
        };
        trace!(key = %event.key, ?outcome, "key-watch event handled");
        Ok(outcome.into())
    }

    async fn dispatch_log_change(
        &self,
        bytes: &[u8],
    ) -> Result<Disposition> {
        let event = LogChangeEvent::decode(bytes)?;
        let class = event.action_class();
        if class == ActionClass::Ignore {
            debug!(action = %event.action, table = %event.table, "log action not supported, ignoring");
            return Ok(Disposition::Dropped);
        }

        let key = event.store_key(&self.config.primary_key_field)?;
        if self.originated_here(event.image()) {
            return Ok(Disposition::Dropped);
        }

        let outcome = match class {
            ActionClass::Upsert => {
                let candidate = event.data.clone().unwrap_or_default();
                self.store
                    .upsert(
                        &key,
                        candidate,
                        &self.config.log_timestamp_fields,
                        event.commit_time.as_deref(),
                    )
                    .await?
            }
            _ => {
                let marker = event.commit_time.clone().unwrap_or_else(now_rfc3339);
                self.store.soft_delete(&key, &marker, event.data_old.clone()).await?
            }
        };
        info!(%key, action = %event.action, outcome = outcome.label(), "log change applied");
        Ok(outcome.into())
    }

    async fn dispatch_table_stream(
        &self,
        bytes: &[u8],
    ) -> Result<Disposition> {
        let event = TableStreamEvent::decode(bytes)?;
        let key = event.store_key();

        let outcome = match event.action_class() {
            ActionClass::Ignore => {
                warn!(event_name = %event.event_name, table = %event.table_name, "unknown table event, ignoring");
                return Ok(Disposition::Dropped);
            }
            ActionClass::Upsert => {
                let Some(candidate) = event.new_image.clone().filter(|image| !image.is_empty()) else {
                    return Err(event.missing("new_image").into());
                };
                if self.originated_here(Some(&candidate)) {
                    return Ok(Disposition::Dropped);
                }
                let created = event.creation_time();
                self.store
                    .upsert(
                        &key,
                        candidate,
                        &self.config.stream_timestamp_fields,
                        created.as_deref(),
                    )
                    .await?
            }
            ActionClass::SoftDelete => {
                if self.originated_here(event.old_image.as_ref()) {
                    return Ok(Disposition::Dropped);
                }
                let marker = event.creation_time().unwrap_or_else(now_rfc3339);
                self.store.soft_delete(&key, &marker, event.old_image.clone()).await?
            }
        };
        info!(%key, event_name = %event.event_name, outcome = outcome.label(), "table change applied");
        Ok(outcome.into())
    }
}

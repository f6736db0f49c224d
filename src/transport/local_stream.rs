use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::debug;
use tracing::warn;

use super::Delivery;
use super::Subscription;
use crate::metrics::ABANDONED_DELIVERIES;
use crate::Result;
use crate::TransportError;

/// Message as published onto a [`LocalStream`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocalMessage {
    pub subject: String,
    pub headers: HashMap<String, String>,
    pub payload: Bytes,
}

impl LocalMessage {
    pub fn new(
        subject: impl Into<String>,
        payload: impl Into<Bytes>,
    ) -> Self {
        Self {
            subject: subject.into(),
            headers: HashMap::new(),
            payload: payload.into(),
        }
    }

    pub fn with_header(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

struct Pending {
    message: Arc<LocalMessage>,
    delivery_count: u32,
}

struct StreamState {
    name: String,
    max_deliver: u32,
    queue: Mutex<VecDeque<Pending>>,
    /// Published and not yet acked or abandoned
    outstanding: AtomicUsize,
    closed: AtomicBool,
    abandoned: AtomicU64,
    notify: Notify,
}

impl StreamState {
    fn settled(&self) {
        self.outstanding.fetch_sub(1, Ordering::SeqCst);
        self.notify.notify_waiters();
    }
}

/// In-process stream with at-least-once redelivery.
///
/// A nak'd message goes back to the end of the queue until it has been
/// delivered `max_deliver` times; after that it is abandoned, logged and
/// counted. Unsettled deliveries are never redelivered by timeout.
#[derive(Clone)]
pub struct LocalStream {
    state: Arc<StreamState>,
}

impl LocalStream {
    pub fn new(
        name: impl Into<String>,
        max_deliver: u32,
    ) -> Self {
        Self {
            state: Arc::new(StreamState {
                name: name.into(),
                max_deliver: max_deliver.max(1),
                queue: Mutex::new(VecDeque::new()),
                outstanding: AtomicUsize::new(0),
                closed: AtomicBool::new(false),
                abandoned: AtomicU64::new(0),
                notify: Notify::new(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.state.name
    }

    pub fn publish(
        &self,
        message: LocalMessage,
    ) -> Result<()> {
        if self.state.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed(self.state.name.clone()).into());
        }
        self.state.outstanding.fetch_add(1, Ordering::SeqCst);
        self.state.queue.lock().push_back(Pending {
            message: Arc::new(message),
            delivery_count: 0,
        });
        self.state.notify.notify_waiters();
        Ok(())
    }

    /// Stops accepting messages. Subscribers finish once everything
    /// outstanding has been settled.
    pub fn close(&self) {
        self.state.closed.store(true, Ordering::SeqCst);
        self.state.notify.notify_waiters();
    }

    pub fn subscribe(&self) -> LocalSubscription {
        LocalSubscription {
            state: self.state.clone(),
        }
    }

    /// Messages neither acked nor abandoned yet
    pub fn outstanding(&self) -> usize {
        self.state.outstanding.load(Ordering::SeqCst)
    }

    pub fn abandoned(&self) -> u64 {
        self.state.abandoned.load(Ordering::SeqCst)
    }
}

pub struct LocalSubscription {
    state: Arc<StreamState>,
}

#[async_trait]
impl Subscription for LocalSubscription {
    async fn next(&mut self) -> Option<Box<dyn Delivery>> {
        loop {
            let notified = self.state.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let next = self.state.queue.lock().pop_front();
            if let Some(pending) = next {
                return Some(Box::new(LocalDelivery {
                    state: self.state.clone(),
                    message: pending.message,
                    delivery_count: pending.delivery_count + 1,
                    settled: AtomicBool::new(false),
                }));
            }
            if self.state.closed.load(Ordering::SeqCst) && self.state.outstanding.load(Ordering::SeqCst) == 0 {
                return None;
            }
            notified.await;
        }
    }
}

pub struct LocalDelivery {
    state: Arc<StreamState>,
    message: Arc<LocalMessage>,
    delivery_count: u32,
    settled: AtomicBool,
}

#[async_trait]
impl Delivery for LocalDelivery {
    fn subject(&self) -> &str {
        &self.message.subject
    }

    fn header(
        &self,
        name: &str,
    ) -> Option<&str> {
        self.message.headers.get(name).map(String::as_str)
    }

    fn payload(&self) -> &[u8] {
        &self.message.payload
    }

    fn delivery_count(&self) -> u32 {
        self.delivery_count
    }

    async fn ack(&self) -> Result<()> {
        if !self.settled.swap(true, Ordering::SeqCst) {
            self.state.settled();
        }
        Ok(())
    }

    async fn nak(&self) -> Result<()> {
        if self.settled.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        if self.delivery_count >= self.state.max_deliver {
            self.state.abandoned.fetch_add(1, Ordering::SeqCst);
            ABANDONED_DELIVERIES.with_label_values(&[self.state.name.as_str()]).inc();
            warn!(
                stream = %self.state.name,
                subject = %self.message.subject,
                deliveries = self.delivery_count,
                "message abandoned after max deliveries"
            );
            self.state.settled();
            return Ok(());
        }

        debug!(subject = %self.message.subject, deliveries = self.delivery_count, "message nak'd, redelivering");
        self.state.queue.lock().push_back(Pending {
            message: self.message.clone(),
            delivery_count: self.delivery_count,
        });
        self.state.notify.notify_waiters();
        Ok(())
    }
}

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::Document;
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerOutcome {
    Done,
    /// Lost a revision race; the event should be redelivered
    Retry,
}

/// Translates records of one source table into derived state.
///
/// Handlers run inside the dispatch worker slot: anything slow must be
/// spawned as detached work and its failures logged there.
#[async_trait]
pub trait RecordHandler: Send + Sync + 'static {
    async fn handle_upsert(
        &self,
        key: &str,
        payload: &Document,
    ) -> Result<HandlerOutcome>;

    /// `payload` is known when the record was deletion-marked rather than
    /// removed from the bucket.
    async fn handle_delete(
        &self,
        key: &str,
        payload: Option<&Document>,
    ) -> Result<HandlerOutcome>;
}

/// Key prefix to handler table, fixed once built.
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn RecordHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for keys starting with `prefix`.
    pub fn with_handler(
        mut self,
        prefix: impl Into<String>,
        handler: Arc<dyn RecordHandler>,
    ) -> Self {
        let prefix = prefix.into();
        if self.handlers.insert(prefix.clone(), handler).is_some() {
            warn!(%prefix, "handler registered twice, keeping the last one");
        }
        self
    }

    pub fn get(
        &self,
        prefix: &str,
    ) -> Option<&Arc<dyn RecordHandler>> {
        self.handlers.get(prefix)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

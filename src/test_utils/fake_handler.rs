use async_trait::async_trait;
use parking_lot::Mutex;

use crate::Document;
use crate::HandlerOutcome;
use crate::RecordHandler;
use crate::Result;

/// Handler call as seen by [`RecordingHandler`]
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum HandlerCall {
    Upsert { key: String, payload: Document },
    Delete { key: String, payload: Option<Document> },
}

/// Records every call and answers with a fixed outcome.
pub(crate) struct RecordingHandler {
    outcome: HandlerOutcome,
    calls: Mutex<Vec<HandlerCall>>,
}

impl RecordingHandler {
    pub(crate) fn new() -> Self {
        Self::answering(HandlerOutcome::Done)
    }

    pub(crate) fn answering(outcome: HandlerOutcome) -> Self {
        Self {
            outcome,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn calls(&self) -> Vec<HandlerCall> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl RecordHandler for RecordingHandler {
    async fn handle_upsert(
        &self,
        key: &str,
        payload: &Document,
    ) -> Result<HandlerOutcome> {
        self.calls.lock().push(HandlerCall::Upsert {
            key: key.to_string(),
            payload: payload.clone(),
        });
        Ok(self.outcome)
    }

    async fn handle_delete(
        &self,
        key: &str,
        payload: Option<&Document>,
    ) -> Result<HandlerOutcome> {
        self.calls.lock().push(HandlerCall::Delete {
            key: key.to_string(),
            payload: payload.cloned(),
        });
        Ok(self.outcome)
    }
}

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;

use crate::constants::LOOKUP_ERROR_PREFIX;
use crate::constants::TOMBSTONE_MARKER;
use crate::KvBucket;

/// Lookup request carrying an opaque mapping key and where to answer.
#[derive(Debug)]
pub struct LookupRequest {
    pub payload: Bytes,
    pub reply: oneshot::Sender<Bytes>,
}

/// Answers mapping lookups.
///
/// Replies are the stored bytes, an empty payload for missing or
/// tombstoned keys (callers cannot tell the two apart), or
/// `error: {message}` when the bucket fails.
pub struct LookupResponder<B: KvBucket> {
    bucket: Arc<B>,
}

impl<B: KvBucket> LookupResponder<B> {
    pub fn new(bucket: Arc<B>) -> Self {
        Self { bucket }
    }

    pub async fn respond(
        &self,
        request: &[u8],
    ) -> Bytes {
        let mapping_key = String::from_utf8_lossy(request);
        debug!(%mapping_key, "mapping lookup");

        match self.bucket.get(&mapping_key).await {
            Ok(Some(entry)) if entry.value.as_ref() == TOMBSTONE_MARKER => {
                debug!(%mapping_key, "mapping key is tombstoned");
                Bytes::new()
            }
            Ok(Some(entry)) => entry.value,
            Ok(None) => {
                debug!(%mapping_key, "mapping key not found");
                Bytes::new()
            }
            Err(e) => {
                error!(%mapping_key, "error retrieving mapping key: {:?}", e);
                Bytes::from(format!("{LOOKUP_ERROR_PREFIX}{e}"))
            }
        }
    }

    /// Answers requests until `shutdown` fires or every sender is gone.
    pub async fn serve(
        &self,
        mut requests: mpsc::Receiver<LookupRequest>,
        shutdown: CancellationToken,
    ) {
        loop {
            let request = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                request = requests.recv() => match request {
                    Some(request) => request,
                    None => break,
                },
            };
            let response = self.respond(&request.payload).await;
            if request.reply.send(response).is_err() {
                debug!("lookup requester went away before the reply");
            }
        }
    }
}

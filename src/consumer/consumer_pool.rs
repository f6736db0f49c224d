use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::debug;
use tracing::error;
use tracing::info;

use crate::AckDecision;
use crate::ConsumerPolicy;
use crate::Delivery;
use crate::Dispatcher;
use crate::Error;
use crate::EventSource;
use crate::KvBucket;
use crate::Result;
use crate::Subscription;

/// Pulls deliveries for one source and dispatches up to `max_in_flight`
/// of them concurrently.
pub struct ConsumerPool<B: KvBucket> {
    dispatcher: Arc<Dispatcher<B>>,
    source: EventSource,
    policy: ConsumerPolicy,
}

impl<B: KvBucket> ConsumerPool<B> {
    pub fn new(
        dispatcher: Arc<Dispatcher<B>>,
        source: EventSource,
        policy: ConsumerPolicy,
    ) -> Self {
        Self {
            dispatcher,
            source,
            policy,
        }
    }

    /// Runs until `shutdown` fires or the subscription ends.
    ///
    /// Shutdown stops pulling new deliveries; handlers already in flight
    /// run to completion and settle their message before this returns.
    pub async fn run<S: Subscription>(
        &self,
        mut subscription: S,
        shutdown: CancellationToken,
    ) -> Result<()> {
        let source = self.source;
        let limiter = Arc::new(Semaphore::new(self.policy.max_in_flight.max(1)));
        let in_flight = TaskTracker::new();
        info!(source = source.label(), max_in_flight = self.policy.max_in_flight, "consumer pool started");

        loop {
            let permit = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                permit = limiter.clone().acquire_owned() => {
                    permit.map_err(|e| Error::Fatal(format!("consumer limiter closed: {e}")))?
                }
            };
            let delivery = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                delivery = subscription.next() => match delivery {
                    Some(delivery) => delivery,
                    None => {
                        debug!(source = source.label(), "subscription ended");
                        break;
                    }
                },
            };

            let dispatcher = self.dispatcher.clone();
            in_flight.spawn(async move {
                let _permit = permit;
                let decision = dispatcher.dispatch(source, delivery.as_ref()).await;
                settle(delivery.as_ref(), decision).await;
            });
        }

        in_flight.close();
        in_flight.wait().await;
        info!(source = source.label(), "consumer pool stopped");
        Ok(())
    }
}

async fn settle(
    delivery: &dyn Delivery,
    decision: AckDecision,
) {
    let result = match decision {
        AckDecision::Ack => delivery.ack().await,
        AckDecision::Retry => delivery.nak().await,
    };
    if let Err(e) = result {
        error!(subject = delivery.subject(), ?decision, "failed to settle delivery: {:?}", e);
    }
}

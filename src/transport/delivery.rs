use async_trait::async_trait;

use crate::Result;

/// One delivered message, settled exactly once by `ack` or `nak`.
#[async_trait]
pub trait Delivery: Send + Sync + 'static {
    fn subject(&self) -> &str;

    fn header(
        &self,
        name: &str,
    ) -> Option<&str>;

    fn payload(&self) -> &[u8];

    /// 1 on first delivery
    fn delivery_count(&self) -> u32;

    /// Message is permanently consumed
    async fn ack(&self) -> Result<()>;

    /// Request redelivery
    async fn nak(&self) -> Result<()>;
}

/// Pull side of a durable consumer.
#[async_trait]
pub trait Subscription: Send + 'static {
    /// Next message; `None` once the stream is closed and drained.
    /// Cancel safe.
    async fn next(&mut self) -> Option<Box<dyn Delivery>>;
}

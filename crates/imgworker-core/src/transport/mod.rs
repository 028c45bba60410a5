//! Messaging boundary.
//!
//! The delivery loop only talks to a [`Broker`]; connecting, declaring
//! queues, and wire encoding live in the implementations.

mod memory;

pub use memory::{MemoryBroker, MemoryBrokerHandle, MemoryLedger, Published};

use async_trait::async_trait;

use crate::error::TransportError;
use crate::types::{Incoming, Reply};

/// Source of jobs and destination of replies.
///
/// Uses `async_trait` so the worker can run against `Box<dyn Broker>`.
#[async_trait]
pub trait Broker: Send {
    /// Broker name for logging (e.g., "amqp", "memory").
    fn name(&self) -> &str;

    /// Wait for the next delivery. `None` means the stream has ended.
    async fn next_delivery(&mut self) -> Option<Result<Incoming, TransportError>>;

    /// Publish `reply` to the `reply_to` address.
    async fn publish(&mut self, reply_to: &str, reply: &Reply) -> Result<(), TransportError>;

    /// Positively acknowledge a delivery.
    async fn ack(&mut self, delivery_tag: u64) -> Result<(), TransportError>;

    /// Release the underlying connection.
    async fn close(&mut self) -> Result<(), TransportError> {
        Ok(())
    }
}

#[async_trait]
impl<B: Broker + ?Sized> Broker for Box<B> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn next_delivery(&mut self) -> Option<Result<Incoming, TransportError>> {
        (**self).next_delivery().await
    }

    async fn publish(&mut self, reply_to: &str, reply: &Reply) -> Result<(), TransportError> {
        (**self).publish(reply_to, reply).await
    }

    async fn ack(&mut self, delivery_tag: u64) -> Result<(), TransportError> {
        (**self).ack(delivery_tag).await
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        (**self).close().await
    }
}

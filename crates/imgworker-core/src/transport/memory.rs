//! In-process broker over bounded channels.
//!
//! Lets the worker run without an external message server: embedders push
//! deliveries through a [`MemoryBrokerHandle`] and read back what was
//! published and acknowledged.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::TransportError;
use crate::types::{Incoming, Reply};

use super::Broker;

/// A reply as it was published.
#[derive(Debug, Clone, PartialEq)]
pub struct Published {
    pub reply_to: String,
    pub reply: Reply,
}

#[derive(Debug, Default)]
struct Ledger {
    published: Vec<Published>,
    acked: Vec<u64>,
    fail_publish: bool,
    fail_ack: bool,
}

/// Broker half owned by the worker.
pub struct MemoryBroker {
    deliveries: mpsc::Receiver<Incoming>,
    ledger: Arc<Mutex<Ledger>>,
}

/// Client half: submit deliveries, inspect replies and acks.
#[derive(Clone)]
pub struct MemoryBrokerHandle {
    deliveries: mpsc::Sender<Incoming>,
    ledger: Arc<Mutex<Ledger>>,
}

impl MemoryBroker {
    /// Create a broker whose inbound queue holds at most `buffer_size`
    /// pending deliveries. Submitting to a full queue waits.
    pub fn new(buffer_size: usize) -> (Self, MemoryBrokerHandle) {
        let (tx, rx) = mpsc::channel(buffer_size.max(1));
        let ledger = Arc::new(Mutex::new(Ledger::default()));
        (
            Self {
                deliveries: rx,
                ledger: Arc::clone(&ledger),
            },
            MemoryBrokerHandle {
                deliveries: tx,
                ledger,
            },
        )
    }

    fn ledger(&self) -> std::sync::MutexGuard<'_, Ledger> {
        self.ledger.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    fn name(&self) -> &str {
        "memory"
    }

    async fn next_delivery(&mut self) -> Option<Result<Incoming, TransportError>> {
        self.deliveries.recv().await.map(Ok)
    }

    async fn publish(&mut self, reply_to: &str, reply: &Reply) -> Result<(), TransportError> {
        let mut ledger = self.ledger();
        if ledger.fail_publish {
            return Err(TransportError::Publish {
                reply_to: reply_to.to_string(),
                message: "injected failure".to_string(),
            });
        }
        ledger.published.push(Published {
            reply_to: reply_to.to_string(),
            reply: reply.clone(),
        });
        Ok(())
    }

    async fn ack(&mut self, delivery_tag: u64) -> Result<(), TransportError> {
        let mut ledger = self.ledger();
        if ledger.fail_ack {
            return Err(TransportError::Ack {
                delivery_tag,
                message: "injected failure".to_string(),
            });
        }
        ledger.acked.push(delivery_tag);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.deliveries.close();
        Ok(())
    }
}

impl MemoryBrokerHandle {
    /// Queue a delivery for the worker.
    pub async fn submit(&self, incoming: Incoming) -> Result<(), TransportError> {
        self.deliveries
            .send(incoming)
            .await
            .map_err(|_| TransportError::Closed)
    }

    /// A view of what the worker published and acknowledged.
    pub fn ledger(&self) -> MemoryLedger {
        MemoryLedger {
            inner: Arc::clone(&self.ledger),
        }
    }

    /// Stop submitting. Once every handle is finished, the worker sees the
    /// end of the stream after draining what is already queued.
    pub fn finish(self) -> MemoryLedger {
        self.ledger()
    }
}

/// Read side of the broker ledger. Holding one does not keep the stream open.
#[derive(Clone)]
pub struct MemoryLedger {
    inner: Arc<Mutex<Ledger>>,
}

impl MemoryLedger {
    /// Replies published so far, in order.
    pub fn published(&self) -> Vec<Published> {
        self.lock().published.clone()
    }

    /// Delivery tags acknowledged so far, in order.
    pub fn acked(&self) -> Vec<u64> {
        self.lock().acked.clone()
    }

    /// Make every subsequent publish fail.
    pub fn fail_publishes(&self) {
        self.lock().fail_publish = true;
    }

    /// Make every subsequent ack fail.
    pub fn fail_acks(&self) {
        self.lock().fail_ack = true;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Ledger> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_submit_then_receive() {
        let (mut broker, handle) = MemoryBroker::new(4);
        handle
            .submit(Incoming::new(7, vec![1], "a"))
            .await
            .unwrap();
        let incoming = broker.next_delivery().await.unwrap().unwrap();
        assert_eq!(incoming.delivery_tag, 7);
    }

    #[tokio::test]
    async fn test_stream_ends_when_handles_dropped() {
        let (mut broker, handle) = MemoryBroker::new(4);
        drop(handle);
        assert!(broker.next_delivery().await.is_none());
    }

    #[tokio::test]
    async fn test_finished_handle_drains_then_ends() {
        let (mut broker, handle) = MemoryBroker::new(4);
        handle.submit(Incoming::new(1, vec![1], "a")).await.unwrap();
        let _ledger = handle.finish();
        assert!(broker.next_delivery().await.is_some());
        assert!(broker.next_delivery().await.is_none());
    }

    #[tokio::test]
    async fn test_ledger_records_publish_and_ack() {
        let (mut broker, handle) = MemoryBroker::new(1);
        let reply = Reply {
            correlation_id: Some("c".into()),
            content_type: "text/plain".into(),
            headers: Default::default(),
            body: vec![],
        };
        broker.publish("replies", &reply).await.unwrap();
        broker.ack(3).await.unwrap();

        let ledger = handle.finish();
        assert_eq!(ledger.published()[0].reply_to, "replies");
        assert_eq!(ledger.acked(), vec![3]);
    }

    #[tokio::test]
    async fn test_injected_publish_failure() {
        let (mut broker, handle) = MemoryBroker::new(1);
        let ledger = handle.ledger();
        ledger.fail_publishes();
        let reply = Reply {
            correlation_id: None,
            content_type: "text/plain".into(),
            headers: Default::default(),
            body: vec![],
        };
        let err = broker.publish("q", &reply).await.unwrap_err();
        assert!(matches!(err, TransportError::Publish { .. }));
        assert!(ledger.published().is_empty());
    }
}

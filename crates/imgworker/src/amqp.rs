//! AMQP 0-9-1 broker backed by `lapin`.
//!
//! Declares a non-durable queue, consumes with manual acknowledgment and a
//! bounded prefetch, and publishes replies to the default exchange routed by
//! each delivery's `reply_to`.

use async_trait::async_trait;
use futures_util::StreamExt;
use imgworker_core::config::BrokerConfig;
use imgworker_core::types::{HeaderValue, Incoming, Reply};
use imgworker_core::{Broker, TransportError};
use lapin::message::Delivery;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, BasicQosOptions,
    QueueDeclareOptions,
};
use lapin::types::{AMQPValue, FieldTable, LongString, ShortString};
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, Consumer};
use std::collections::BTreeMap;

/// Connected consumer on a single channel.
pub struct AmqpBroker {
    connection: Connection,
    channel: Channel,
    consumer: Consumer,
}

impl AmqpBroker {
    /// Connect, declare the queue, and start consuming.
    pub async fn connect(config: &BrokerConfig) -> Result<Self, TransportError> {
        let connection = Connection::connect(&config.address, ConnectionProperties::default())
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))?;

        let channel = connection
            .create_channel()
            .await
            .map_err(|e| TransportError::Connection(format!("open channel: {e}")))?;

        channel
            .queue_declare(
                &config.queue,
                QueueDeclareOptions {
                    durable: false,
                    exclusive: false,
                    auto_delete: false,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| TransportError::Connection(format!("declare '{}': {e}", config.queue)))?;

        channel
            .basic_qos(config.prefetch, BasicQosOptions::default())
            .await
            .map_err(|e| TransportError::Connection(format!("set prefetch: {e}")))?;

        let consumer = channel
            .basic_consume(
                &config.queue,
                &config.consumer_tag,
                BasicConsumeOptions {
                    no_ack: false,
                    ..BasicConsumeOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| TransportError::Consume(e.to_string()))?;

        tracing::info!(
            queue = %config.queue,
            prefetch = config.prefetch,
            "Consuming from AMQP queue"
        );

        Ok(Self {
            connection,
            channel,
            consumer,
        })
    }
}

#[async_trait]
impl Broker for AmqpBroker {
    fn name(&self) -> &str {
        "amqp"
    }

    async fn next_delivery(&mut self) -> Option<Result<Incoming, TransportError>> {
        let delivery = self.consumer.next().await?;
        Some(
            delivery
                .map(incoming_from_delivery)
                .map_err(|e| TransportError::Consume(e.to_string())),
        )
    }

    async fn publish(&mut self, reply_to: &str, reply: &Reply) -> Result<(), TransportError> {
        let publish_err = |e: lapin::Error| TransportError::Publish {
            reply_to: reply_to.to_string(),
            message: e.to_string(),
        };

        self.channel
            .basic_publish(
                "",
                reply_to,
                BasicPublishOptions::default(),
                &reply.body,
                reply_properties(reply),
            )
            .await
            .map_err(publish_err)?
            .await
            .map_err(publish_err)?;
        Ok(())
    }

    async fn ack(&mut self, delivery_tag: u64) -> Result<(), TransportError> {
        self.channel
            .basic_ack(delivery_tag, BasicAckOptions::default())
            .await
            .map_err(|e| TransportError::Ack {
                delivery_tag,
                message: e.to_string(),
            })
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.channel
            .close(200, "worker shutdown")
            .await
            .map_err(|e| TransportError::Connection(format!("close channel: {e}")))?;
        self.connection
            .close(200, "worker shutdown")
            .await
            .map_err(|e| TransportError::Connection(format!("close connection: {e}")))
    }
}

fn incoming_from_delivery(delivery: Delivery) -> Incoming {
    let properties = &delivery.properties;
    let headers = properties
        .headers()
        .as_ref()
        .map(headers_from_table)
        .unwrap_or_default();
    let reply_to = properties.reply_to().as_ref().map(|s| s.as_str().to_string());
    let correlation_id = properties
        .correlation_id()
        .as_ref()
        .map(|s| s.as_str().to_string());

    Incoming {
        delivery_tag: delivery.delivery_tag,
        body: delivery.data,
        headers,
        reply_to,
        correlation_id,
    }
}

fn headers_from_table(table: &FieldTable) -> BTreeMap<String, HeaderValue> {
    table
        .inner()
        .iter()
        .map(|(key, value)| (key.as_str().to_string(), header_value(value)))
        .collect()
}

fn header_value(value: &AMQPValue) -> HeaderValue {
    match value {
        AMQPValue::ShortString(s) => HeaderValue::Str(s.as_str().to_string()),
        // Most clients send string headers as long strings
        AMQPValue::LongString(s) => HeaderValue::Bytes(s.as_bytes().to_vec()),
        AMQPValue::ShortShortInt(n) => HeaderValue::Int(i64::from(*n)),
        AMQPValue::ShortShortUInt(n) => HeaderValue::Int(i64::from(*n)),
        AMQPValue::ShortInt(n) => HeaderValue::Int(i64::from(*n)),
        AMQPValue::ShortUInt(n) => HeaderValue::Int(i64::from(*n)),
        AMQPValue::LongInt(n) => HeaderValue::Int(i64::from(*n)),
        AMQPValue::LongUInt(n) => HeaderValue::Int(i64::from(*n)),
        AMQPValue::LongLongInt(n) => HeaderValue::Int(*n),
        other => HeaderValue::Other(format!("{other:?}")),
    }
}

fn reply_properties(reply: &Reply) -> BasicProperties {
    let mut headers = FieldTable::default();
    for (key, value) in &reply.headers {
        headers.insert(
            ShortString::from(key.clone()),
            AMQPValue::LongString(LongString::from(value.clone())),
        );
    }

    let properties = BasicProperties::default()
        .with_content_type(ShortString::from(reply.content_type.clone()))
        .with_headers(headers);

    match &reply.correlation_id {
        Some(id) => properties.with_correlation_id(ShortString::from(id.clone())),
        None => properties,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use imgworker_core::types::{HEADER_FILENAME, HEADER_ID, HEADER_STATUS, REPLY_CONTENT_TYPE};

    #[test]
    fn long_string_header_reads_as_text() {
        let value = header_value(&AMQPValue::LongString(LongString::from("cat.jpg")));
        assert_eq!(value.as_text().as_deref(), Some("cat.jpg"));
    }

    #[test]
    fn integer_headers_widen() {
        assert_eq!(header_value(&AMQPValue::ShortShortUInt(7)), HeaderValue::Int(7));
        assert_eq!(header_value(&AMQPValue::LongInt(-3)), HeaderValue::Int(-3));
        assert_eq!(
            header_value(&AMQPValue::LongLongInt(1 << 40)),
            HeaderValue::Int(1 << 40)
        );
    }

    #[test]
    fn unmapped_header_kept_as_other() {
        let value = header_value(&AMQPValue::Boolean(true));
        assert!(matches!(value, HeaderValue::Other(_)));
    }

    #[test]
    fn table_converts_all_entries() {
        let mut table = FieldTable::default();
        table.insert(
            ShortString::from(HEADER_FILENAME),
            AMQPValue::LongString(LongString::from("a.png")),
        );
        table.insert(ShortString::from(HEADER_ID), AMQPValue::LongInt(42));

        let headers = headers_from_table(&table);
        assert_eq!(headers.len(), 2);
        assert_eq!(headers[HEADER_FILENAME].as_text().as_deref(), Some("a.png"));
        assert_eq!(headers[HEADER_ID], HeaderValue::Int(42));
    }

    #[test]
    fn reply_properties_carry_correlation_and_headers() {
        let mut headers = BTreeMap::new();
        headers.insert(HEADER_STATUS.to_string(), "ok".to_string());
        let reply = Reply {
            correlation_id: Some("corr-1".to_string()),
            content_type: REPLY_CONTENT_TYPE.to_string(),
            headers,
            body: vec![1, 2, 3],
        };

        let properties = reply_properties(&reply);
        assert_eq!(
            properties.correlation_id().as_ref().map(|s| s.as_str()),
            Some("corr-1")
        );
        assert_eq!(
            properties.content_type().as_ref().map(|s| s.as_str()),
            Some(REPLY_CONTENT_TYPE)
        );
        let table = properties.headers().as_ref().unwrap();
        assert!(table.inner().contains_key(&ShortString::from(HEADER_STATUS)));
    }

    #[test]
    fn reply_without_correlation_leaves_it_unset() {
        let reply = Reply {
            correlation_id: None,
            content_type: REPLY_CONTENT_TYPE.to_string(),
            headers: BTreeMap::new(),
            body: Vec::new(),
        };
        assert!(reply_properties(&reply).correlation_id().is_none());
    }
}

//! AMQP 0.9.1 implementation of the broker seam

use super::traits::{
    BrokerConnector, BrokerSession, InboundMessage, ReplySink, Subscription, Topology,
};
use crate::config::AgentConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use cease_shared::{encode_reply, now_secs, topology, Reply};
use futures::StreamExt;
use lapin::message::Delivery;
use lapin::options::{
    BasicConsumeOptions, BasicPublishOptions, ExchangeDeclareOptions, QueueBindOptions,
    QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind};
use tracing::debug;

/// AMQP reply code for a normal connection close
const REPLY_SUCCESS: u16 = 200;

/// Connects to the broker named in the agent configuration
pub struct AmqpConnector {
    uri: String,
    connection_name: String,
}

impl AmqpConnector {
    pub fn new(config: &AgentConfig) -> Self {
        Self {
            uri: config.amqp_uri(),
            connection_name: config.connection_name.clone(),
        }
    }
}

#[async_trait]
impl BrokerConnector for AmqpConnector {
    type Session = AmqpSession;

    async fn connect(&self) -> Result<Self::Session> {
        let connection = Connection::connect(
            &self.uri,
            ConnectionProperties::default()
                .with_connection_name(self.connection_name.clone().into()),
        )
        .await?;

        Ok(AmqpSession {
            connection,
            consume_channel: None,
        })
    }

    fn endpoint(&self) -> &str {
        &self.uri
    }
}

/// A broker connection plus its consume channel once subscribed
pub struct AmqpSession {
    connection: Connection,
    consume_channel: Option<Channel>,
}

#[async_trait]
impl BrokerSession for AmqpSession {
    type Replies = AmqpReplyPublisher;

    async fn subscribe(&mut self, topology: &Topology) -> Result<Subscription<Self::Replies>> {
        let consume_channel = self
            .connection
            .create_channel()
            .await
            .context("Failed to open a channel")?;

        let reply_channel = self
            .connection
            .create_channel()
            .await
            .context("Could not create reply channel")?;

        consume_channel
            .exchange_declare(
                &topology.exchange,
                ExchangeKind::Topic,
                ExchangeDeclareOptions {
                    durable: true,
                    auto_delete: false,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .context("Failed to declare an exchange")?;

        // Server-named, private to this connection, gone on reconnect
        let queue = consume_channel
            .queue_declare(
                "",
                QueueDeclareOptions {
                    durable: false,
                    exclusive: true,
                    auto_delete: false,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .context("Failed to declare a queue")?;
        let queue_name = queue.name().as_str().to_string();

        consume_channel
            .queue_bind(
                &queue_name,
                &topology.exchange,
                &topology.routing_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .context("Failed to bind a queue")?;

        let consumer = consume_channel
            .basic_consume(
                &queue_name,
                "",
                BasicConsumeOptions {
                    no_ack: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .context("Failed to register a consumer")?;

        self.consume_channel = Some(consume_channel);

        let deliveries = consumer
            .map(|delivery| delivery.map(InboundMessage::from).map_err(anyhow::Error::from))
            .boxed();

        Ok(Subscription {
            queue: queue_name,
            deliveries,
            replies: AmqpReplyPublisher::new(reply_channel),
        })
    }

    async fn close(&self) {
        if let Err(e) = self.connection.close(REPLY_SUCCESS, "agent stopping").await {
            debug!("[AMQP] Close on a dead connection: {}", e);
        }
    }
}

impl From<Delivery> for InboundMessage {
    fn from(delivery: Delivery) -> Self {
        let reply_to = delivery
            .properties
            .reply_to()
            .as_ref()
            .map(|address| address.as_str().to_string());

        InboundMessage::new(delivery.data, reply_to)
    }
}

/// Publishes replies on a dedicated channel via the default exchange
pub struct AmqpReplyPublisher {
    channel: Channel,
}

impl AmqpReplyPublisher {
    pub fn new(channel: Channel) -> Self {
        Self { channel }
    }
}

#[async_trait]
impl ReplySink for AmqpReplyPublisher {
    async fn publish(&self, reply_to: &str, reply: &Reply) -> Result<()> {
        let body = encode_reply(reply);

        let properties = BasicProperties::default()
            .with_delivery_mode(topology::DELIVERY_MODE_PERSISTENT)
            .with_timestamp(now_secs())
            .with_content_type(topology::REPLY_CONTENT_TYPE.into());

        let confirm = self
            .channel
            .basic_publish(
                "", // Default exchange
                reply_to,
                BasicPublishOptions::default(),
                body.as_bytes(),
                properties,
            )
            .await
            .context("Could not reply to message")?;

        confirm.await.context("Reply publish was not confirmed")?;

        debug!("[REPLY] Published to {:?}: {}", reply_to, body);
        Ok(())
    }
}

//! Broker trait abstraction for pluggable messaging backends

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use cease_shared::Reply;
use futures::stream::BoxStream;

/// A message delivered on the command subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Raw message body
    pub body: Bytes,
    /// Address the reply should be sent to
    pub reply_to: Option<String>,
}

impl InboundMessage {
    pub fn new(body: impl Into<Bytes>, reply_to: Option<String>) -> Self {
        Self {
            body: body.into(),
            reply_to,
        }
    }
}

/// Exchange and binding used for the command subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    pub exchange: String,
    pub routing_key: String,
}

/// Inbound messages in delivery order. Ends when the session is lost.
pub type DeliveryStream = BoxStream<'static, Result<InboundMessage>>;

/// A live subscription: the queue, its deliveries, and where replies go
pub struct Subscription<P> {
    /// Broker-assigned queue name
    pub queue: String,
    pub deliveries: DeliveryStream,
    pub replies: P,
}

/// Publishes replies to the address named by an inbound message
#[async_trait]
pub trait ReplySink: Send + Sync + 'static {
    async fn publish(&self, reply_to: &str, reply: &Reply) -> Result<()>;
}

/// An established broker connection
#[async_trait]
pub trait BrokerSession: Send + Sync + 'static {
    /// Sink type used for replies on this session
    type Replies: ReplySink;

    /// Declare the topology, bind a private queue and start consuming
    async fn subscribe(&mut self, topology: &Topology) -> Result<Subscription<Self::Replies>>;

    /// Close the session
    async fn close(&self);
}

/// Factory for broker sessions
#[async_trait]
pub trait BrokerConnector: Send + Sync + 'static {
    /// The session type this connector produces
    type Session: BrokerSession;

    /// Attempt to connect, returning a session on success
    async fn connect(&self) -> Result<Self::Session>;

    /// Human-readable address of the broker
    fn endpoint(&self) -> &str;
}

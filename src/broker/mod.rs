//! Message broker access
//!
//! This module handles:
//! - The broker seam (connect, subscribe, reply) as traits
//! - The AMQP implementation of that seam on top of `lapin`

mod amqp;
mod traits;

pub use amqp::AmqpConnector;
pub use traits::{BrokerConnector, BrokerSession, InboundMessage, ReplySink, Subscription, Topology};

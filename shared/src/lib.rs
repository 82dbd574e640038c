//! Cease Shared Protocol Types
//!
//! This crate provides the wire types and codec for remote power-control
//! commands delivered over the broker, and the replies sent back to the
//! command's originator.

pub mod codec;
pub mod command;
pub mod reply;

use std::time::{SystemTime, UNIX_EPOCH};

pub use codec::{decode_command, encode_reply, CodecError};
pub use command::{Action, ActionError, Command};
pub use reply::Reply;

/// Get current timestamp in milliseconds since Unix epoch
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Get current timestamp in whole seconds since Unix epoch (AMQP timestamp unit)
pub fn now_secs() -> u64 {
    now_ms() / 1000
}

/// Broker topology shared by the agent and anything that sends it commands
pub mod topology {
    /// Topic exchange carrying device commands
    pub const EXCHANGE_NAME: &str = "radiodan";

    /// Routing key for the shutdown/restart command class
    pub const ROUTING_KEY: &str = "command.device.shutdown";

    /// Content type of reply messages
    pub const REPLY_CONTENT_TYPE: &str = "text/plain";

    /// AMQP delivery mode for persistent messages
    pub const DELIVERY_MODE_PERSISTENT: u8 = 2;
}

/// Broker connection defaults
pub mod defaults {
    pub const HOST: &str = "localhost";
    pub const PORT: u16 = 5672;

    /// Fixed delay between connection attempts
    pub const RETRY_DELAY_SECS: u64 = 3;
}

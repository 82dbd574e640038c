//! Agent configuration, built once at startup and immutable afterwards

use crate::broker::Topology;
use cease_shared::{defaults, topology};
use std::time::Duration;

/// Configuration for the agent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentConfig {
    /// Broker hostname
    pub host: String,
    /// Broker port
    pub port: u16,
    /// Echo the shutdown invocation instead of running it
    pub dry_run: bool,
    /// Fixed delay between connection attempts
    pub retry_delay: Duration,
    /// Topic exchange to bind to
    pub exchange: String,
    /// Routing key for the shutdown/restart command class
    pub routing_key: String,
    /// Capacity of the queue between the broker stream and the command worker
    pub inbound_capacity: usize,
    /// Connection name reported to the broker
    pub connection_name: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            host: defaults::HOST.into(),
            port: defaults::PORT,
            dry_run: false,
            retry_delay: Duration::from_secs(defaults::RETRY_DELAY_SECS),
            exchange: topology::EXCHANGE_NAME.into(),
            routing_key: topology::ROUTING_KEY.into(),
            inbound_capacity: 32,
            connection_name: "cease-agent".into(),
        }
    }
}

impl AgentConfig {
    /// AMQP URI for the configured broker
    pub fn amqp_uri(&self) -> String {
        format!("amqp://{}:{}", self.host, self.port)
    }

    /// Exchange and binding for the command subscription
    pub fn topology(&self) -> Topology {
        Topology {
            exchange: self.exchange.clone(),
            routing_key: self.routing_key.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AgentConfig::default();
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 5672);
        assert!(!config.dry_run);
        assert_eq!(config.retry_delay, Duration::from_secs(3));
        assert_eq!(config.exchange, "radiodan");
        assert_eq!(config.routing_key, "command.device.shutdown");
        assert_eq!(config.topology().exchange, config.exchange);
    }

    #[test]
    fn test_amqp_uri() {
        let config = AgentConfig {
            host: "broker.local".into(),
            port: 5673,
            ..Default::default()
        };
        assert_eq!(config.amqp_uri(), "amqp://broker.local:5673");
    }
}

mod broker;
mod command;
mod config;
mod connection;
#[cfg(test)]
mod testing;

use broker::AmqpConnector;
use cease_shared::defaults;
use clap::Parser;
use command::{CommandConsumer, CommandExecutor, SystemRunner};
use config::AgentConfig;
use connection::{ConnectionEvent, ConnectionManager};
use tokio::signal;

use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "cease")]
#[command(author, version, long_about = None)]
#[command(about = "Performs remote shutdown/restart commands received over AMQP")]
struct Cli {
    /// Hostname for RabbitMQ
    #[arg(long, env = "CEASE_HOST", default_value = defaults::HOST)]
    host: String,

    /// Port for RabbitMQ
    #[arg(long, env = "CEASE_PORT", default_value_t = defaults::PORT)]
    port: u16,

    /// Dry run (echo the shutdown command instead of executing it)
    #[arg(long, env = "CEASE_DRY_RUN")]
    dry_run: bool,

    /// Enable debug output
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn into_config(self) -> AgentConfig {
        AgentConfig {
            host: self.host,
            port: self.port,
            dry_run: self.dry_run,
            ..Default::default()
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    let config = cli.into_config();

    info!("Cease agent starting");
    info!("  Broker: {}", config.amqp_uri());
    info!("  Binding: {} -> {}", config.exchange, config.routing_key);
    if config.dry_run {
        warn!("  Dry run: shutdown commands will be echoed, not executed");
    }

    let executor = CommandExecutor::new(config.dry_run, SystemRunner);
    let consumer = CommandConsumer::new(executor);
    let connector = AmqpConnector::new(&config);

    let mut conn = ConnectionManager::start(connector, consumer, config);

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    // Main event loop
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("[MAIN] Shutdown signal received");
                return conn.shutdown().await;
            }
            event = conn.recv() => match event {
                Some(ConnectionEvent::ConnectFailed { attempt, reason }) => {
                    warn!("[MAIN] Connect attempt {} failed: {}", attempt, reason);
                }
                Some(ConnectionEvent::Connected { endpoint }) => {
                    info!("[MAIN] Connected to {}", endpoint);
                }
                Some(ConnectionEvent::Consuming { queue }) => {
                    info!("[MAIN] Consuming from {}", queue);
                }
                Some(ConnectionEvent::Disconnected { reason }) => {
                    warn!("[MAIN] Disconnected: {}", reason);
                }
                Some(ConnectionEvent::Fatal { reason }) => {
                    error!("[MAIN] Fatal: {}", reason);
                    return conn.shutdown().await;
                }
                None => {
                    error!("[MAIN] Connection manager closed");
                    return conn.shutdown().await;
                }
            }
        }
    }
}

/// Wait for Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_flags() {
        let cli = Cli::try_parse_from(["cease", "--host", "broker", "--port", "5673", "--dry-run"])
            .expect("parse failed");
        let config = cli.into_config();
        assert_eq!(config.host, "broker");
        assert_eq!(config.port, 5673);
        assert!(config.dry_run);
        assert_eq!(config.retry_delay, AgentConfig::default().retry_delay);
    }

    #[test]
    fn test_cli_rejects_bad_port() {
        assert!(Cli::try_parse_from(["cease", "--port", "not-a-port"]).is_err());
    }
}

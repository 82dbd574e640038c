//! Connection manager with indefinite reconnection and a single command worker

use crate::broker::{BrokerConnector, BrokerSession, InboundMessage, Subscription, Topology};
use crate::command::{CommandConsumer, ProcessRunner};
use crate::config::AgentConfig;
use anyhow::{anyhow, Result};
use futures::StreamExt;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinHandle};
use tracing::{error, info, warn};

/// Events emitted by the connection manager
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// A dial attempt failed; another follows after the retry delay
    ConnectFailed { attempt: u32, reason: String },
    /// Broker connection established
    Connected { endpoint: String },
    /// Subscription is set up and commands are being consumed
    Consuming { queue: String },
    /// Session lost; reconnecting
    Disconnected { reason: String },
    /// Setup or reply publish failed; the manager has stopped
    Fatal { reason: String },
}

/// How a session ended without a fatal error
#[derive(Debug)]
enum SessionEnd {
    Stopped,
    Lost(String),
}

/// Owns the broker session for the lifetime of the agent
pub struct ConnectionManager {
    /// Channel to receive connection events
    event_rx: mpsc::Receiver<ConnectionEvent>,
    /// Stop signal for the connection loop
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<Result<()>>,
}

impl ConnectionManager {
    /// Create a new connection manager and start the connection loop
    pub fn start<C, R>(connector: C, consumer: CommandConsumer<R>, config: AgentConfig) -> Self
    where
        C: BrokerConnector,
        R: ProcessRunner,
    {
        let (event_tx, event_rx) = mpsc::channel::<ConnectionEvent>(100);
        let (stop_tx, stop_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            connection_loop(connector, consumer, config, event_tx, stop_rx).await
        });

        Self {
            event_rx,
            stop_tx,
            task,
        }
    }

    /// Receive the next connection event
    pub async fn recv(&mut self) -> Option<ConnectionEvent> {
        self.event_rx.recv().await
    }

    /// Stop the connection loop and wait for it to finish.
    ///
    /// Returns the fatal error if the loop had already failed.
    pub async fn shutdown(self) -> Result<()> {
        let _ = self.stop_tx.send(true);
        self.task
            .await
            .map_err(|e| anyhow!("Connection loop panicked: {}", e))?
    }
}

/// Dial until a session is established, waiting `retry_delay` between attempts
async fn connect_with_retry<C: BrokerConnector>(
    connector: &C,
    retry_delay: Duration,
    event_tx: &mpsc::Sender<ConnectionEvent>,
) -> C::Session {
    let mut attempt: u32 = 0;

    loop {
        attempt = attempt.saturating_add(1);

        match connector.connect().await {
            Ok(session) => {
                info!("[AMQP] Connected to {}", connector.endpoint());
                let _ = event_tx
                    .send(ConnectionEvent::Connected {
                        endpoint: connector.endpoint().to_string(),
                    })
                    .await;
                return session;
            }
            Err(e) => {
                warn!(
                    "[AMQP] Cannot connect to {} (attempt {}): {:#}",
                    connector.endpoint(),
                    attempt,
                    e
                );
                info!("[AMQP] Retry in {:?}", retry_delay);
                let _ = event_tx
                    .send(ConnectionEvent::ConnectFailed {
                        attempt,
                        reason: format!("{:#}", e),
                    })
                    .await;
            }
        }

        tokio::time::sleep(retry_delay).await;
    }
}

/// Main connection loop: one session at a time, reconnecting when it is lost
async fn connection_loop<C, R>(
    connector: C,
    consumer: CommandConsumer<R>,
    config: AgentConfig,
    event_tx: mpsc::Sender<ConnectionEvent>,
    mut stop_rx: watch::Receiver<bool>,
) -> Result<()>
where
    C: BrokerConnector,
    R: ProcessRunner,
{
    let topology = config.topology();

    loop {
        let mut session = tokio::select! {
            session = connect_with_retry(&connector, config.retry_delay, &event_tx) => session,
            _ = stopped(&mut stop_rx) => {
                info!("[AMQP] Stopped before a session was established");
                return Ok(());
            }
        };

        let result = run_session(
            &mut session,
            &consumer,
            &topology,
            config.inbound_capacity,
            &event_tx,
            &mut stop_rx,
        )
        .await;

        session.close().await;

        match result {
            Ok(SessionEnd::Stopped) => {
                info!("[AMQP] Session closed");
                return Ok(());
            }
            Ok(SessionEnd::Lost(reason)) => {
                warn!("[AMQP] Session lost: {}", reason);
                let _ = event_tx.send(ConnectionEvent::Disconnected { reason }).await;
            }
            Err(e) => {
                error!("[AMQP] {:#}", e);
                let _ = event_tx
                    .send(ConnectionEvent::Fatal {
                        reason: format!("{:#}", e),
                    })
                    .await;
                return Err(e);
            }
        }
    }
}

/// Subscribe and pump deliveries into the command worker until the session ends
async fn run_session<S, R>(
    session: &mut S,
    consumer: &CommandConsumer<R>,
    topology: &Topology,
    inbound_capacity: usize,
    event_tx: &mpsc::Sender<ConnectionEvent>,
    stop_rx: &mut watch::Receiver<bool>,
) -> Result<SessionEnd>
where
    S: BrokerSession,
    R: ProcessRunner,
{
    let Subscription {
        queue,
        mut deliveries,
        replies,
    } = session.subscribe(topology).await?;

    info!("[AMQP] Consuming {}", queue);
    let _ = event_tx.send(ConnectionEvent::Consuming { queue }).await;

    // A full queue blocks the pump rather than dropping commands
    let (inbound_tx, inbound_rx) = mpsc::channel::<InboundMessage>(inbound_capacity.max(1));
    let mut worker = tokio::spawn(consumer.clone().run(inbound_rx, replies));

    info!("[*] Waiting for commands");

    let end = loop {
        tokio::select! {
            _ = stopped(stop_rx) => break SessionEnd::Stopped,

            // The worker only returns while its queue is open if a reply failed
            result = &mut worker => return Err(worker_failure(result)),

            next = deliveries.next() => match next {
                Some(Ok(message)) => {
                    if inbound_tx.send(message).await.is_err() {
                        return Err(worker_failure((&mut worker).await));
                    }
                }
                Some(Err(e)) => break SessionEnd::Lost(format!("{:#}", e)),
                None => break SessionEnd::Lost("delivery stream closed".into()),
            },
        }
    };

    drop(inbound_tx);
    match &end {
        SessionEnd::Stopped => worker.abort(),
        SessionEnd::Lost(_) => {
            // Commands already taken off the stream still get their reply and execution
            match worker.await {
                Ok(Ok(())) => {}
                result => return Err(worker_failure(result)),
            }
        }
    }
    Ok(end)
}

fn worker_failure(result: Result<Result<()>, JoinError>) -> anyhow::Error {
    match result {
        Ok(Err(e)) => e,
        Ok(Ok(())) => anyhow!("Command worker exited unexpectedly"),
        Err(e) => anyhow!("Command worker panicked: {}", e),
    }
}

/// Resolves once a stop is requested or the manager is dropped
async fn stopped(stop_rx: &mut watch::Receiver<bool>) {
    loop {
        let stop = *stop_rx.borrow();
        if stop || stop_rx.changed().await.is_err() {
            return;
        }
    }
}

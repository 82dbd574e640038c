//! Command consumer - validates inbound messages, replies, then executes

use super::executor::{CommandExecutor, ExecError};
use super::runner::ProcessRunner;
use crate::broker::{InboundMessage, ReplySink};
use anyhow::Result;
use cease_shared::{decode_command, encode_reply, Reply};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// What happened to a single inbound message
#[derive(Debug)]
pub enum HandleOutcome {
    /// Accepted and the OS command ran successfully
    Executed,
    /// Accepted, but the action was invalid or the OS command failed
    ExecutionFailed(ExecError),
    /// Payload was malformed; a failure reply was sent and nothing ran
    Rejected,
}

/// Handles inbound messages one at a time
pub struct CommandConsumer<R: ProcessRunner> {
    executor: Arc<CommandExecutor<R>>,
}

impl<R: ProcessRunner> Clone for CommandConsumer<R> {
    fn clone(&self) -> Self {
        Self {
            executor: self.executor.clone(),
        }
    }
}

impl<R: ProcessRunner> CommandConsumer<R> {
    pub fn new(executor: CommandExecutor<R>) -> Self {
        Self {
            executor: Arc::new(executor),
        }
    }

    /// Handle one message.
    ///
    /// The reply is always published, and published before execution starts.
    /// Only a failed reply publish is returned as an error; execution failures
    /// come back as [`HandleOutcome::ExecutionFailed`].
    pub async fn handle<P: ReplySink>(
        &self,
        message: &InboundMessage,
        replies: &P,
    ) -> Result<HandleOutcome> {
        let reply_to = message.reply_to.as_deref().unwrap_or_else(|| {
            warn!("[CMD] Message has no reply-to address");
            ""
        });

        let command = match decode_command(&message.body) {
            Ok(command) => command,
            Err(e) => {
                warn!("[CMD] Msg processing failed: {}", e);
                send_reply(replies, reply_to, Reply::malformed(e.correlation_id())).await?;
                return Ok(HandleOutcome::Rejected);
            }
        };

        info!("[CMD] Received action: {}", command.action);
        send_reply(replies, reply_to, Reply::accepted(&command.correlation_id)).await?;

        match self.executor.execute(&command).await {
            Ok(_) => Ok(HandleOutcome::Executed),
            Err(e) => Ok(HandleOutcome::ExecutionFailed(e)),
        }
    }

    /// Drain the inbound queue in order until it closes or a reply fails
    pub async fn run<P: ReplySink>(
        self,
        mut inbound: mpsc::Receiver<InboundMessage>,
        replies: P,
    ) -> Result<()> {
        while let Some(message) = inbound.recv().await {
            if let HandleOutcome::ExecutionFailed(e) = self.handle(&message, &replies).await? {
                error!("[EXEC] Could not exec shutdown: {}", e);
            }
        }
        Ok(())
    }
}

async fn send_reply<P: ReplySink>(replies: &P, reply_to: &str, reply: Reply) -> Result<()> {
    replies.publish(reply_to, &reply).await?;
    info!("[REPLY] Replying to message {}", encode_reply(&reply));
    Ok(())
}

//! Command handling for the agent
//!
//! This module handles:
//! - Validating inbound messages into commands
//! - Replying to the sender before execution
//! - Translating commands into shutdown facility invocations

mod consumer;
pub(crate) mod executor;
pub(crate) mod runner;

pub use consumer::CommandConsumer;
pub use executor::CommandExecutor;
pub use runner::{ProcessRunner, SystemRunner};

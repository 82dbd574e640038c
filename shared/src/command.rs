//! Inbound power-control command

use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A command as it arrives on the wire.
///
/// `action` is kept as the raw string: a payload with an unrecognized action
/// is still well-formed, and is only rejected when it is translated into an
/// OS action. Decoding goes through [`crate::decode_command`]; serializing
/// produces the canonical field names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Command {
    #[serde(rename = "Action")]
    pub action: String,

    #[serde(rename = "CorrelationId")]
    pub correlation_id: String,
}

impl Command {
    pub fn new(action: impl Into<String>, correlation_id: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            correlation_id: correlation_id.into(),
        }
    }

    /// Parse the action field into a known [`Action`]
    pub fn parsed_action(&self) -> Result<Action, ActionError> {
        self.action.parse()
    }
}

/// Power actions the agent knows how to perform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Restart,
    Shutdown,
}

impl Action {
    /// Flag passed to the shutdown facility for this action
    pub fn shutdown_flag(&self) -> &'static str {
        match self {
            Action::Restart => "-r",
            Action::Shutdown => "-h",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Restart => write!(f, "restart"),
            Action::Shutdown => write!(f, "shutdown"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Action {0:?} is neither restart nor shutdown")]
pub struct ActionError(pub String);

impl FromStr for Action {
    type Err = ActionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "restart" => Ok(Action::Restart),
            "shutdown" => Ok(Action::Shutdown),
            other => Err(ActionError(other.to_string())),
        }
    }
}

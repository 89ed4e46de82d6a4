use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The debug commands an owner may send to a paused session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandType {
    /// Resume until the next breakpoint.
    Continue,
    /// Execute the next step, then pause again.
    Next,
    /// Skip the current step.
    Skip,
    /// Abort the run.
    Abort,
    /// Inspect the current step's inputs and outputs.
    Inspect,
    /// Dump the run context.
    Context,
}

impl CommandType {
    /// Stable lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandType::Continue => "continue",
            CommandType::Next => "next",
            CommandType::Skip => "skip",
            CommandType::Abort => "abort",
            CommandType::Inspect => "inspect",
            CommandType::Context => "context",
        }
    }
}

impl fmt::Display for CommandType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommandType {
    type Err = UnknownCommand;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "continue" => Ok(CommandType::Continue),
            "next" => Ok(CommandType::Next),
            "skip" => Ok(CommandType::Skip),
            "abort" => Ok(CommandType::Abort),
            "inspect" => Ok(CommandType::Inspect),
            "context" => Ok(CommandType::Context),
            other => Err(UnknownCommand(other.to_owned())),
        }
    }
}

/// A command name outside the recognized taxonomy.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown debug command: {0:?}")]
pub struct UnknownCommand(pub String);

/// A command queued in a session's mailbox.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DebugCommand {
    /// The command verb.
    #[serde(rename = "type")]
    pub command: CommandType,
    /// Optional command arguments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

impl DebugCommand {
    /// A command with no payload.
    pub fn new(command: CommandType) -> Self {
        DebugCommand {
            command,
            payload: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_names_round_trip() {
        for command in [
            CommandType::Continue,
            CommandType::Next,
            CommandType::Skip,
            CommandType::Abort,
            CommandType::Inspect,
            CommandType::Context,
        ] {
            assert_eq!(command.as_str().parse::<CommandType>().unwrap(), command);
        }
        assert!("restart".parse::<CommandType>().is_err());
    }

    #[test]
    fn wire_shape_is_type_plus_payload() {
        let command: DebugCommand =
            serde_json::from_str(r#"{"type":"continue","payload":{"step":"s2"}}"#).unwrap();
        assert_eq!(command.command, CommandType::Continue);
        assert!(command.payload.is_some());

        let bare: DebugCommand = serde_json::from_str(r#"{"type":"abort"}"#).unwrap();
        assert_eq!(bare.command, CommandType::Abort);
        assert!(bare.payload.is_none());
    }
}

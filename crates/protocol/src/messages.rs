//! Control channel message definitions.
//!
//! A client sends exactly one [`ControlRequest`] per connection and receives
//! exactly one [`ControlResponse`]. Both are serialized as JSON objects.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ProtocolError;

/// Commands understood by the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// Persist `enabled = true` and start the FTP service.
    EnableFtp,
    /// Persist `enabled = false` and stop the FTP service.
    DisableFtp,
    /// Report whether the service is enabled and running.
    StatusFtp,
}

impl Command {
    /// The command name as sent on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            Command::EnableFtp => "enable_ftp",
            Command::DisableFtp => "disable_ftp",
            Command::StatusFtp => "status_ftp",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Command {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "enable_ftp" => Ok(Command::EnableFtp),
            "disable_ftp" => Ok(Command::DisableFtp),
            "status_ftp" => Ok(Command::StatusFtp),
            other => Err(ProtocolError::UnknownCommand(other.to_string())),
        }
    }
}

/// A request sent from a control client to the daemon.
///
/// `command` is kept as a raw string so that unknown commands still parse
/// and can be answered with a structured failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlRequest {
    /// Command name, e.g. `enable_ftp`.
    pub command: String,
    /// Command parameters. Currently unused by every command.
    #[serde(default)]
    pub params: Map<String, Value>,
}

impl ControlRequest {
    /// Create a request for a known command with empty params.
    pub fn new(command: Command) -> Self {
        Self::raw(command.as_str())
    }

    /// Create a request with an arbitrary command name.
    pub fn raw(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            params: Map::new(),
        }
    }

    /// Parse the command name into a typed [`Command`].
    pub fn parsed_command(&self) -> Result<Command, ProtocolError> {
        self.command.parse()
    }
}

/// A response sent from the daemon back to a control client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlResponse {
    /// Whether the command succeeded.
    pub success: bool,
    /// Failure reason, present only on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
    /// Service status, present only for `status_ftp`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<bool>,
}

impl ControlResponse {
    /// `{"success": true}`
    pub fn ok() -> Self {
        Self {
            success: true,
            msg: None,
            status: None,
        }
    }

    /// `{"success": true, "status": <status>}`
    pub fn with_status(status: bool) -> Self {
        Self {
            success: true,
            msg: None,
            status: Some(status),
        }
    }

    /// `{"success": false, "msg": <msg>}`
    pub fn failure(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            msg: Some(msg.into()),
            status: None,
        }
    }
}

impl From<ProtocolError> for ControlResponse {
    fn from(err: ProtocolError) -> Self {
        ControlResponse::failure(err.to_string())
    }
}

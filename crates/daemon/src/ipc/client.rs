//! Control client for talking to a running daemon via Unix Domain Sockets.
//!
//! The server answers exactly one request per connection, so the client
//! opens a fresh connection for every command.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use protocol::{decode_payload, encode_frame, Command, ControlRequest, ControlResponse};
use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;

use super::server::{read_frame, ControlError};

/// Default timeout for client operations in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 5;

/// A client for the daemon control channel.
#[derive(Debug, Clone)]
pub struct ControlClient {
    path: PathBuf,
    timeout: Duration,
}

impl ControlClient {
    /// Create a client for the socket at `path`.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Set the timeout covering connect, send and receive.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Path of the control socket.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Send a request and return the raw response, successful or not.
    pub async fn run_command(&self, request: &ControlRequest) -> Result<ControlResponse, ControlError> {
        tokio::time::timeout(self.timeout, self.exchange(request))
            .await
            .map_err(|_| {
                ControlError::Io(io::Error::new(io::ErrorKind::TimedOut, "operation timed out"))
            })?
    }

    /// Send a known command; a `success: false` reply becomes an error.
    pub async fn send(&self, command: Command) -> Result<ControlResponse, ControlError> {
        let response = self.run_command(&ControlRequest::new(command)).await?;
        if !response.success {
            let msg = response.msg.unwrap_or_else(|| format!("{} failed", command));
            return Err(ControlError::CommandFailed(msg));
        }
        Ok(response)
    }

    /// Enable the FTP service.
    pub async fn enable_ftp(&self) -> Result<(), ControlError> {
        self.send(Command::EnableFtp).await.map(|_| ())
    }

    /// Disable the FTP service.
    pub async fn disable_ftp(&self) -> Result<(), ControlError> {
        self.send(Command::DisableFtp).await.map(|_| ())
    }

    /// Whether the FTP service is enabled and running.
    pub async fn status_ftp(&self) -> Result<bool, ControlError> {
        let response = self.send(Command::StatusFtp).await?;
        Ok(response.status.unwrap_or(false))
    }

    async fn exchange(&self, request: &ControlRequest) -> Result<ControlResponse, ControlError> {
        let mut stream = UnixStream::connect(&self.path).await?;

        let frame = encode_frame(request)?;
        stream.write_all(&frame).await?;
        stream.flush().await?;

        let reply = read_frame(&mut stream).await?;
        decode_payload(&reply).map_err(|e| ControlError::Malformed(e.to_string()))
    }
}

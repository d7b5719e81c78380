//! Control server for local clients via Unix Domain Sockets.
//!
//! The server accepts one connection at a time. Each connection carries a
//! single NUL-terminated JSON request, answered with a single NUL-terminated
//! JSON response before the connection is closed.

use std::fs::Permissions;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use bytes::Bytes;
use protocol::{decode_payload, encode_frame, ControlRequest, ControlResponse, FrameDecoder, ProtocolError};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixSocket, UnixStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::ftp::EngineFactory;
use crate::router::ControlRouter;

/// Owner and group read/write/execute.
pub const SOCKET_MODE: u32 = 0o770;

/// Default listen backlog. Connections are served one at a time.
pub const DEFAULT_BACKLOG: u32 = 1;

/// Default time allowed for a client to send its full request.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(5);

const READ_CHUNK_SIZE: usize = 2048;

/// Errors that can occur during control channel communication.
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Framing or transport failure.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The request was not a valid control message.
    #[error("Malformed request: {0}")]
    Malformed(String),

    /// The daemon answered with `success: false`.
    #[error("command failed: {0}")]
    CommandFailed(String),
}

/// Read bytes until a complete NUL-terminated frame is buffered.
///
/// Oversized frames surface as [`ControlError::Malformed`]; a peer closing
/// before the terminator is a transport error.
pub(crate) async fn read_frame<R>(reader: &mut R) -> Result<Bytes, ControlError>
where
    R: AsyncRead + Unpin,
{
    let mut decoder = FrameDecoder::new();
    let mut buf = [0u8; READ_CHUNK_SIZE];

    loop {
        if let Some(frame) = decoder.next_frame() {
            return Ok(frame);
        }

        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Err(ProtocolError::ConnectionClosed(format!(
                "peer closed after {} bytes without terminator",
                decoder.buffered()
            ))
            .into());
        }

        decoder
            .extend(&buf[..n])
            .map_err(|e| ControlError::Malformed(e.to_string()))?;
    }
}

/// A server that listens for control connections on a Unix Domain Socket.
pub struct ControlServer {
    listener: UnixListener,
    path: PathBuf,
    read_timeout: Duration,
}

impl ControlServer {
    /// Bind the server to the specified socket path with [`DEFAULT_BACKLOG`].
    pub async fn bind(path: &Path) -> Result<Self, ControlError> {
        Self::bind_with_backlog(path, DEFAULT_BACKLOG).await
    }

    /// Bind the server to the specified socket path.
    ///
    /// Creates missing parent directories, removes a stale socket file,
    /// and restricts the new socket to owner and group.
    pub async fn bind_with_backlog(path: &Path, backlog: u32) -> Result<Self, ControlError> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        match std::fs::remove_file(path) {
            Ok(()) => debug!("Removed stale control socket {:?}", path),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let socket = UnixSocket::new_stream()?;
        socket.bind(path)?;
        let listener: UnixListener = socket.listen(backlog)?;
        std::fs::set_permissions(path, Permissions::from_mode(SOCKET_MODE))?;

        Ok(Self {
            listener,
            path: path.to_path_buf(),
            read_timeout: DEFAULT_READ_TIMEOUT,
        })
    }

    /// Set the per-connection read timeout.
    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    /// Path of the socket file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Accept a new incoming connection.
    pub async fn accept(&self) -> Result<ControlConnection, ControlError> {
        let (stream, _addr) = self.listener.accept().await?;
        Ok(ControlConnection::new(stream, self.read_timeout))
    }

    /// Serve connections one at a time until `shutdown` is cancelled.
    ///
    /// Per-connection failures are logged and never end the loop. The
    /// socket file is removed on exit.
    pub async fn serve<F: EngineFactory>(self, router: ControlRouter<F>, shutdown: CancellationToken) {
        info!("Control server started at {:?}", self.path);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("Control server received shutdown signal");
                    break;
                }
                accepted = self.accept() => {
                    match accepted {
                        Ok(connection) => {
                            if let Err(e) = connection.handle(&router).await {
                                warn!("Unable to complete control exchange: {}", e);
                            }
                        }
                        Err(e) => warn!("Failed to accept control connection: {}", e),
                    }
                }
            }
        }

        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!("Failed to remove control socket {:?}: {}", self.path, e);
            }
        }
        info!("Control server stopped");
    }
}

/// A single control exchange with a client.
pub struct ControlConnection {
    stream: UnixStream,
    read_timeout: Duration,
}

impl ControlConnection {
    fn new(stream: UnixStream, read_timeout: Duration) -> Self {
        Self {
            stream,
            read_timeout,
        }
    }

    /// Read the request, waiting at most the read timeout.
    pub async fn read_request(&mut self) -> Result<ControlRequest, ControlError> {
        let frame = tokio::time::timeout(self.read_timeout, read_frame(&mut self.stream))
            .await
            .map_err(|_| ProtocolError::Timeout("control request not received in time".to_string()))??;

        decode_payload(&frame).map_err(|e| ControlError::Malformed(e.to_string()))
    }

    /// Write the response followed by the terminator, then close.
    pub async fn send_response(&mut self, response: &ControlResponse) -> Result<(), ControlError> {
        let frame = encode_frame(response)?;
        self.stream.write_all(&frame).await?;
        self.stream.flush().await?;
        self.stream.shutdown().await?;
        Ok(())
    }

    /// Read, dispatch and answer one request.
    ///
    /// Malformed requests are answered with a failure response. Transport
    /// failures are returned for the caller to log.
    pub async fn handle<F: EngineFactory>(mut self, router: &ControlRouter<F>) -> Result<(), ControlError> {
        let response = match self.read_request().await {
            Ok(request) => router.route(&request).await,
            Err(ControlError::Malformed(reason)) => {
                warn!("Malformed control request: {}", reason);
                ControlResponse::failure(format!("Malformed request: {}", reason))
            }
            Err(e) => return Err(e),
        };
        self.send_response(&response).await
    }
}

//! Transfer engine seam.
//!
//! The lifecycle controller drives an engine through [`TransferEngine`]:
//! it calls [`TransferEngine::serve`] repeatedly, each call bounded by the
//! poll timeout, and [`TransferEngine::close_all`] once a stop is requested.
//! [`TcpEngine`] is the listening engine shipped with the daemon; the
//! per-client protocol is delegated to a [`SessionHandler`].

use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio::time::Instant;

use crate::config::FtpConfig;
use crate::files::UnifiedFilesystem;

use super::authorizer::Authorizer;

/// Errors raised by a transfer engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The listening socket could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// The engine was used after `close_all`.
    #[error("engine is closed")]
    Closed,

    /// I/O failure while serving a client.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Where and how the engine listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    pub host: String,
    pub port: u16,
}

impl EngineSettings {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// `host:port` as written in logs and errors.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl From<&FtpConfig> for EngineSettings {
    fn from(config: &FtpConfig) -> Self {
        Self::new(config.host.clone(), config.port)
    }
}

/// A transfer engine driven in bounded polling steps.
pub trait TransferEngine: Send + 'static {
    /// Address the engine is listening on, if any.
    fn local_addr(&self) -> Option<SocketAddr>;

    /// Run one polling iteration, returning after at most `poll_timeout`.
    fn serve(&mut self, poll_timeout: Duration) -> impl Future<Output = Result<(), EngineError>> + Send;

    /// Release the listener and drop every in-flight client session.
    fn close_all(&mut self) -> impl Future<Output = ()> + Send;
}

/// Builds an engine each time the service starts.
pub trait EngineFactory: Send + Sync + 'static {
    type Engine: TransferEngine;

    /// Bind the engine and install the filesystem and authorizer into it.
    fn build(
        &self,
        settings: &EngineSettings,
        filesystem: UnifiedFilesystem,
        authorizer: Arc<Authorizer>,
    ) -> impl Future<Output = Result<Self::Engine, EngineError>> + Send;
}

/// Everything a client session needs from the engine.
pub struct ClientSession {
    pub stream: TcpStream,
    pub peer: SocketAddr,
    /// Per-session filesystem view with its own working directory.
    pub filesystem: UnifiedFilesystem,
    pub authorizer: Arc<Authorizer>,
}

/// Protocol handler invoked once per accepted client.
pub trait SessionHandler: Send + Sync + 'static {
    fn handle<'a>(
        &'a self,
        session: ClientSession,
    ) -> Pin<Box<dyn Future<Output = Result<(), EngineError>> + Send + 'a>>;
}

/// Session handler that greets the client and refuses service.
///
/// Used when no protocol handler is plugged in: clients see the banner
/// followed by a 421 reply and the connection is closed.
#[derive(Debug, Clone)]
pub struct BannerSession {
    banner: String,
}

impl BannerSession {
    pub fn new(banner: impl Into<String>) -> Self {
        Self {
            banner: banner.into(),
        }
    }
}

impl SessionHandler for BannerSession {
    fn handle<'a>(
        &'a self,
        mut session: ClientSession,
    ) -> Pin<Box<dyn Future<Output = Result<(), EngineError>> + Send + 'a>> {
        Box::pin(async move {
            let reply = format!(
                "220 {}\r\n421 Service not available, closing control connection.\r\n",
                self.banner
            );
            session.stream.write_all(reply.as_bytes()).await?;
            session.stream.shutdown().await?;
            tracing::debug!("Closed session from {}", session.peer);
            Ok(())
        })
    }
}

/// TCP listening engine.
pub struct TcpEngine {
    listener: Option<TcpListener>,
    local_addr: SocketAddr,
    handler: Arc<dyn SessionHandler>,
    filesystem: UnifiedFilesystem,
    authorizer: Arc<Authorizer>,
    sessions: JoinSet<()>,
}

impl TcpEngine {
    /// Bind a listener at `settings.host:settings.port`.
    pub async fn bind(
        settings: &EngineSettings,
        handler: Arc<dyn SessionHandler>,
        filesystem: UnifiedFilesystem,
        authorizer: Arc<Authorizer>,
    ) -> Result<Self, EngineError> {
        let addr = settings.address();
        let listener = TcpListener::bind((settings.host.as_str(), settings.port))
            .await
            .map_err(|source| EngineError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = listener.local_addr()?;

        Ok(Self {
            listener: Some(listener),
            local_addr,
            handler,
            filesystem,
            authorizer,
            sessions: JoinSet::new(),
        })
    }

    /// Number of client sessions still running.
    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    fn reap_sessions(&mut self) {
        while let Some(result) = self.sessions.try_join_next() {
            if let Err(e) = result {
                if e.is_panic() {
                    tracing::error!("Client session panicked: {}", e);
                }
            }
        }
    }
}

impl TransferEngine for TcpEngine {
    fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().map(|_| self.local_addr)
    }

    async fn serve(&mut self, poll_timeout: Duration) -> Result<(), EngineError> {
        self.reap_sessions();

        let Some(listener) = &self.listener else {
            return Err(EngineError::Closed);
        };

        let deadline = Instant::now() + poll_timeout;
        let Some((stream, peer)) = accept_until(listener.accept(), deadline).await else {
            return Ok(());
        };

        tracing::info!("Client connected from {}", peer);
        let session = ClientSession {
            stream,
            peer,
            filesystem: self.filesystem.clone(),
            authorizer: Arc::clone(&self.authorizer),
        };
        let handler = Arc::clone(&self.handler);
        self.sessions.spawn(async move {
            if let Err(e) = handler.handle(session).await {
                tracing::warn!("Session with {} ended with error: {}", peer, e);
            }
        });
        Ok(())
    }

    async fn close_all(&mut self) {
        self.listener = None;
        self.sessions.abort_all();
        while self.sessions.join_next().await.is_some() {}
        tracing::debug!("Transfer engine on {} closed", self.local_addr);
    }
}

/// Wait for `accept` until `deadline`.
///
/// A failed accept (EMFILE and the like) waits out the rest of the poll so a
/// persistent error cannot turn the serve loop into a busy spin.
async fn accept_until<T>(
    accept: impl Future<Output = std::io::Result<T>>,
    deadline: Instant,
) -> Option<T> {
    match tokio::time::timeout_at(deadline, accept).await {
        Ok(Ok(accepted)) => Some(accepted),
        Ok(Err(e)) => {
            tracing::warn!("Failed to accept client: {}", e);
            tokio::time::sleep_until(deadline).await;
            None
        }
        Err(_) => None,
    }
}

/// Factory producing [`TcpEngine`]s that share one session handler.
#[derive(Clone)]
pub struct TcpEngineFactory {
    handler: Arc<dyn SessionHandler>,
}

impl TcpEngineFactory {
    pub fn new(handler: Arc<dyn SessionHandler>) -> Self {
        Self { handler }
    }
}

impl EngineFactory for TcpEngineFactory {
    type Engine = TcpEngine;

    async fn build(
        &self,
        settings: &EngineSettings,
        filesystem: UnifiedFilesystem,
        authorizer: Arc<Authorizer>,
    ) -> Result<TcpEngine, EngineError> {
        TcpEngine::bind(settings, Arc::clone(&self.handler), filesystem, authorizer).await
    }
}

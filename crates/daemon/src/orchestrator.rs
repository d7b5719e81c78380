//! Daemon orchestrator for wiring together all components.
//!
//! This module provides the `DaemonOrchestrator` that builds the unified
//! filesystem, the user table, the settings store and the lifecycle
//! controller from the configuration, and runs the control server next to
//! the transfer service.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::Config;
use crate::files::{FilesystemConfig, UnifiedFilesystem};
use crate::ftp::{Authorizer, BannerSession, EngineFactory, EngineSettings, TcpEngineFactory};
use crate::ipc::ControlServer;
use crate::router::ControlRouter;
use crate::service::ServiceController;
use crate::settings::Settings;

/// Owns the transfer service and the control server of one daemon process.
pub struct DaemonOrchestrator<F: EngineFactory = TcpEngineFactory> {
    service: Arc<ServiceController<F>>,
    socket_path: PathBuf,
    backlog: u32,
    shutdown_token: CancellationToken,
    control_task: Option<JoinHandle<()>>,
}

impl DaemonOrchestrator<TcpEngineFactory> {
    /// Creates an orchestrator serving clients with the banner-only handler.
    pub fn new(config: &Config) -> Result<Self> {
        let factory = TcpEngineFactory::new(Arc::new(BannerSession::new(config.ftp.banner.clone())));
        Self::with_factory(config, factory)
    }
}

impl<F: EngineFactory> DaemonOrchestrator<F> {
    /// Creates an orchestrator around a custom engine factory.
    pub fn with_factory(config: &Config, factory: F) -> Result<Self> {
        let roots = config.roots();
        let filesystem = UnifiedFilesystem::new(
            FilesystemConfig::new(roots.clone()).with_blacklist(config.ftp.blacklist.iter().cloned()),
        )
        .context("Failed to build unified filesystem")?;
        info!("Serving {} root(s), writes go to {:?}", roots.len(), roots.last());

        // Every account is homed at the first root.
        let home = roots
            .first()
            .cloned()
            .context("At least one basepath expected")?;
        let authorizer = Authorizer::from_config(&config.ftp.users, config.ftp.anonymous, &home)
            .context("Failed to build user table")?;

        let settings_path = config.daemon.settings_path();
        let store = Arc::new(
            Settings::open(&settings_path)
                .with_context(|| format!("Failed to load settings: {}", settings_path.display()))?,
        );

        let service = ServiceController::new(
            factory,
            EngineSettings::from(&config.ftp),
            filesystem,
            Arc::new(authorizer),
            store,
        )
        .with_poll_interval(Duration::from_millis(config.ftp.poll_interval_ms));

        Ok(Self {
            service: Arc::new(service),
            socket_path: config.control.socket.clone(),
            backlog: config.control.backlog,
            shutdown_token: CancellationToken::new(),
            control_task: None,
        })
    }

    /// The lifecycle controller.
    pub fn service(&self) -> &Arc<ServiceController<F>> {
        &self.service
    }

    /// Path of the control socket.
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Binds the control socket and starts the service if it is enabled.
    pub async fn start(&mut self) -> Result<()> {
        if self.control_task.is_some() {
            anyhow::bail!("Orchestrator is already running");
        }
        if self.shutdown_token.is_cancelled() {
            self.shutdown_token = CancellationToken::new();
        }

        let server = ControlServer::bind_with_backlog(&self.socket_path, self.backlog)
            .await
            .with_context(|| format!("Failed to bind control socket: {}", self.socket_path.display()))?;

        if let Err(e) = self.service.start_if_enabled().await {
            // The control channel stays up so the service can be retried.
            warn!("{:#}", e);
        }

        let router = ControlRouter::new(Arc::clone(&self.service));
        let token = self.shutdown_token.clone();
        self.control_task = Some(tokio::spawn(server.serve(router, token)));

        info!("Daemon started");
        Ok(())
    }

    /// Stops the control server and the transfer service. Safe to call twice.
    pub async fn stop(&mut self) {
        self.shutdown_token.cancel();
        if let Some(task) = self.control_task.take() {
            if let Err(e) = task.await {
                warn!("Control server task failed: {}", e);
            }
        }
        self.service.stop().await;
        info!("Daemon stopped");
    }
}

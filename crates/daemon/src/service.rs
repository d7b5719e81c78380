//! Lifecycle controller for the file transfer service.
//!
//! The [`ServiceController`] owns the running engine instance and the
//! durable enabled flag. Every start, stop and enable decision goes through
//! one mutex, so overlapping control requests cannot double-start an engine
//! or orphan a running one.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::files::UnifiedFilesystem;
use crate::ftp::{Authorizer, EngineFactory, EngineSettings, TransferEngine};
use crate::settings::Settings;

/// Default engine poll interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Transfer service state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    /// Not serving.
    Stopped,
    /// Building and binding the engine.
    Starting,
    /// Engine loop is running.
    Running,
    /// Waiting for the engine loop to exit.
    Stopping,
}

/// Events emitted by the controller.
#[derive(Debug, Clone)]
pub enum ServiceEvent {
    /// Service state changed.
    StateChanged(ServiceState),
    /// The durable enabled flag changed.
    EnabledChanged(bool),
}

struct RunningEngine {
    token: CancellationToken,
    handle: JoinHandle<()>,
    local_addr: Option<SocketAddr>,
}

/// Starts, stops and reports on the transfer engine.
pub struct ServiceController<F: EngineFactory> {
    factory: F,
    engine_settings: EngineSettings,
    filesystem: UnifiedFilesystem,
    authorizer: Arc<Authorizer>,
    store: Arc<Settings>,
    poll_interval: Duration,
    state: Arc<RwLock<ServiceState>>,
    running: Mutex<Option<RunningEngine>>,
    event_tx: broadcast::Sender<ServiceEvent>,
}

impl<F: EngineFactory> ServiceController<F> {
    /// Creates a stopped controller.
    pub fn new(
        factory: F,
        engine_settings: EngineSettings,
        filesystem: UnifiedFilesystem,
        authorizer: Arc<Authorizer>,
        store: Arc<Settings>,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(64);
        Self {
            factory,
            engine_settings,
            filesystem,
            authorizer,
            store,
            poll_interval: DEFAULT_POLL_INTERVAL,
            state: Arc::new(RwLock::new(ServiceState::Stopped)),
            running: Mutex::new(None),
            event_tx,
        }
    }

    /// Sets how long one engine poll may block. Bounds the latency of `stop()`.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Returns the current state.
    pub async fn state(&self) -> ServiceState {
        *self.state.read().await
    }

    /// Returns a receiver for controller events.
    pub fn subscribe(&self) -> broadcast::Receiver<ServiceEvent> {
        self.event_tx.subscribe()
    }

    /// Whether the durable enabled flag is set.
    pub fn is_enabled(&self) -> bool {
        self.store.ftp_enabled()
    }

    /// Enabled and currently running.
    pub async fn status(&self) -> bool {
        self.is_enabled() && self.state().await == ServiceState::Running
    }

    /// Address the running engine listens on.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.running
            .lock()
            .await
            .as_ref()
            .and_then(|running| running.local_addr)
    }

    /// Starts the engine. No-op if it is already running.
    pub async fn start(&self) -> Result<()> {
        let mut running = self.running.lock().await;
        self.start_locked(&mut running).await
    }

    /// Stops the engine and waits for its loop to exit. No-op if stopped.
    pub async fn stop(&self) {
        let mut running = self.running.lock().await;
        self.stop_locked(&mut running).await;
    }

    /// Starts the engine if the persisted flag says it should run.
    pub async fn start_if_enabled(&self) -> Result<()> {
        if self.is_enabled() {
            self.start().await
        } else {
            info!("FTP server is disabled, not starting");
            Ok(())
        }
    }

    /// Persists the enabled flag, then starts or stops the engine to match.
    pub async fn set_enabled(&self, enabled: bool) -> Result<()> {
        let mut running = self.running.lock().await;

        self.store
            .set_ftp_enabled(enabled)
            .context("Failed to persist ftp_enabled setting")?;
        self.emit_event(ServiceEvent::EnabledChanged(enabled));

        if enabled {
            self.start_locked(&mut running).await
        } else {
            self.stop_locked(&mut running).await;
            Ok(())
        }
    }

    async fn start_locked(&self, running: &mut Option<RunningEngine>) -> Result<()> {
        if let Some(current) = running.as_ref() {
            if !current.handle.is_finished() {
                debug!("FTP server already running");
                return Ok(());
            }
        }
        // An engine loop that exited on its own leaves its handle behind.
        if let Some(finished) = running.take() {
            let _ = finished.handle.await;
        }

        self.set_state(ServiceState::Starting).await;

        let engine = match self
            .factory
            .build(
                &self.engine_settings,
                self.filesystem.clone(),
                Arc::clone(&self.authorizer),
            )
            .await
        {
            Ok(engine) => engine,
            Err(e) => {
                self.set_state(ServiceState::Stopped).await;
                return Err(e).context("Failed to start FTP server");
            }
        };

        let local_addr = engine.local_addr();
        let token = CancellationToken::new();

        // Running is published before the loop exists so a loop that fails
        // immediately can still move the state back to Stopped.
        self.set_state(ServiceState::Running).await;

        let handle = tokio::spawn(run_engine(
            engine,
            token.clone(),
            self.poll_interval,
            Arc::clone(&self.state),
            self.event_tx.clone(),
        ));

        *running = Some(RunningEngine {
            token,
            handle,
            local_addr,
        });

        match local_addr {
            Some(addr) => info!("FTP server started on {}", addr),
            None => info!("FTP server started on {}", self.engine_settings.address()),
        }
        Ok(())
    }

    async fn stop_locked(&self, running: &mut Option<RunningEngine>) {
        let Some(current) = running.take() else {
            return;
        };

        self.set_state(ServiceState::Stopping).await;
        current.token.cancel();

        if let Err(e) = current.handle.await {
            error!("FTP server loop terminated abnormally: {}", e);
        }

        self.set_state(ServiceState::Stopped).await;
        info!("FTP server stopped");
    }

    async fn set_state(&self, new_state: ServiceState) {
        *self.state.write().await = new_state;
        self.emit_event(ServiceEvent::StateChanged(new_state));
    }

    fn emit_event(&self, event: ServiceEvent) {
        // No subscribers is fine.
        let _ = self.event_tx.send(event);
    }
}

/// Engine loop: poll until cancelled, then release the engine.
async fn run_engine<E: TransferEngine>(
    mut engine: E,
    token: CancellationToken,
    poll_interval: Duration,
    state: Arc<RwLock<ServiceState>>,
    event_tx: broadcast::Sender<ServiceEvent>,
) {
    while !token.is_cancelled() {
        if let Err(e) = engine.serve(poll_interval).await {
            error!("FTP server loop failed: {}", e);
            break;
        }
    }

    engine.close_all().await;

    if !token.is_cancelled() {
        *state.write().await = ServiceState::Stopped;
        let _ = event_tx.send(ServiceEvent::StateChanged(ServiceState::Stopped));
    }
}

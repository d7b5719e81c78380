//! Control request router.
//!
//! This module provides the `ControlRouter` that receives decoded control
//! requests and dispatches them to the lifecycle controller by command name.

use std::sync::Arc;

use protocol::{Command, ControlRequest, ControlResponse};
use tracing::{debug, info, warn};

use crate::ftp::EngineFactory;
use crate::service::ServiceController;

/// Dispatches control requests to the [`ServiceController`].
pub struct ControlRouter<F: EngineFactory> {
    service: Arc<ServiceController<F>>,
}

impl<F: EngineFactory> Clone for ControlRouter<F> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
        }
    }
}

impl<F: EngineFactory> ControlRouter<F> {
    /// Creates a router for `service`.
    pub fn new(service: Arc<ServiceController<F>>) -> Self {
        Self { service }
    }

    /// The controller requests are routed to.
    pub fn service(&self) -> &Arc<ServiceController<F>> {
        &self.service
    }

    /// Handle one request and produce its response.
    ///
    /// Never fails: every problem becomes a `success: false` response.
    pub async fn route(&self, request: &ControlRequest) -> ControlResponse {
        let command = match request.parsed_command() {
            Ok(command) => command,
            Err(e) => {
                warn!("Rejecting control request: {}", e);
                return e.into();
            }
        };

        debug!("Handling control command {}", command);
        match command {
            Command::EnableFtp => self.handle_enable(true).await,
            Command::DisableFtp => self.handle_enable(false).await,
            Command::StatusFtp => ControlResponse::with_status(self.service.status().await),
        }
    }

    async fn handle_enable(&self, enabled: bool) -> ControlResponse {
        match self.service.set_enabled(enabled).await {
            Ok(()) => {
                info!("FTP server {} via control channel", if enabled { "enabled" } else { "disabled" });
                ControlResponse::ok()
            }
            Err(e) => {
                warn!("Failed to set ftp enabled={}: {:#}", enabled, e);
                ControlResponse::failure(format!("{:#}", e))
            }
        }
    }
}

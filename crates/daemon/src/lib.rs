//! # uniftp Daemon Library
//!
//! This crate provides the daemon side of uniftp: a file server that
//! presents several directories as one tree and can be switched on and off
//! at runtime by local tools.
//!
//! ## Overview
//!
//! - **Unified Filesystem**: several roots merged into one virtual tree; the
//!   first root holding a path wins for reads, new entries go to the last root
//! - **Blacklist**: case-insensitive patterns hiding paths from every operation
//! - **Lifecycle Controller**: starts and stops the transfer engine and keeps
//!   the durable `ftp_enabled` flag
//! - **Control Channel**: NUL-framed JSON commands over a Unix socket
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Daemon Orchestrator                         │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                  │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────────────┐  │
//! │  │   Control    │─▶│   Control    │─▶│  Service Controller  │  │
//! │  │   Server     │  │   Router     │  │  (+ Settings store)  │  │
//! │  └──────────────┘  └──────────────┘  └──────────┬───────────┘  │
//! │                                                 │              │
//! │  ┌──────────────────────────────────────────────▼───────────┐  │
//! │  │          Transfer Engine (TcpEngine + SessionHandler)    │  │
//! │  └──────────────────────────────────────────────┬───────────┘  │
//! │                                                 │              │
//! │  ┌──────────────────────┐  ┌────────────────────▼───────────┐  │
//! │  │      Authorizer      │  │       Unified Filesystem       │  │
//! │  └──────────────────────┘  └────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use daemon::{Config, DaemonOrchestrator};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load_default()?;
//!
//!     let mut orchestrator = DaemonOrchestrator::new(&config)?;
//!     orchestrator.start().await?;
//!
//!     // Serve until told to stop...
//!
//!     orchestrator.stop().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`config`]: Configuration loading and defaults
//! - [`files`]: Unified multi-root filesystem, path resolver, blacklist
//! - [`ftp`]: Authorizer and transfer engine seam
//! - [`service`]: Transfer service lifecycle controller
//! - [`settings`]: Durable JSON settings store
//! - [`router`]: Control command dispatch
//! - [`ipc`]: Unix socket control server and client
//! - [`orchestrator`]: Main daemon coordinator

pub mod config;
pub mod files;
pub mod ftp;
pub mod ipc;
pub mod orchestrator;
pub mod router;
pub mod service;
pub mod settings;

// Re-export protocol for convenience
pub use protocol;

// Re-export config types for convenience
pub use config::Config;

// Re-export files types for convenience
pub use files::{
    Blacklist, FilesystemConfig, FilesystemOps, FsError, FsResult, OpenMode, UnifiedFilesystem,
    VirtualPathResolver,
};

// Re-export ftp types for convenience
pub use ftp::{Authorizer, EngineFactory, EngineSettings, TcpEngineFactory, TransferEngine};

// Re-export lifecycle types for convenience
pub use service::{ServiceController, ServiceEvent, ServiceState};
pub use settings::Settings;

// Re-export control channel types for convenience
pub use ipc::{ControlClient, ControlError, ControlServer};
pub use router::ControlRouter;

// Re-export orchestrator types for convenience
pub use orchestrator::DaemonOrchestrator;

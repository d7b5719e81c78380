//! Unix Domain Socket control channel.
//!
//! Local clients toggle and query the transfer service through this
//! channel. Each connection carries exactly one exchange:
//!
//! ```text
//! client -> {"command": "enable_ftp", "params": {}}\0
//! daemon -> {"success": true}\0
//! ```
//!
//! ## Socket Path
//!
//! - Primary: `$XDG_RUNTIME_DIR/uniftp/control.sock`
//! - Fallback: `/tmp/uniftp-$UID/control.sock`
//!
//! ## Example
//!
//! ```rust,no_run
//! use daemon::ipc::{get_socket_path, ControlClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = ControlClient::new(get_socket_path());
//!     client.enable_ftp().await?;
//!     println!("running: {}", client.status_ftp().await?);
//!     Ok(())
//! }
//! ```

mod client;
mod server;

pub use client::ControlClient;
pub use server::{
    ControlConnection, ControlError, ControlServer, DEFAULT_BACKLOG, DEFAULT_READ_TIMEOUT, SOCKET_MODE,
};

use std::path::PathBuf;

/// Get the default control socket path.
///
/// 1. If `$XDG_RUNTIME_DIR` is set: `$XDG_RUNTIME_DIR/uniftp/control.sock`
/// 2. Otherwise: `/tmp/uniftp-$UID/control.sock`
pub fn get_socket_path() -> PathBuf {
    use std::os::unix::fs::MetadataExt;

    if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
        PathBuf::from(runtime_dir).join("uniftp").join("control.sock")
    } else {
        // Get UID by checking metadata of a file we own
        let uid = std::fs::metadata("/proc/self")
            .map(|m| m.uid())
            .unwrap_or(0);

        PathBuf::from(format!("/tmp/uniftp-{}", uid)).join("control.sock")
    }
}

//! Configuration management for the uniftp daemon.
//!
//! This module provides TOML-based configuration file loading and saving.
//! The default configuration path is `~/.config/uniftp/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::files::resolver::normalize;
use crate::files::Blacklist;
use crate::ftp::authorizer::{invalid_perm_letter, DEFAULT_USER_PERM};

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("ftp.basepaths must contain at least one directory")]
    NoBasepaths,

    #[error("ftp.basepaths entries must be absolute, got {0}")]
    RelativeBasepath(String),

    #[error("ftp.port must be greater than 0")]
    InvalidPort,

    #[error("ftp.poll_interval_ms must be between 1 and 10000, got {0}")]
    InvalidPollInterval(u64),

    #[error("ftp.blacklist pattern {pattern:?} is invalid: {reason}")]
    InvalidBlacklistPattern { pattern: String, reason: String },

    #[error("permission {perm:?} for user {username} contains unknown letter {letter:?}")]
    InvalidPermission {
        username: String,
        perm: String,
        letter: char,
    },

    #[error("log_level must be one of: trace, debug, info, warn, error; got {0}")]
    InvalidLogLevel(String),
}

/// Valid log level values for tracing configuration.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Upper bound for the engine poll interval.
const MAX_POLL_INTERVAL_MS: u64 = 10_000;

/// Main configuration structure for the uniftp daemon.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// General daemon configuration.
    pub daemon: DaemonConfig,

    /// File transfer service configuration.
    pub ftp: FtpConfig,

    /// Control channel configuration.
    pub control: ControlConfig,
}

/// General daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DaemonConfig {
    /// Directory for storing daemon data (settings, logs).
    pub data_dir: PathBuf,

    /// Logging level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Directory for daily rotated log files. Console only when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,

    /// Settings file path. Defaults to `data_dir/settings.json`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settings_path: Option<PathBuf>,
}

/// A configured FTP account.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserConfig {
    pub username: String,

    /// Hex-encoded SHA-256 digest of the password.
    pub password_sha256: String,

    /// Permission letters.
    #[serde(default = "default_user_perm")]
    pub perm: String,
}

/// Transfer service configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FtpConfig {
    /// Bind address for the transfer engine.
    pub host: String,

    /// Bind port for the transfer engine.
    pub port: u16,

    /// Root directories in precedence order. The last one receives writes.
    pub basepaths: Vec<PathBuf>,

    /// Optional subdirectory joined onto every basepath.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chroot: Option<PathBuf>,

    /// Case-insensitive patterns hiding matching virtual paths.
    pub blacklist: Vec<String>,

    /// Engine poll interval bounding how long a stop request can wait.
    pub poll_interval_ms: u64,

    /// Greeting line sent to connecting clients.
    pub banner: String,

    /// Allow anonymous read-only access.
    pub anonymous: bool,

    /// Named accounts.
    pub users: Vec<UserConfig>,
}

/// Control channel configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ControlConfig {
    /// Path of the control Unix socket.
    pub socket: PathBuf,

    /// Listen backlog of the control socket. Connections are served one at a time.
    pub backlog: u32,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            log_level: "info".to_string(),
            log_dir: None,
            settings_path: None,
        }
    }
}

impl Default for FtpConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 2121,
            basepaths: vec![default_data_dir().join("share")],
            chroot: None,
            blacklist: Vec::new(),
            poll_interval_ms: 500,
            banner: "uniftp ready".to_string(),
            anonymous: true,
            users: Vec::new(),
        }
    }
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            socket: crate::ipc::get_socket_path(),
            backlog: crate::ipc::DEFAULT_BACKLOG,
        }
    }
}

/// Returns the default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("uniftp")
        .join("config.toml")
}

/// Returns the default data directory path.
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("uniftp")
}

fn default_user_perm() -> String {
    DEFAULT_USER_PERM.to_string()
}

impl DaemonConfig {
    /// Effective settings file path.
    pub fn settings_path(&self) -> PathBuf {
        self.settings_path
            .clone()
            .unwrap_or_else(|| self.data_dir.join("settings.json"))
    }
}

/// Environment variable overriding `daemon.log_level`.
pub const LOG_LEVEL_ENV: &str = "UNIFTP_LOG_LEVEL";

/// Log level requested through [`LOG_LEVEL_ENV`], if set and non-empty.
///
/// Read before the subscriber is installed, ahead of the other overrides.
pub fn env_log_level() -> Option<String> {
    std::env::var(LOG_LEVEL_ENV).ok().filter(|level| !level.is_empty())
}

impl Config {
    /// Apply environment variable overrides to the configuration.
    ///
    /// Environment variables take precedence over config file values.
    /// Supported variables:
    /// - UNIFTP_LOG_LEVEL: Override log level (trace, debug, info, warn, error)
    /// - UNIFTP_FTP_PORT: Override the transfer engine port
    /// - UNIFTP_CONTROL_SOCKET: Override the control socket path
    pub fn apply_env_overrides(&mut self) {
        if let Some(level) = env_log_level() {
            tracing::info!("Overriding log_level from environment: {}", level);
            self.daemon.log_level = level;
        }

        if let Ok(port) = std::env::var("UNIFTP_FTP_PORT") {
            match port.parse::<u16>() {
                Ok(port) => {
                    tracing::info!("Overriding ftp.port from environment: {}", port);
                    self.ftp.port = port;
                }
                Err(_) if port.is_empty() => {}
                Err(e) => tracing::warn!("Ignoring UNIFTP_FTP_PORT={:?}: {}", port, e),
            }
        }

        if let Ok(socket) = std::env::var("UNIFTP_CONTROL_SOCKET") {
            if !socket.is_empty() {
                tracing::info!("Overriding control.socket from environment: {}", socket);
                self.control.socket = PathBuf::from(socket);
            }
        }
    }

    /// Validate the configuration values.
    ///
    /// Basepaths need not exist yet; missing ones are reported when the
    /// filesystem is built.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ftp.basepaths.is_empty() {
            return Err(ConfigError::NoBasepaths);
        }
        if let Some(relative) = self.ftp.basepaths.iter().find(|p| !p.is_absolute()) {
            return Err(ConfigError::RelativeBasepath(
                relative.display().to_string(),
            ));
        }

        if self.ftp.port == 0 {
            return Err(ConfigError::InvalidPort);
        }

        let poll = self.ftp.poll_interval_ms;
        if poll == 0 || poll > MAX_POLL_INTERVAL_MS {
            return Err(ConfigError::InvalidPollInterval(poll));
        }

        for pattern in &self.ftp.blacklist {
            if let Err(e) = Blacklist::new([pattern]) {
                return Err(ConfigError::InvalidBlacklistPattern {
                    pattern: pattern.clone(),
                    reason: e.to_string(),
                });
            }
        }

        for user in &self.ftp.users {
            if let Some(letter) = invalid_perm_letter(&user.perm) {
                return Err(ConfigError::InvalidPermission {
                    username: user.username.clone(),
                    perm: user.perm.clone(),
                    letter,
                });
            }
        }

        let level = self.daemon.log_level.to_lowercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.daemon.log_level.clone()));
        }

        Ok(())
    }

    /// Effective root list: each basepath joined with the chroot suffix,
    /// normalized, in configured order.
    pub fn roots(&self) -> Vec<PathBuf> {
        self.ftp
            .basepaths
            .iter()
            .map(|base| match &self.ftp.chroot {
                Some(chroot) => {
                    let suffix = chroot.strip_prefix("/").unwrap_or(chroot.as_path());
                    normalize(&base.join(suffix))
                }
                None => normalize(base),
            })
            .collect()
    }

    /// Load configuration from a file.
    ///
    /// If the file does not exist, returns the default configuration.
    /// If the file exists but is invalid TOML, returns an error with
    /// a helpful message.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self> {
        Self::load(default_config_path())
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| anyhow::anyhow!("Invalid TOML configuration: {}", format_toml_error(&e)))
    }

    /// Save configuration to a file.
    ///
    /// Creates parent directories if they don't exist.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let contents = self.to_toml()?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::debug!("Configuration saved to {:?}", path);
        Ok(())
    }

    /// Serialize configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")
    }
}

/// Format a TOML deserialization error for user-friendly display.
fn format_toml_error(error: &toml::de::Error) -> String {
    let mut msg = error.message().to_string();

    if let Some(span) = error.span() {
        msg.push_str(&format!(" (at position {}..{})", span.start, span.end));
    }

    msg
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    fn clear_env() {
        std::env::remove_var("UNIFTP_LOG_LEVEL");
        std::env::remove_var("UNIFTP_FTP_PORT");
        std::env::remove_var("UNIFTP_CONTROL_SOCKET");
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.daemon.log_level, "info");
        assert_eq!(config.ftp.host, "0.0.0.0");
        assert_eq!(config.ftp.port, 2121);
        assert_eq!(config.ftp.poll_interval_ms, 500);
        assert_eq!(config.ftp.basepaths.len(), 1);
        assert!(config.ftp.anonymous);
        assert!(config.ftp.blacklist.is_empty());
        assert_eq!(config.control.backlog, 1);
        assert!(config.control.socket.to_string_lossy().ends_with("control.sock"));
    }

    #[test]
    fn test_default_daemon_config() {
        let config = DaemonConfig::default();
        assert!(config.data_dir.to_string_lossy().contains("uniftp"));
        assert_eq!(config.settings_path(), config.data_dir.join("settings.json"));
    }

    #[test]
    fn test_from_toml_empty() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_from_toml_partial() {
        let toml = r#"
[daemon]
log_level = "debug"

[ftp]
port = 2200
"#;
        let config = Config::from_toml(toml).unwrap();

        assert_eq!(config.daemon.log_level, "debug");
        assert_eq!(config.ftp.port, 2200);
        assert_eq!(config.ftp.host, "0.0.0.0");
    }

    #[test]
    fn test_from_toml_full() {
        let toml = r#"
[daemon]
data_dir = "/custom/data"
log_level = "trace"
log_dir = "/var/log/uniftp"
settings_path = "/custom/settings.json"

[ftp]
host = "127.0.0.1"
port = 21
basepaths = ["/mnt/internal", "/mnt/sdcard"]
chroot = "media"
blacklist = ["^\\.", "lost\\+found"]
poll_interval_ms = 250
banner = "hello"
anonymous = false

[[ftp.users]]
username = "alice"
password_sha256 = "5e884898da28047151d0e56f8dc6292773603d0d6aabbdd62a11ef721d1542d8"
perm = "elr"

[control]
socket = "/run/uniftp/control.sock"
backlog = 4
"#;
        let config = Config::from_toml(toml).unwrap();

        assert_eq!(config.daemon.data_dir, PathBuf::from("/custom/data"));
        assert_eq!(config.daemon.log_dir, Some(PathBuf::from("/var/log/uniftp")));
        assert_eq!(config.daemon.settings_path(), PathBuf::from("/custom/settings.json"));
        assert_eq!(config.ftp.host, "127.0.0.1");
        assert_eq!(config.ftp.port, 21);
        assert_eq!(
            config.ftp.basepaths,
            vec![PathBuf::from("/mnt/internal"), PathBuf::from("/mnt/sdcard")]
        );
        assert_eq!(config.ftp.chroot, Some(PathBuf::from("media")));
        assert_eq!(config.ftp.blacklist.len(), 2);
        assert_eq!(config.ftp.poll_interval_ms, 250);
        assert!(!config.ftp.anonymous);
        assert_eq!(config.ftp.users.len(), 1);
        assert_eq!(config.ftp.users[0].perm, "elr");
        assert_eq!(config.control.socket, PathBuf::from("/run/uniftp/control.sock"));
        assert_eq!(config.control.backlog, 4);
    }

    #[test]
    fn test_user_perm_defaults() {
        let toml = r#"
[[ftp.users]]
username = "bob"
password_sha256 = "00"
"#;
        let config = Config::from_toml(toml).unwrap();
        assert_eq!(config.ftp.users[0].perm, DEFAULT_USER_PERM);
    }

    #[test]
    fn test_from_toml_invalid_syntax() {
        let toml = r#"
[daemon
log_level = "debug"
"#;
        let result = Config::from_toml(toml);
        assert!(result.is_err());
        let err = result.unwrap_err().to_string();
        assert!(err.contains("Invalid TOML"));
    }

    #[test]
    fn test_from_toml_wrong_type() {
        let toml = r#"
[ftp]
port = "not a number"
"#;
        assert!(Config::from_toml(toml).is_err());
    }

    #[test]
    fn test_roundtrip_custom() {
        let mut original = Config::default();
        original.daemon.log_level = "warn".to_string();
        original.ftp.basepaths = vec![PathBuf::from("/a"), PathBuf::from("/b")];
        original.ftp.chroot = Some(PathBuf::from("sub"));
        original.ftp.blacklist = vec!["^secret".to_string()];

        let toml = original.to_toml().unwrap();
        let loaded = Config::from_toml(&toml).unwrap();

        assert_eq!(original, loaded);
    }

    #[test]
    fn test_load_missing_file() {
        let config = Config::load("/nonexistent/path/config.toml").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested").join("config.toml");

        let mut original = Config::default();
        original.ftp.port = 2345;

        original.save(&config_path).unwrap();
        let loaded = Config::load(&config_path).unwrap();

        assert_eq!(original, loaded);
    }

    #[test]
    fn test_load_invalid_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");

        fs::write(&config_path, "invalid [ toml").unwrap();

        let result = Config::load(&config_path);
        assert!(result.is_err());
        let err = format!("{:#}", result.unwrap_err());
        assert!(err.contains("Failed to parse config file"));
    }

    #[test]
    fn test_default_config_path() {
        let path = default_config_path();
        assert!(path.to_string_lossy().contains("uniftp"));
        assert!(path.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn test_roots_without_chroot() {
        let mut config = Config::default();
        config.ftp.basepaths = vec![PathBuf::from("/data1/"), PathBuf::from("/data2")];
        assert_eq!(
            config.roots(),
            vec![PathBuf::from("/data1"), PathBuf::from("/data2")]
        );
    }

    #[test]
    fn test_roots_with_chroot() {
        let mut config = Config::default();
        config.ftp.basepaths = vec![PathBuf::from("/data1"), PathBuf::from("/data2")];
        config.ftp.chroot = Some(PathBuf::from("/media/./shared"));
        assert_eq!(
            config.roots(),
            vec![
                PathBuf::from("/data1/media/shared"),
                PathBuf::from("/data2/media/shared")
            ]
        );
    }

    #[test]
    #[serial]
    fn test_env_override_log_level() {
        clear_env();
        std::env::set_var("UNIFTP_LOG_LEVEL", "debug");

        let mut config = Config::default();
        config.apply_env_overrides();
        assert_eq!(config.daemon.log_level, "debug");

        clear_env();
    }

    #[test]
    #[serial]
    fn test_env_log_level_ignores_empty() {
        clear_env();
        assert_eq!(env_log_level(), None);

        std::env::set_var(LOG_LEVEL_ENV, "");
        assert_eq!(env_log_level(), None);

        std::env::set_var(LOG_LEVEL_ENV, "warn");
        assert_eq!(env_log_level().as_deref(), Some("warn"));

        clear_env();
    }

    #[test]
    #[serial]
    fn test_env_override_port_and_socket() {
        clear_env();
        std::env::set_var("UNIFTP_FTP_PORT", "2999");
        std::env::set_var("UNIFTP_CONTROL_SOCKET", "/tmp/custom.sock");

        let mut config = Config::default();
        config.apply_env_overrides();
        assert_eq!(config.ftp.port, 2999);
        assert_eq!(config.control.socket, PathBuf::from("/tmp/custom.sock"));

        clear_env();
    }

    #[test]
    #[serial]
    fn test_env_override_invalid_port_ignored() {
        clear_env();
        std::env::set_var("UNIFTP_FTP_PORT", "not-a-port");

        let mut config = Config::default();
        config.apply_env_overrides();
        assert_eq!(config.ftp.port, 2121);

        clear_env();
    }

    #[test]
    #[serial]
    fn test_env_override_empty_does_not_override() {
        clear_env();
        std::env::set_var("UNIFTP_LOG_LEVEL", "");

        let mut config = Config::default();
        config.apply_env_overrides();
        assert_eq!(config.daemon.log_level, "info");

        clear_env();
    }

    #[test]
    fn test_validate_default_config() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_basepaths() {
        let mut config = Config::default();
        config.ftp.basepaths.clear();
        assert_eq!(config.validate(), Err(ConfigError::NoBasepaths));

        config.ftp.basepaths = vec![PathBuf::from("relative/dir")];
        assert_eq!(
            config.validate(),
            Err(ConfigError::RelativeBasepath("relative/dir".to_string()))
        );
    }

    #[test]
    fn test_validate_port_zero() {
        let mut config = Config::default();
        config.ftp.port = 0;
        assert_eq!(config.validate(), Err(ConfigError::InvalidPort));
    }

    #[test]
    fn test_validate_poll_interval_bounds() {
        let mut config = Config::default();

        config.ftp.poll_interval_ms = 0;
        assert_eq!(config.validate(), Err(ConfigError::InvalidPollInterval(0)));

        config.ftp.poll_interval_ms = 10_001;
        assert_eq!(config.validate(), Err(ConfigError::InvalidPollInterval(10_001)));

        config.ftp.poll_interval_ms = 1;
        assert!(config.validate().is_ok());

        config.ftp.poll_interval_ms = 10_000;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_blacklist_pattern() {
        let mut config = Config::default();
        config.ftp.blacklist = vec!["ok".to_string(), "(broken".to_string()];
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidBlacklistPattern { pattern, .. }) if pattern == "(broken"
        ));
    }

    #[test]
    fn test_validate_user_permissions() {
        let mut config = Config::default();
        config.ftp.users = vec![UserConfig {
            username: "carol".to_string(),
            password_sha256: String::new(),
            perm: "elrZ".to_string(),
        }];
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidPermission { letter: 'Z', .. })
        ));
    }

    #[test]
    fn test_validate_log_level() {
        let mut config = Config::default();
        config.daemon.log_level = "verbose".to_string();
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidLogLevel("verbose".to_string()))
        );

        config.daemon.log_level = "DEBUG".to_string();
        assert!(config.validate().is_ok());
    }
}

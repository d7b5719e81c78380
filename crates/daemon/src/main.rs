//! uniftp daemon
//!
//! Serves a unified multi-root file tree and accepts runtime control
//! commands over a local Unix socket.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use daemon::config::{env_log_level, Config};
use daemon::ipc::ControlClient;
use daemon::orchestrator::DaemonOrchestrator;
use daemon::service::ServiceEvent;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Name of the rolling log file written under `daemon.log_dir`.
const LOG_FILE_NAME: &str = "uniftpd.log";

/// uniftp daemon - unified multi-root file server.
#[derive(Parser, Debug)]
#[command(name = "uniftpd")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for the daemon.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Run the daemon in the foreground
    Run,

    /// Enable the FTP service of a running daemon
    Enable,

    /// Disable the FTP service of a running daemon
    Disable,

    /// Show whether the FTP service is running
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = match &cli.config {
        Some(config_path) => Config::load(config_path)?,
        None => Config::load_default()?,
    };

    // Logging first so the override messages below are recorded
    let _guard = init_logging(cli.verbose, &config)?;
    if let Some(config_path) = &cli.config {
        tracing::info!("Using config file: {:?}", config_path);
    }

    // Apply environment variable overrides
    config.apply_env_overrides();

    // Validate configuration
    config.validate()?;

    match cli.command {
        Commands::Run => run_daemon(&config).await,
        Commands::Enable => {
            client(&config).enable_ftp().await?;
            println!("FTP service enabled");
            Ok(())
        }
        Commands::Disable => {
            client(&config).disable_ftp().await?;
            println!("FTP service disabled");
            Ok(())
        }
        Commands::Status => {
            let running = client(&config).status_ftp().await?;
            println!("FTP service: {}", if running { "running" } else { "stopped" });
            Ok(())
        }
    }
}

/// Build the filter directive from the verbose flag, the environment
/// override and the configured level, in that order.
fn log_filter(verbose: bool, config: &Config) -> String {
    if verbose {
        "debug".to_string()
    } else {
        env_log_level()
            .unwrap_or_else(|| config.daemon.log_level.clone())
            .to_lowercase()
    }
}

/// Install the console layer and, when `log_dir` is set, a daily rolling file.
///
/// `RUST_LOG` takes precedence over both the flag and the config. The
/// returned guard must stay alive for buffered file output to be flushed.
fn init_logging(verbose: bool, config: &Config) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| log_filter(verbose, config).into());

    match &config.daemon.log_dir {
        Some(log_dir) => {
            std::fs::create_dir_all(log_dir)
                .with_context(|| format!("Failed to create log directory: {}", log_dir.display()))?;
            let file_appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_NAME);
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
                .with(fmt::layer().with_writer(std::io::stderr))
                .try_init()
                .context("Failed to install log subscriber")?;
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .try_init()
                .context("Failed to install log subscriber")?;
            Ok(None)
        }
    }
}

fn client(config: &Config) -> ControlClient {
    ControlClient::new(&config.control.socket)
}

/// Run the daemon until SIGINT or SIGTERM.
async fn run_daemon(config: &Config) -> anyhow::Result<()> {
    tracing::info!("uniftp daemon starting...");

    let mut orchestrator = DaemonOrchestrator::new(config)?;

    // Subscribe before starting so the initial transition is logged
    let mut events = orchestrator.service().subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                ServiceEvent::StateChanged(state) => {
                    tracing::info!("FTP service state: {:?}", state);
                }
                ServiceEvent::EnabledChanged(enabled) => {
                    tracing::info!("FTP service enabled flag: {}", enabled);
                }
            }
        }
    });

    orchestrator.start().await?;
    tracing::info!("Control socket listening at {:?}", orchestrator.socket_path());

    let signal_result = wait_for_shutdown_signal().await;
    orchestrator.stop().await;
    signal_result
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
async fn wait_for_shutdown_signal() -> anyhow::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).context("Failed to register SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("Failed to register SIGINT handler")?;

    tokio::select! {
        _ = sigterm.recv() => {
            tracing::info!("Received SIGTERM");
        }
        _ = sigint.recv() => {
            tracing::info!("Received SIGINT");
        }
    }
    Ok(())
}

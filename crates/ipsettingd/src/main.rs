// # ipsettingd - Static IP Setting Daemon
//
// Thin integration layer. The daemon is responsible for:
// 1. Reading configuration from environment variables
// 2. Initializing logging (preferred sink with stderr fallback)
// 3. Wiring the store and applier implementations
// 4. Starting the feature and waiting for shutdown signals
//
// All feature logic lives in ipsetting-core.
//
// ## Configuration
//
// All configuration is done via environment variables:
//
// - `XNIP_ENABLED`: advertise the capability to the host (true/false/1/0)
// - `XNIP_DEBUG`: reserved debug flag passed through to the feature
// - `XNIP_STORE`: store backend (xenbus, memory)
// - `XNIP_STORE_SOCKET`: xenstored socket path (for xenbus)
// - `XNIP_APPLIER`: apply step (log, iproute2)
// - `XNIP_DEBOUNCE_MS`: debounce tick in milliseconds
// - `XNIP_DISTRO_FILE`: distribution descriptor path
// - `XNIP_LOG_LEVEL`: trace, debug, info, warn, error
// - `XNIP_LOG_FILE`: preferred log sink; stderr is used if it cannot be
//   opened
//
// ## Example
//
// ```bash
// export XNIP_STORE=xenbus
// export XNIP_APPLIER=log
// export XNIP_LOG_LEVEL=info
//
// ipsettingd
// ```

use std::env;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use tracing::{Level, error, info};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

use ipsetting_core::traits::{Applier, XenStore};
use ipsetting_core::{FeatureConfig, IpSettingFeature, LogApplier, MemoryXenStore};

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum DaemonExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<DaemonExitCode> for ExitCode {
    fn from(code: DaemonExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Application configuration
struct Config {
    enabled: bool,
    debug: bool,
    store: String,
    store_socket: Option<String>,
    applier: String,
    debounce_ms: Option<u64>,
    distro_file: Option<String>,
    log_level: String,
    log_file: Option<String>,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        let enabled = match env::var("XNIP_ENABLED") {
            Ok(raw) => match raw.as_str() {
                "1" | "true" => true,
                "0" | "false" => false,
                other => anyhow::bail!(
                    "XNIP_ENABLED '{other}' is not valid. Use one of: 1, 0, true, false"
                ),
            },
            Err(_) => true,
        };

        let debug = matches!(
            env::var("XNIP_DEBUG").as_deref(),
            Ok("1") | Ok("true")
        );

        Ok(Self {
            enabled,
            debug,
            store: env::var("XNIP_STORE").unwrap_or_else(|_| "xenbus".to_string()),
            store_socket: env::var("XNIP_STORE_SOCKET").ok(),
            applier: env::var("XNIP_APPLIER").unwrap_or_else(|_| "log".to_string()),
            debounce_ms: match env::var("XNIP_DEBOUNCE_MS") {
                Ok(raw) => Some(raw.parse().map_err(|e| {
                    anyhow::anyhow!("XNIP_DEBOUNCE_MS '{raw}' is not a number: {e}")
                })?),
                Err(_) => None,
            },
            distro_file: env::var("XNIP_DISTRO_FILE").ok(),
            log_level: env::var("XNIP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            log_file: env::var("XNIP_LOG_FILE").ok(),
        })
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        match self.store.as_str() {
            "xenbus" | "memory" => {}
            other => anyhow::bail!(
                "XNIP_STORE '{other}' is not supported. Supported stores: xenbus, memory"
            ),
        }

        match self.applier.as_str() {
            "log" | "iproute2" => {}
            other => anyhow::bail!(
                "XNIP_APPLIER '{other}' is not supported. Supported appliers: log, iproute2"
            ),
        }

        if let Some(ms) = self.debounce_ms
            && !(100..=600_000).contains(&ms)
        {
            anyhow::bail!("XNIP_DEBOUNCE_MS must be between 100 and 600000. Got: {ms}");
        }

        if let Some(ref socket) = self.store_socket
            && socket.is_empty()
        {
            anyhow::bail!("XNIP_STORE_SOCKET cannot be empty");
        }

        match self.log_level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => anyhow::bail!(
                "XNIP_LOG_LEVEL '{other}' is not valid. \
                Valid levels: trace, debug, info, warn, error"
            ),
        }

        Ok(())
    }

    /// Feature configuration derived from the env surface
    fn feature_config(&self) -> FeatureConfig {
        let mut config = FeatureConfig {
            enabled: self.enabled,
            debug: self.debug,
            ..FeatureConfig::default()
        };
        if let Some(ms) = self.debounce_ms {
            config.debounce_interval_ms = ms;
        }
        if let Some(ref path) = self.distro_file {
            config.distro_file = PathBuf::from(path);
        }
        config
    }
}

fn main() -> ExitCode {
    // Load configuration from environment
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            return DaemonExitCode::ConfigError.into();
        }
    };

    // Validate configuration
    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {e}");
        return DaemonExitCode::ConfigError.into();
    }

    init_tracing(&config);

    info!("starting ipsettingd");

    // Enter tokio runtime
    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("failed to create tokio runtime: {e}");
            return DaemonExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        if let Err(e) = run_daemon(config).await {
            error!("daemon error: {e}");
            DaemonExitCode::RuntimeError
        } else {
            DaemonExitCode::CleanShutdown
        }
    });

    result.into()
}

/// Initialize tracing, falling back from the preferred sink to stderr
fn init_tracing(config: &Config) {
    let level = match config.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    if let Some(ref path) = config.log_file {
        match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => {
                set_subscriber(
                    FmtSubscriber::builder()
                        .with_max_level(level)
                        .with_ansi(false)
                        .with_writer(Mutex::new(file))
                        .finish(),
                );
                return;
            }
            Err(e) => {
                eprintln!("log file {path}: {e}, using stderr logging");
            }
        }
    }

    set_subscriber(
        FmtSubscriber::builder()
            .with_max_level(level)
            .with_writer(std::io::stderr)
            .finish(),
    );
}

fn set_subscriber<S>(subscriber: S)
where
    S: tracing::Subscriber + Send + Sync + 'static,
{
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("failed to set tracing subscriber: {e}");
    }
}

/// Build the configured store backend
async fn build_store(config: &Config) -> Result<Arc<dyn XenStore>> {
    if config.store == "memory" {
        return Ok(Arc::new(MemoryXenStore::new()));
    }

    // "xenbus" is the only other value accepted by validate()
    #[cfg(feature = "xenbus")]
    {
        let socket = config
            .store_socket
            .as_deref()
            .unwrap_or(ipsetting_store_xenbus::DEFAULT_SOCKET_PATH);
        info!(socket, "connecting to xenstored");
        let store = ipsetting_store_xenbus::XenbusStore::connect(socket).await?;
        Ok(Arc::new(store))
    }
    #[cfg(not(feature = "xenbus"))]
    {
        anyhow::bail!(
            "XNIP_STORE '{}' requires building with the xenbus feature",
            config.store
        )
    }
}

/// Build the configured apply step
fn build_applier(config: &Config) -> Result<Arc<dyn Applier>> {
    if config.applier == "log" {
        return Ok(Arc::new(LogApplier::new()));
    }

    // "iproute2" is the only other value accepted by validate()
    #[cfg(feature = "iproute2")]
    {
        Ok(Arc::new(ipsetting_apply_iproute2::Iproute2Applier::new()))
    }
    #[cfg(not(feature = "iproute2"))]
    {
        anyhow::bail!(
            "XNIP_APPLIER '{}' requires building with the iproute2 feature",
            config.applier
        )
    }
}

/// Run the daemon
async fn run_daemon(config: Config) -> Result<()> {
    let store = build_store(&config).await?;
    let applier = build_applier(&config)?;
    info!(
        store = %config.store,
        applier = %config.applier,
        enabled = config.enabled,
        "components wired"
    );

    let (feature, mut events) = IpSettingFeature::new(store, applier, config.feature_config())?;

    // Fatal only if the watch registration fails; afterwards the loop runs
    // on its own task for the daemon lifetime.
    let handle = feature.start().await?;
    info!("static IP setting feature started");

    // Surface engine events in the log stream
    let event_logger = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            tracing::debug!(?event, "feature event");
        }
    });

    let signal_name = wait_for_shutdown().await?;
    info!(signal = signal_name, "shutting down");

    handle.stop().await?;
    event_logger.await.ok();

    Ok(())
}

/// Wait for shutdown signals (SIGTERM, SIGINT)
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("failed to setup SIGTERM handler: {e}"))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("failed to setup SIGINT handler: {e}"))?;

    let name = tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    };
    Ok(name)
}

/// Wait for ctrl-c (fallback for non-Unix platforms)
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("failed to wait for ctrl-c: {e}"))?;
    Ok("SIGINT")
}

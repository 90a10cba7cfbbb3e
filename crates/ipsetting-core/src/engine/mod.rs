//! Static IP setting feature engine
//!
//! The engine owns the watch/advertise/evaluate loop:
//! - Advertise the capability flag to the host on every iteration
//! - Block on change notifications for the interface-list root
//! - On a notification, discover interfaces and evaluate each one
//! - Gate loop re-entry on a fixed debounce tick
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐                      ┌──────────────┐
//! │   XenStore   │── watch events ────▶ │    engine    │
//! │ (host store) │◀── advertise flag ───│  (one task)  │
//! └──────────────┘                      └──────────────┘
//!                                              │
//!                          ┌───────────────────┼──────────────────┐
//!                          ▼                   ▼                  ▼
//!                  ┌──────────────┐    ┌──────────────┐   ┌─────────────┐
//!                  │  Discoverer  │    │  Evaluator   │   │   Applier   │
//!                  │ (list vifs)  │    │ (validate)   │   │ (configure) │
//!                  └──────────────┘    └──────────────┘   └─────────────┘
//! ```
//!
//! ## Event flow
//!
//! 1. Change notification arrives for the control root
//! 2. Directory listing is split into interface paths
//! 3. Per interface and family, flags and values are read and validated
//! 4. Complete requests are handed to the applier
//! 5. The debounce tick gates re-entry into the event wait

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, error, info, warn};

use crate::config::FeatureConfig;
use crate::error::{Error, Result};
use crate::keys;
use crate::os::{self, OsVariant};
use crate::request::{CidrAddress, IpFamily, StaticIpRequest};
use crate::traits::{Applier, XenStore};

/// Events emitted by the feature engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeatureEvent {
    /// Watch registered, loop entered
    Started,

    /// One scan finished
    ScanCompleted {
        /// Interfaces discovered in this scan
        interfaces: usize,
    },

    /// A validated request was handed to the applier
    ApplyRequested {
        interface: String,
        family: IpFamily,
        address: CidrAddress,
        gateway: std::net::IpAddr,
    },

    /// The applier returned an error (recoverable; scan continued)
    ApplyFailed {
        interface: String,
        family: IpFamily,
        error: String,
    },

    /// Loop exited
    Stopped {
        reason: String,
    },
}

/// Handle to a running feature loop
///
/// Returned by [`IpSettingFeature::start`]. Dropping the handle closes the
/// shutdown channel, which also stops the loop at its next blocking point.
pub struct FeatureHandle {
    shutdown_tx: oneshot::Sender<()>,
    join: JoinHandle<Result<()>>,
}

impl FeatureHandle {
    /// Signal shutdown and wait for the loop to exit
    pub async fn stop(self) -> Result<()> {
        let _ = self.shutdown_tx.send(());
        match self.join.await {
            Ok(result) => result,
            Err(e) => Err(Error::other(format!("feature task failed: {e}"))),
        }
    }

    /// Let the loop run for the remaining process lifetime
    ///
    /// The shutdown channel is leaked so the loop never observes a close.
    pub fn detach(self) -> JoinHandle<Result<()>> {
        let Self { shutdown_tx, join } = self;
        std::mem::forget(shutdown_tx);
        join
    }
}

/// Static IP setting feature
///
/// ## Lifecycle
///
/// 1. Create with [`IpSettingFeature::new`]
/// 2. Either [`start`](IpSettingFeature::start) it (registers the watch,
///    hands the loop to a background task, returns a handle immediately) or
///    [`run`](IpSettingFeature::run) it inline until ctrl-c
/// 3. Watch-registration failure is the only fatal error; the loop is never
///    entered in that case
///
/// ## Threading
///
/// The loop runs on a single task; the store and applier are shared
/// capabilities behind `Arc` and are the only resources touched from it.
pub struct IpSettingFeature {
    /// Control-plane store capability
    store: Arc<dyn XenStore>,

    /// OS-level apply step
    applier: Arc<dyn Applier>,

    /// Feature configuration
    config: FeatureConfig,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<FeatureEvent>,
}

impl IpSettingFeature {
    /// Create a new feature instance
    ///
    /// # Returns
    ///
    /// A tuple of (feature, event_receiver) where event_receiver yields
    /// engine events for monitoring.
    pub fn new(
        store: Arc<dyn XenStore>,
        applier: Arc<dyn Applier>,
        config: FeatureConfig,
    ) -> Result<(Self, mpsc::Receiver<FeatureEvent>)> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.event_channel_capacity);

        let feature = Self {
            store,
            applier,
            config,
            event_tx: tx,
        };

        Ok((feature, rx))
    }

    /// Register the watch and hand the loop to a background task
    ///
    /// Returns as soon as the one-time watch registration succeeds; the
    /// long-running behavior lives on the spawned task. Registration
    /// failure is fatal: the error is returned and no task is spawned.
    pub async fn start(self) -> Result<FeatureHandle> {
        self.register_watch().await?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let join = tokio::spawn(async move { self.run_loop(Some(shutdown_rx)).await });

        Ok(FeatureHandle { shutdown_tx, join })
    }

    /// Run the feature inline until ctrl-c
    pub async fn run(self) -> Result<()> {
        self.register_watch().await?;
        self.run_loop(None).await
    }

    /// Run the feature inline with a controlled shutdown signal
    ///
    /// **TESTING/EMBEDDING**: contract tests require controlled shutdown.
    /// With `None`, falls back to ctrl-c like [`run`](Self::run).
    pub async fn run_with_shutdown(
        self,
        shutdown_rx: Option<oneshot::Receiver<()>>,
    ) -> Result<()> {
        self.register_watch().await?;
        self.run_loop(shutdown_rx).await
    }

    /// One-time watch registration on the control root
    async fn register_watch(&self) -> Result<()> {
        if let Err(e) = self
            .store
            .watch(&self.config.control_root, keys::WATCH_TOKEN)
            .await
        {
            error!(root = %self.config.control_root, error = %e, "watch registration failed");
            return Err(Error::watch(format!(
                "registration on {} failed: {e}",
                self.config.control_root
            )));
        }
        info!(root = %self.config.control_root, "watch registered");
        Ok(())
    }

    /// The watch/advertise/evaluate loop
    async fn run_loop(&self, shutdown_rx: Option<oneshot::Receiver<()>>) -> Result<()> {
        // Captured once; distribution changes mid-run are not detected.
        let os_variant = os::classify(&self.config.distro_file);
        info!(os = ?os_variant, applier = self.applier.name(), "feature loop starting");

        let period = Duration::from_millis(self.config.debounce_interval_ms);
        let mut tick = interval_at(Instant::now() + period, period);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        self.emit_event(FeatureEvent::Started);

        if let Some(mut rx) = shutdown_rx {
            // Controlled mode: shutdown signal honored at both blocking points
            loop {
                self.advertise().await;

                tokio::select! {
                    event = self.store.wait_event(&self.config.control_root) => {
                        if event.is_some() {
                            self.scan(os_variant).await;
                        }
                    }
                    _ = &mut rx => {
                        info!("shutdown signal received");
                        self.emit_event(FeatureEvent::Stopped {
                            reason: "shutdown signal".to_string(),
                        });
                        return Ok(());
                    }
                }

                // Tick gates loop re-entry: even a burst of notifications
                // yields at most one scan per period.
                tokio::select! {
                    _ = tick.tick() => {}
                    _ = &mut rx => {
                        info!("shutdown signal received");
                        self.emit_event(FeatureEvent::Stopped {
                            reason: "shutdown signal".to_string(),
                        });
                        return Ok(());
                    }
                }
            }
        } else {
            // Production mode: ctrl-c is the shutdown signal
            loop {
                self.advertise().await;

                tokio::select! {
                    event = self.store.wait_event(&self.config.control_root) => {
                        if event.is_some() {
                            self.scan(os_variant).await;
                        }
                    }
                    _ = tokio::signal::ctrl_c() => {
                        info!("shutdown signal received");
                        self.emit_event(FeatureEvent::Stopped {
                            reason: "ctrl-c".to_string(),
                        });
                        return Ok(());
                    }
                }

                tokio::select! {
                    _ = tick.tick() => {}
                    _ = tokio::signal::ctrl_c() => {
                        info!("shutdown signal received");
                        self.emit_event(FeatureEvent::Stopped {
                            reason: "ctrl-c".to_string(),
                        });
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Write the capability flag, unconditionally
    ///
    /// Fire-and-forget: the flag is a liveness signal and a write failure
    /// must not disturb the loop.
    async fn advertise(&self) {
        let value = if self.config.enabled { "1" } else { "0" };
        if let Err(e) = self.store.write(&self.config.advertise_key, value).await {
            debug!(key = %self.config.advertise_key, error = %e, "advertise write failed");
        }
    }

    /// One full pass: discover interfaces, evaluate each in listing order
    async fn scan(&self, os_variant: OsVariant) {
        let interfaces = self.discover().await;
        for interface in &interfaces {
            self.evaluate_interface(interface, os_variant).await;
        }
        self.emit_event(FeatureEvent::ScanCompleted {
            interfaces: interfaces.len(),
        });
    }

    /// List interface paths under the control root
    ///
    /// A listing failure skips this cycle entirely; the next notification
    /// or tick retries naturally.
    async fn discover(&self) -> Vec<String> {
        match self.store.directory(&self.config.control_root).await {
            Ok(raw) => interface_paths(&self.config.control_root, &raw),
            Err(e) => {
                warn!(root = %self.config.control_root, error = %e, "interface listing failed");
                Vec::new()
            }
        }
    }

    /// Evaluate one interface: MAC first, then each family independently
    async fn evaluate_interface(&self, interface: &str, os_variant: OsVariant) {
        debug!(interface, "checking interface");

        let mac_key = format!("{interface}{}", keys::MAC_SUBKEY);
        let mac = match self.store.read(&mac_key).await {
            Ok(mac) => mac,
            Err(e) => {
                // MAC is required context for both families
                warn!(key = %mac_key, error = %e, "mac read failed, skipping interface");
                return;
            }
        };

        for family in IpFamily::ALL {
            let enabled_key = format!("{interface}{}", family.enabled_subkey());
            match self.store.read(&enabled_key).await {
                Ok(value) if value == keys::ENABLED_LITERAL => {
                    self.configure_family(interface, &mac, family, os_variant)
                        .await;
                }
                // Anything but the literal "1", including a missing key,
                // means the family is not requested.
                Ok(_) | Err(_) => {}
            }
        }
    }

    /// Read, validate and apply one family's request for one interface
    ///
    /// Address and gateway are validated and reported independently; the
    /// applier only runs when both are valid.
    async fn configure_family(
        &self,
        interface: &str,
        mac: &str,
        family: IpFamily,
        os_variant: OsVariant,
    ) {
        let address_key = format!("{interface}{}", family.address_subkey());
        let address = match self.store.read(&address_key).await {
            Ok(raw) => match raw.parse::<CidrAddress>() {
                Ok(address) => {
                    debug!(key = %address_key, address = %address, "address validated");
                    Some(address)
                }
                Err(e) => {
                    warn!(key = %address_key, value = %raw, error = %e, "invalid address");
                    None
                }
            },
            Err(e) => {
                warn!(key = %address_key, error = %e, "address read failed");
                None
            }
        };

        let gateway_key = format!("{interface}{}", family.gateway_subkey());
        let gateway = match self.store.read(&gateway_key).await {
            Ok(raw) => match raw.parse::<std::net::IpAddr>() {
                Ok(gateway) => {
                    debug!(key = %gateway_key, gateway = %gateway, "gateway validated");
                    Some(gateway)
                }
                Err(_) => {
                    warn!(key = %gateway_key, value = %raw, "invalid gateway");
                    None
                }
            },
            Err(e) => {
                warn!(key = %gateway_key, error = %e, "gateway read failed");
                None
            }
        };

        let (Some(address), Some(gateway)) = (address, gateway) else {
            return;
        };

        let request = StaticIpRequest {
            mac: mac.to_string(),
            family,
            address,
            gateway,
        };

        self.emit_event(FeatureEvent::ApplyRequested {
            interface: interface.to_string(),
            family,
            address,
            gateway,
        });

        if let Err(e) = self.applier.apply(interface, &request, os_variant).await {
            error!(
                interface,
                family = %family,
                applier = self.applier.name(),
                error = %e,
                "apply failed"
            );
            self.emit_event(FeatureEvent::ApplyFailed {
                interface: interface.to_string(),
                family,
                error: e.to_string(),
            });
        }
    }

    /// Emit a feature event
    fn emit_event(&self, event: FeatureEvent) {
        // Dropping on overflow bounds memory if nobody drains the channel.
        if self.event_tx.try_send(event).is_err() {
            warn!("event channel full, dropping event");
        }
    }
}

/// Derive interface paths from a raw NUL-joined directory listing
///
/// Empty segments are discarded; every surviving segment becomes
/// `root + "/" + segment`. Paths come back in the store's listing order.
pub fn interface_paths(root: &str, raw: &str) -> Vec<String> {
    raw.split('\0')
        .filter(|segment| !segment.is_empty())
        .map(|segment| format!("{root}/{segment}"))
        .collect()
}

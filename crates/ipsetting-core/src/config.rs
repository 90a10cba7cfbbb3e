//! Configuration types for the static IP setting feature

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::keys;
use crate::os;

/// Feature configuration
///
/// All fields have working defaults, so `FeatureConfig::default()` is a
/// production-ready configuration with the feature advertised as enabled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureConfig {
    /// Value of the capability flag advertised to the host
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Reserved; accepted from callers but not consumed by the core logic
    #[serde(default)]
    pub debug: bool,

    /// Root key with one child per virtual interface
    #[serde(default = "default_control_root")]
    pub control_root: String,

    /// Key the capability flag is written to
    #[serde(default = "default_advertise_key")]
    pub advertise_key: String,

    /// Distribution descriptor file used for OS classification
    #[serde(default = "default_distro_file")]
    pub distro_file: PathBuf,

    /// Debounce tick gating loop re-entry after a scan (milliseconds)
    ///
    /// Even a rapid burst of change notifications is throttled to at most
    /// one scan per tick window.
    #[serde(default = "default_debounce_interval_ms")]
    pub debounce_interval_ms: u64,

    /// Capacity of the feature event channel
    ///
    /// When full, new events are dropped (with a warning log).
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl FeatureConfig {
    /// Create a configuration with defaults
    pub fn new() -> Self {
        Self {
            enabled: default_enabled(),
            debug: false,
            control_root: default_control_root(),
            advertise_key: default_advertise_key(),
            distro_file: default_distro_file(),
            debounce_interval_ms: default_debounce_interval_ms(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.control_root.is_empty() {
            return Err(crate::Error::config("control_root cannot be empty"));
        }
        if self.control_root.ends_with('/') {
            return Err(crate::Error::config(
                "control_root must not end with a slash",
            ));
        }
        if self.advertise_key.is_empty() {
            return Err(crate::Error::config("advertise_key cannot be empty"));
        }
        if self.debounce_interval_ms == 0 {
            return Err(crate::Error::config("debounce_interval_ms must be > 0"));
        }
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("event_channel_capacity must be > 0"));
        }
        Ok(())
    }
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn default_enabled() -> bool {
    true
}

fn default_control_root() -> String {
    keys::DEFAULT_CONTROL_ROOT.to_string()
}

fn default_advertise_key() -> String {
    keys::DEFAULT_ADVERTISE_KEY.to_string()
}

fn default_distro_file() -> PathBuf {
    PathBuf::from(os::DEFAULT_DISTRO_FILE)
}

fn default_debounce_interval_ms() -> u64 {
    4000
}

fn default_event_channel_capacity() -> usize {
    1000
}

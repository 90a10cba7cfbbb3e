// # Store Capability Trait
//
// Defines the interface to the hierarchical, watchable key/value channel
// between guest and host.
//
// ## Implementations
//
// - In-memory (testing, embedding): `crate::store::MemoryXenStore`
// - Xenbus wire protocol: `ipsetting-store-xenbus` crate
//
// ## Failure tiers
//
// Only watch registration at startup is fatal to the feature. Every other
// operation is called in a context where failure is logged and treated as
// "no data", so implementations should return errors rather than retry
// internally; the watch loop retries naturally on its next tick.

use async_trait::async_trait;

use crate::error::Result;

/// A change notification delivered for a registered watch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    /// Path that fired (the watched node or a descendant of it)
    pub path: String,
    /// Token supplied at registration
    pub token: String,
}

/// Trait for control-plane store implementations
///
/// Implementations must be thread-safe; the engine shares the store behind
/// an `Arc` and calls it from a single background task, but tests and
/// embedders may poke it concurrently.
#[async_trait]
pub trait XenStore: Send + Sync {
    /// Read the value at `key`
    ///
    /// # Returns
    ///
    /// - `Ok(String)`: the UTF-8 value
    /// - `Err(Error)`: missing key or transport failure
    async fn read(&self, key: &str) -> Result<String>;

    /// Write `value` at `key`, creating the node if needed
    async fn write(&self, key: &str, value: &str) -> Result<()>;

    /// List the children of `path` as a raw NUL-joined listing
    ///
    /// The caller splits the listing; empty segments are permitted and
    /// discarded downstream.
    async fn directory(&self, path: &str) -> Result<String>;

    /// Register a watch on `path` with `token`
    ///
    /// Watches are durable for the process lifetime; the feature never
    /// unregisters one.
    async fn watch(&self, path: &str, token: &str) -> Result<()>;

    /// Block until a change notification arrives for the watch on `path`
    ///
    /// # Returns
    ///
    /// - `Some(WatchEvent)`: a change fired under the watched path
    /// - `None`: no usable event (unregistered watch or closed channel);
    ///   the caller skips its scan and proceeds
    ///
    /// Must be cancellation-safe: dropping the future must not lose
    /// queued events.
    async fn wait_event(&self, path: &str) -> Option<WatchEvent>;
}

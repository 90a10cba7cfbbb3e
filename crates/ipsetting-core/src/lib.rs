// # ipsetting-core
//
// Core library for the static IP setting guest feature.
//
// ## Architecture Overview
//
// A guest-side control agent watches the host-visible key/value store for
// per-interface static IP configuration requests and advertises support for
// the capability back to the host:
//
// - **XenStore**: trait for the control-plane store capability
// - **Applier**: trait for the OS-level apply step
// - **IpSettingFeature**: the watch/advertise/evaluate loop
// - **OsVariant**: closed classification selecting an apply strategy
//
// ## Design Principles
//
// 1. **Capabilities at the seams**: the store and the apply step are trait
//    objects, substitutable with deterministic test doubles
// 2. **Event-driven**: one background task blocks on change notifications;
//    a debounce tick gates how often a reactive scan may repeat
// 3. **Two error tiers**: watch registration at startup is fatal; every
//    other failure abandons only its own unit of work
// 4. **Stateless scans**: requests are recomputed from the store on every
//    scan, never cached

pub mod apply;
pub mod config;
pub mod engine;
pub mod error;
pub mod keys;
pub mod os;
pub mod request;
pub mod store;
pub mod traits;

// Re-export core types for convenience
pub use apply::LogApplier;
pub use config::FeatureConfig;
pub use engine::{FeatureEvent, FeatureHandle, IpSettingFeature};
pub use error::{Error, Result};
pub use os::OsVariant;
pub use request::{CidrAddress, IpFamily, StaticIpRequest};
pub use store::MemoryXenStore;
pub use traits::{Applier, WatchEvent, XenStore};

//! Core traits for the static IP setting feature
//!
//! This module defines the abstract interfaces the feature engine is built
//! against.
//!
//! - [`XenStore`]: the host-visible control-plane store capability
//! - [`Applier`]: the OS-level apply step

pub mod applier;
pub mod store;

pub use applier::Applier;
pub use store::{WatchEvent, XenStore};

//! Apply-step implementations shipped with the core crate

pub mod log;

pub use log::LogApplier;

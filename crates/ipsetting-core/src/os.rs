//! OS classification from the distribution descriptor file
//!
//! The apply step routes through a variant-specific mechanism, so the loop
//! captures the variant once at startup. Classification never fails the
//! caller: any problem with the descriptor file yields [`OsVariant::Other`].

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Default location of the distribution descriptor, a file of
/// `key=value` lines with optionally double-quoted values.
pub const DEFAULT_DISTRO_FILE: &str = "/var/cache/xe-linux-distribution";

/// Closed set of OS variants the apply step distinguishes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsVariant {
    /// Any distribution without a dedicated configuration branch
    Other,
    /// CentOS and derivatives using ifcfg-style persistent configuration
    Centos,
}

/// Classify the local OS from the descriptor file at `path`.
///
/// Returns [`OsVariant::Centos`] the first time a line reads
/// `os_distro=centos` (case-sensitive, quotes and surrounding whitespace
/// stripped from the value), [`OsVariant::Other`] in every other case,
/// including a missing or unreadable file.
pub fn classify(path: &Path) -> OsVariant {
    let Ok(file) = File::open(path) else {
        return OsVariant::Other;
    };
    for line in BufReader::new(file).lines().map_while(Result::ok) {
        if let Some((key, value)) = line.split_once('=') {
            let key = key.trim();
            let value = value.trim().trim_matches('"').trim();
            if key == "os_distro" && value == "centos" {
                return OsVariant::Centos;
            }
        }
    }
    OsVariant::Other
}

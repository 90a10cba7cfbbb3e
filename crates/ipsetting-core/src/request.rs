//! Validated static IP request values
//!
//! A [`StaticIpRequest`] is computed, never stored: every scan recomputes it
//! from the store, and only a fully validated request crosses the apply seam.

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use crate::error::Error;
use crate::keys;

/// Address family of a per-interface request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IpFamily {
    V4,
    V6,
}

impl IpFamily {
    /// Both families, in the order interfaces are evaluated
    pub const ALL: [IpFamily; 2] = [IpFamily::V4, IpFamily::V6];

    /// Sub-key carrying the family's request flag
    pub fn enabled_subkey(self) -> &'static str {
        match self {
            IpFamily::V4 => keys::ENABLED_SUBKEY,
            IpFamily::V6 => keys::ENABLED6_SUBKEY,
        }
    }

    /// Sub-key carrying the family's CIDR address
    pub fn address_subkey(self) -> &'static str {
        match self {
            IpFamily::V4 => keys::ADDRESS_SUBKEY,
            IpFamily::V6 => keys::ADDRESS6_SUBKEY,
        }
    }

    /// Sub-key carrying the family's gateway
    pub fn gateway_subkey(self) -> &'static str {
        match self {
            IpFamily::V4 => keys::GATEWAY_SUBKEY,
            IpFamily::V6 => keys::GATEWAY6_SUBKEY,
        }
    }

    /// Short label for logging
    pub fn label(self) -> &'static str {
        match self {
            IpFamily::V4 => "ipv4",
            IpFamily::V6 => "ipv6",
        }
    }
}

impl fmt::Display for IpFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// An IP address in CIDR notation (`address/prefix-len`)
///
/// The prefix length is bounds-checked against the address family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CidrAddress {
    pub addr: IpAddr,
    pub prefix_len: u8,
}

impl CidrAddress {
    /// Family implied by the address literal
    pub fn family(&self) -> IpFamily {
        match self.addr {
            IpAddr::V4(_) => IpFamily::V4,
            IpAddr::V6(_) => IpFamily::V6,
        }
    }
}

impl FromStr for CidrAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr, prefix) = s
            .split_once('/')
            .ok_or_else(|| Error::invalid_input(format!("not CIDR notation: {s:?}")))?;
        let addr: IpAddr = addr
            .parse()
            .map_err(|e| Error::invalid_input(format!("bad address in {s:?}: {e}")))?;
        let prefix_len: u8 = prefix
            .parse()
            .map_err(|e| Error::invalid_input(format!("bad prefix length in {s:?}: {e}")))?;
        let max = match addr {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        };
        if prefix_len > max {
            return Err(Error::invalid_input(format!(
                "prefix length {prefix_len} out of range for {addr} (max {max})"
            )));
        }
        Ok(Self { addr, prefix_len })
    }
}

impl fmt::Display for CidrAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix_len)
    }
}

/// A fully validated per-interface, per-family configuration request
///
/// Constructed by the evaluator only when the family's request flag reads
/// exactly `"1"` and both the address and the gateway validated. The
/// evaluator does not cross-check family consistency between address and
/// gateway (see DESIGN.md).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticIpRequest {
    /// MAC of the interface to configure, as published by the host
    pub mac: String,
    /// Family the request was flagged under
    pub family: IpFamily,
    /// Address to assign, in CIDR notation
    pub address: CidrAddress,
    /// Default gateway to install
    pub gateway: IpAddr,
}

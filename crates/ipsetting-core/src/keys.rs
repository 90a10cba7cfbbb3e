//! Control-plane key layout
//!
//! Paths the host and guest agree on for static IP configuration signaling.
//! The advertise key and the interface-list root are configurable defaults;
//! the per-interface sub-keys are fixed by the host-side contract.

/// Key the guest writes to declare support for static IP configuration.
pub const DEFAULT_ADVERTISE_KEY: &str = "control/feature-static-ip-setting";

/// Root key with one child per virtual interface.
pub const DEFAULT_CONTROL_ROOT: &str = "xenserver/device/vif";

/// Token passed with the watch registration on the control root.
pub const WATCH_TOKEN: &str = "static-ip-setting";

/// The literal value the host writes to enable a family on an interface.
/// Anything else is treated as disabled.
pub const ENABLED_LITERAL: &str = "1";

/// Interface MAC address, required context for both families.
pub const MAC_SUBKEY: &str = "/static-ip-setting/mac";

/// IPv4 request flag, address and gateway.
pub const ENABLED_SUBKEY: &str = "/static-ip-setting/enabled";
pub const ADDRESS_SUBKEY: &str = "/static-ip-setting/address";
pub const GATEWAY_SUBKEY: &str = "/static-ip-setting/gateway";

/// IPv6 request flag, address and gateway.
pub const ENABLED6_SUBKEY: &str = "/static-ip-setting/enabled6";
pub const ADDRESS6_SUBKEY: &str = "/static-ip-setting/address6";
pub const GATEWAY6_SUBKEY: &str = "/static-ip-setting/gateway6";

/// Reserved by the key layout for status reporting back to the host.
/// Not written today; see DESIGN.md.
pub const ERROR_CODE_SUBKEY: &str = "/static-ip-setting/error-code";
pub const ERROR_MSG_SUBKEY: &str = "/static-ip-setting/error-msg";

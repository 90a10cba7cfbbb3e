// # Applier Trait
//
// Defines the interface for the OS-level apply step.
//
// ## Implementations
//
// - Log-only stub (default): `crate::apply::LogApplier`
// - iproute2-backed: `ipsetting-apply-iproute2` crate
//
// ## Responsibilities
//
// Appliers receive fully validated requests; parsing and validation are
// owned by the evaluator. Appliers must not retry internally and must not
// touch the store: an error is logged by the engine and the scan continues,
// with the host expected to re-trigger a change notification if its request
// was not honored.

use async_trait::async_trait;

use crate::error::Result;
use crate::os::OsVariant;
use crate::request::StaticIpRequest;

/// Trait for apply-step implementations
///
/// The `OsVariant` parameter exists only to route to a variant-specific
/// configuration mechanism; it has no effect on validation, which has
/// already happened by the time a request reaches the applier.
#[async_trait]
pub trait Applier: Send + Sync {
    /// Apply one validated per-family request for one interface
    ///
    /// # Parameters
    ///
    /// - `interface_path`: the interface's subtree in the store, for context
    /// - `request`: the validated address, gateway, MAC and family
    /// - `os`: variant captured once at loop startup
    async fn apply(
        &self,
        interface_path: &str,
        request: &StaticIpRequest,
        os: OsVariant,
    ) -> Result<()>;

    /// Name of the applier (for logging/debugging)
    fn name(&self) -> &'static str;
}

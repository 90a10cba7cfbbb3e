// # Log Applier
//
// Records validated requests without touching the OS. This is the default
// apply step: the real configuration mechanism is an opt-in strategy (see
// the ipsetting-apply-iproute2 crate), and deployments that only want the
// capability advertised and observed keep this one.

use async_trait::async_trait;
use tracing::info;

use crate::Result;
use crate::os::OsVariant;
use crate::request::StaticIpRequest;
use crate::traits::Applier;

/// Apply step that logs the resolved values per OS variant and does nothing
/// else
#[derive(Debug, Default, Clone, Copy)]
pub struct LogApplier;

impl LogApplier {
    /// Create a new log-only applier
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Applier for LogApplier {
    async fn apply(
        &self,
        interface_path: &str,
        request: &StaticIpRequest,
        os: OsVariant,
    ) -> Result<()> {
        match os {
            OsVariant::Centos => info!(
                interface = %interface_path,
                mac = %request.mac,
                family = %request.family,
                address = %request.address,
                gateway = %request.gateway,
                "would set static IP on centos"
            ),
            OsVariant::Other => info!(
                interface = %interface_path,
                mac = %request.mac,
                family = %request.family,
                address = %request.address,
                gateway = %request.gateway,
                "would set static IP"
            ),
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

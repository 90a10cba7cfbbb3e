// # iproute2 Applier
//
// Apply step that configures the interface for real: the device is resolved
// by MAC through sysfs, the address and default route are installed with
// iproute2, and on CentOS the settings are additionally persisted as an
// ifcfg fragment so they survive a network service restart.
//
// ## Error model
//
// Every failure is returned to the engine, which logs it and moves on to
// the next unit of work; this crate performs no retries of its own. The
// host re-triggers a change notification when its request was not honored.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use ipsetting_core::request::{IpFamily, StaticIpRequest};
use ipsetting_core::traits::Applier;
use ipsetting_core::{Error, OsVariant, Result};

/// Where network devices expose their hardware address
const DEFAULT_SYSFS_NET: &str = "/sys/class/net";

/// Where CentOS expects persistent interface configuration
const DEFAULT_IFCFG_DIR: &str = "/etc/sysconfig/network-scripts";

/// Apply step backed by iproute2 and sysfs
pub struct Iproute2Applier {
    sysfs_net: PathBuf,
    ifcfg_dir: PathBuf,
}

impl Iproute2Applier {
    /// Create an applier using the standard system paths
    pub fn new() -> Self {
        Self {
            sysfs_net: PathBuf::from(DEFAULT_SYSFS_NET),
            ifcfg_dir: PathBuf::from(DEFAULT_IFCFG_DIR),
        }
    }

    /// Override the sysfs and ifcfg roots (test surface)
    pub fn with_roots(sysfs_net: impl Into<PathBuf>, ifcfg_dir: impl Into<PathBuf>) -> Self {
        Self {
            sysfs_net: sysfs_net.into(),
            ifcfg_dir: ifcfg_dir.into(),
        }
    }

    /// Resolve the device name owning `mac`
    ///
    /// Scans `<sysfs>/<dev>/address` entries; comparison is
    /// case-insensitive on the hex digits.
    pub async fn device_by_mac(&self, mac: &str) -> Result<String> {
        let wanted = mac.trim();
        let mut entries = tokio::fs::read_dir(&self.sysfs_net)
            .await
            .map_err(|e| Error::apply("iproute2", format!("reading sysfs net: {e}")))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Error::apply("iproute2", format!("reading sysfs net: {e}")))?
        {
            let address_file = entry.path().join("address");
            let Ok(address) = tokio::fs::read_to_string(&address_file).await else {
                continue;
            };
            if address.trim().eq_ignore_ascii_case(wanted) {
                return Ok(entry.file_name().to_string_lossy().into_owned());
            }
        }
        Err(Error::not_found(format!("no device with mac {wanted}")))
    }

    /// Run one `ip` invocation, failing on a non-zero exit
    async fn run_ip(&self, args: &[&str]) -> Result<()> {
        debug!(?args, "ip");
        let output = Command::new("ip")
            .args(args)
            .output()
            .await
            .map_err(|e| Error::apply("iproute2", format!("spawning ip: {e}")))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::apply(
                "iproute2",
                format!("ip {} failed: {}", args.join(" "), stderr.trim()),
            ));
        }
        Ok(())
    }

    /// Persist an ifcfg fragment with an atomic write-then-rename
    async fn persist_ifcfg(&self, device: &str, request: &StaticIpRequest) -> Result<()> {
        let contents = ifcfg_contents(device, request);
        let path = self.ifcfg_dir.join(format!("ifcfg-{device}"));
        let tmp = self.ifcfg_dir.join(format!(".ifcfg-{device}.tmp"));
        tokio::fs::write(&tmp, contents)
            .await
            .map_err(|e| Error::apply("iproute2", format!("writing {}: {e}", tmp.display())))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| Error::apply("iproute2", format!("renaming to {}: {e}", path.display())))?;
        debug!(path = %path.display(), "ifcfg persisted");
        Ok(())
    }
}

impl Default for Iproute2Applier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Applier for Iproute2Applier {
    async fn apply(
        &self,
        interface_path: &str,
        request: &StaticIpRequest,
        os: OsVariant,
    ) -> Result<()> {
        let device = self.device_by_mac(&request.mac).await?;

        let address = request.address.to_string();
        let gateway = request.gateway.to_string();
        match request.family {
            IpFamily::V4 => {
                self.run_ip(&["addr", "replace", &address, "dev", &device])
                    .await?;
                self.run_ip(&["route", "replace", "default", "via", &gateway, "dev", &device])
                    .await?;
            }
            IpFamily::V6 => {
                self.run_ip(&["-6", "addr", "replace", &address, "dev", &device])
                    .await?;
                self.run_ip(&[
                    "-6", "route", "replace", "default", "via", &gateway, "dev", &device,
                ])
                .await?;
            }
        }

        if os == OsVariant::Centos {
            self.persist_ifcfg(&device, request).await?;
        }

        info!(
            interface = %interface_path,
            device = %device,
            family = %request.family,
            address = %request.address,
            gateway = %request.gateway,
            "static IP applied"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "iproute2"
    }
}

/// Render the ifcfg fragment for a request
fn ifcfg_contents(device: &str, request: &StaticIpRequest) -> String {
    let mut contents = String::new();
    contents.push_str(&format!("DEVICE={device}\n"));
    contents.push_str(&format!("HWADDR={}\n", request.mac));
    contents.push_str("BOOTPROTO=static\n");
    contents.push_str("ONBOOT=yes\n");
    match request.family {
        IpFamily::V4 => {
            contents.push_str(&format!("IPADDR={}\n", request.address.addr));
            contents.push_str(&format!("PREFIX={}\n", request.address.prefix_len));
            contents.push_str(&format!("GATEWAY={}\n", request.gateway));
        }
        IpFamily::V6 => {
            contents.push_str("IPV6INIT=yes\n");
            contents.push_str(&format!("IPV6ADDR={}\n", request.address));
            contents.push_str(&format!("IPV6_DEFAULTGW={}\n", request.gateway));
        }
    }
    contents
}

#[cfg(test)]
mod tests {
    use super::*;
    use ipsetting_core::request::CidrAddress;

    fn v4_request() -> StaticIpRequest {
        StaticIpRequest {
            mac: "AA:BB:CC:DD:EE:FF".to_string(),
            family: IpFamily::V4,
            address: "192.168.1.10/24".parse::<CidrAddress>().unwrap(),
            gateway: "192.168.1.1".parse().unwrap(),
        }
    }

    #[tokio::test]
    async fn device_resolved_by_mac_case_insensitive() {
        let sysfs = tempfile::tempdir().unwrap();
        for (dev, mac) in [("eth0", "aa:bb:cc:dd:ee:ff"), ("eth1", "11:22:33:44:55:66")] {
            let dir = sysfs.path().join(dev);
            std::fs::create_dir(&dir).unwrap();
            std::fs::write(dir.join("address"), format!("{mac}\n")).unwrap();
        }

        let applier = Iproute2Applier::with_roots(sysfs.path(), "/unused");
        let device = applier.device_by_mac("AA:BB:CC:DD:EE:FF").await.unwrap();
        assert_eq!(device, "eth0");
    }

    #[tokio::test]
    async fn unknown_mac_is_not_found() {
        let sysfs = tempfile::tempdir().unwrap();
        let applier = Iproute2Applier::with_roots(sysfs.path(), "/unused");
        assert!(matches!(
            applier.device_by_mac("00:00:00:00:00:00").await,
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn ifcfg_v4_fragment() {
        let contents = ifcfg_contents("eth0", &v4_request());
        assert!(contents.contains("DEVICE=eth0\n"));
        assert!(contents.contains("BOOTPROTO=static\n"));
        assert!(contents.contains("IPADDR=192.168.1.10\n"));
        assert!(contents.contains("PREFIX=24\n"));
        assert!(contents.contains("GATEWAY=192.168.1.1\n"));
        assert!(!contents.contains("IPV6"));
    }

    #[test]
    fn ifcfg_v6_fragment() {
        let request = StaticIpRequest {
            mac: "aa:bb:cc:dd:ee:ff".to_string(),
            family: IpFamily::V6,
            address: "fd00::10/64".parse::<CidrAddress>().unwrap(),
            gateway: "fd00::1".parse().unwrap(),
        };
        let contents = ifcfg_contents("eth0", &request);
        assert!(contents.contains("IPV6INIT=yes\n"));
        assert!(contents.contains("IPV6ADDR=fd00::10/64\n"));
        assert!(contents.contains("IPV6_DEFAULTGW=fd00::1\n"));
        assert!(!contents.contains("IPADDR="));
    }

    #[tokio::test]
    async fn ifcfg_written_atomically() {
        let sysfs = tempfile::tempdir().unwrap();
        let ifcfg = tempfile::tempdir().unwrap();
        let applier = Iproute2Applier::with_roots(sysfs.path(), ifcfg.path());

        applier.persist_ifcfg("eth0", &v4_request()).await.unwrap();

        let written = std::fs::read_to_string(ifcfg.path().join("ifcfg-eth0")).unwrap();
        assert!(written.contains("DEVICE=eth0"));
        // No leftover temporary file
        assert!(!ifcfg.path().join(".ifcfg-eth0.tmp").exists());
    }
}

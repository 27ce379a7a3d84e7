//! Device boot configuration, loadable from TOML.

use std::net::{IpAddr, Ipv4Addr};

use num_traits::FromPrimitive;
use serde::Deserialize;

use crate::ospf::OspfVersion;

/// Configuration errors surfaced at device boot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Interface address was not `addr/prefix`.
    InvalidAddress(String),
    /// `ospf_version` was neither 2 nor 3.
    UnknownOspfVersion(u8),
    Toml(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::InvalidAddress(s) => write!(f, "invalid interface address: {s}"),
            Error::UnknownOspfVersion(v) => write!(f, "unknown ospf version: {v}"),
            Error::Toml(e) => write!(f, "config parse error: {e}"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub hostname: String,
    /// Unprivileged account created at boot alongside root.
    pub default_user: String,
    pub router_id: Ipv4Addr,
    pub ospf_version: u8,
    pub interfaces: Vec<InterfaceConfig>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig {
            hostname: "devsim".to_string(),
            default_user: "admin".to_string(),
            router_id: Ipv4Addr::new(1, 1, 1, 1),
            ospf_version: 2,
            interfaces: vec![InterfaceConfig::default()],
        }
    }
}

impl DeviceConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, Error> {
        toml::from_str(text).map_err(|e| Error::Toml(e.to_string()))
    }

    pub fn ospf_version(&self) -> Result<OspfVersion, Error> {
        OspfVersion::from_u8(self.ospf_version).ok_or(Error::UnknownOspfVersion(self.ospf_version))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InterfaceConfig {
    pub name: String,
    /// `address/prefix`, e.g. `10.0.0.1/24`.
    pub address: String,
    pub area: Ipv4Addr,
    pub cost: u16,
    pub priority: u8,
    pub passive: bool,
    pub point_to_point: bool,
}

impl Default for InterfaceConfig {
    fn default() -> Self {
        InterfaceConfig {
            name: "eth0".to_string(),
            address: "10.0.0.1/24".to_string(),
            area: Ipv4Addr::UNSPECIFIED,
            cost: 10,
            priority: 1,
            passive: false,
            point_to_point: false,
        }
    }
}

impl InterfaceConfig {
    /// Splits `address` into `(address, prefix length)`.
    pub fn parse_address(&self) -> Result<(IpAddr, u8), Error> {
        let err = || Error::InvalidAddress(self.address.clone());
        let (addr, len) = self.address.split_once('/').ok_or_else(err)?;
        let addr: IpAddr = addr.parse().map_err(|_| err())?;
        let len: u8 = len.parse().map_err(|_| err())?;
        let max = if addr.is_ipv4() { 32 } else { 128 };
        if len > max {
            return Err(err());
        }
        Ok((addr, len))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_single_router() {
        let config = DeviceConfig::default();
        assert_eq!(config.hostname, "devsim");
        assert_eq!(config.ospf_version().unwrap(), OspfVersion::V2);
        assert_eq!(config.interfaces.len(), 1);
        let (addr, len) = config.interfaces[0].parse_address().unwrap();
        assert_eq!(addr, IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)));
        assert_eq!(len, 24);
    }

    #[test]
    fn toml_overrides_defaults() {
        let config = DeviceConfig::from_toml_str(
            r#"
            hostname = "r1"
            router_id = "2.2.2.2"

            [[interfaces]]
            name = "eth0"
            address = "192.168.10.2/24"
            cost = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.hostname, "r1");
        assert_eq!(config.router_id, Ipv4Addr::new(2, 2, 2, 2));
        assert_eq!(config.interfaces[0].cost, 5);
        assert_eq!(config.interfaces[0].priority, 1);
    }

    #[test]
    fn bad_address_is_rejected() {
        let iface = InterfaceConfig { address: "10.0.0.1".to_string(), ..Default::default() };
        assert!(matches!(iface.parse_address(), Err(Error::InvalidAddress(_))));
        let iface = InterfaceConfig { address: "10.0.0.1/40".to_string(), ..Default::default() };
        assert!(matches!(iface.parse_address(), Err(Error::InvalidAddress(_))));
    }

    #[test]
    fn version_gate_rejects_v1() {
        let config = DeviceConfig { ospf_version: 1, ..Default::default() };
        assert_eq!(config.ospf_version(), Err(Error::UnknownOspfVersion(1)));
    }
}

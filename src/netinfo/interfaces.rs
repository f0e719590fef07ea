/// Interface enumeration
///
/// Wraps pnet's datalink interface listing into the value types the rest of
/// the toolkit consumes, and resolves the `auto` target to the network of
/// the first operational, non-loopback interface carrying a private IPv4
/// address.

use crate::compliance::is_private;
use crate::error::{ProbeError, ProbeResult};
use ipnetwork::Ipv4Network;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use tracing::debug;

/// One address bound to an interface
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterfaceAddress {
    pub ip: IpAddr,
    pub prefix: u8,
    /// "private", "public", or "loopback"
    pub scope: String,
}

/// One enumerated interface
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterfaceInfo {
    pub name: String,
    pub mac: Option<String>,
    pub is_up: bool,
    pub is_loopback: bool,
    pub addresses: Vec<InterfaceAddress>,
}

/// Interface enumerator handle
#[derive(Debug, Clone, Default)]
pub struct InterfaceEnumerator;

impl InterfaceEnumerator {
    pub fn new() -> Self {
        Self
    }

    /// List all interfaces visible to the process
    pub fn list(&self) -> Vec<InterfaceInfo> {
        pnet::datalink::interfaces()
            .into_iter()
            .map(|iface| {
                let addresses = iface
                    .ips
                    .iter()
                    .map(|net| {
                        let ip = net.ip();
                        let scope = if ip.is_loopback() {
                            "loopback"
                        } else if is_private(&ip) {
                            "private"
                        } else {
                            "public"
                        };
                        InterfaceAddress {
                            ip,
                            prefix: net.prefix(),
                            scope: scope.to_string(),
                        }
                    })
                    .collect();

                InterfaceInfo {
                    name: iface.name.clone(),
                    mac: iface.mac.map(|m| m.to_string()),
                    is_up: iface.is_up(),
                    is_loopback: iface.is_loopback(),
                    addresses,
                }
            })
            .collect()
    }

    /// The network of the first operational, non-loopback interface with a
    /// private IPv4 address
    ///
    /// # Returns
    /// * `ProbeResult<(String, Ipv4Network)>` - Interface name and its network
    pub fn first_private_network(&self) -> ProbeResult<(String, Ipv4Network)> {
        for iface in pnet::datalink::interfaces() {
            if !iface.is_up() || iface.is_loopback() {
                continue;
            }
            for net in &iface.ips {
                if let (IpAddr::V4(v4), prefix) = (net.ip(), net.prefix()) {
                    if v4.is_private() {
                        let network = Ipv4Network::new(v4, prefix).map_err(|e| {
                            ProbeError::fatal(format!("invalid interface network: {}", e))
                        })?;
                        debug!("auto interface candidate: {} ({})", iface.name, network);
                        return Ok((iface.name, network));
                    }
                }
            }
        }

        Err(ProbeError::fatal(
            "no operational interface with a private IPv4 address",
        ))
    }

    /// The local IPv4 networks, used for Medium-priority classification
    pub fn local_networks(&self) -> Vec<Ipv4Network> {
        pnet::datalink::interfaces()
            .iter()
            .filter(|iface| iface.is_up() && !iface.is_loopback())
            .flat_map(|iface| iface.ips.iter())
            .filter_map(|net| match (net.ip(), net.prefix()) {
                (IpAddr::V4(v4), prefix) => Ipv4Network::new(v4, prefix).ok(),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_includes_loopback() {
        let interfaces = InterfaceEnumerator::new().list();
        // Every test host has at least a loopback interface
        assert!(!interfaces.is_empty());
        assert!(interfaces.iter().any(|i| i.is_loopback));
    }

    #[test]
    fn test_loopback_scope() {
        let interfaces = InterfaceEnumerator::new().list();
        for iface in interfaces.iter().filter(|i| i.is_loopback) {
            for addr in &iface.addresses {
                assert_eq!(addr.scope, "loopback");
            }
        }
    }

    #[test]
    fn test_first_private_network_excludes_loopback() {
        // May legitimately fail on hosts with no private interface; only
        // assert the invariant when a network is found.
        if let Ok((name, network)) = InterfaceEnumerator::new().first_private_network() {
            assert!(!name.is_empty());
            assert!(network.ip().is_private());
        }
    }
}

/// Default gateway lookup
///
/// Reads the kernel routing table on Linux, falling back to the `ip route`
/// command. Returns None when no default route can be determined.

use std::net::{IpAddr, Ipv4Addr};
use tracing::debug;

/// Determine the IPv4 default gateway, best-effort
pub async fn default_gateway() -> Option<IpAddr> {
    if let Some(gw) = read_proc_route() {
        debug!("default gateway from /proc/net/route: {}", gw);
        return Some(gw);
    }

    if let Some(gw) = query_ip_route().await {
        debug!("default gateway from ip route: {}", gw);
        return Some(gw);
    }

    debug!("no default gateway found");
    None
}

/// Parse /proc/net/route for the 0.0.0.0/0 entry
///
/// Fields are little-endian hex; the gateway column is the third field.
fn read_proc_route() -> Option<IpAddr> {
    let contents = std::fs::read_to_string("/proc/net/route").ok()?;

    for line in contents.lines().skip(1) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 3 {
            continue;
        }
        if fields[1] != "00000000" {
            continue;
        }
        let raw = u32::from_str_radix(fields[2], 16).ok()?;
        let gw = Ipv4Addr::from(raw.swap_bytes());
        if !gw.is_unspecified() {
            return Some(IpAddr::V4(gw));
        }
    }

    None
}

/// Ask `ip route show default` and parse "default via <addr>"
async fn query_ip_route() -> Option<IpAddr> {
    let output = tokio::process::Command::new("ip")
        .args(["route", "show", "default"])
        .output()
        .await
        .ok()?;

    if !output.status.success() {
        return None;
    }

    let text = String::from_utf8_lossy(&output.stdout);
    for line in text.lines() {
        let mut words = line.split_whitespace();
        while let Some(word) = words.next() {
            if word == "via" {
                if let Some(addr) = words.next().and_then(|w| w.parse::<IpAddr>().ok()) {
                    return Some(addr);
                }
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_default_gateway_is_optional() {
        // Must not panic regardless of environment; value is best-effort
        let gw = default_gateway().await;
        if let Some(IpAddr::V4(v4)) = gw {
            assert!(!v4.is_unspecified());
        }
    }
}

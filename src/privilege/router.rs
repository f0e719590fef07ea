/// Capability-aware method routing
///
/// Pure functions from the detected capability set to ordered method
/// preferences. All degradation reason strings live here so every summary
/// explains a fallback the same way.

use crate::discovery::DiscoveryMethod;
use crate::privilege::Capabilities;
use crate::scanner::ScanType;

/// Tag appended to service banners of records produced by a degraded scan
pub const SYN_FALLBACK_TAG: &str = "[fallback: connect scan used instead of SYN]";

/// An ordered method preference plus the reasons anything was ruled out
#[derive(Debug, Clone)]
pub struct MethodPlan {
    pub methods: Vec<DiscoveryMethod>,
    pub reasons: Vec<String>,
}

/// Select discovery methods for the given capability set
///
/// Yields `[icmp, tcp]`, `[ping, tcp]`, or `[tcp]` in decreasing order of
/// privilege. TCP connect is always the trailing fallback.
pub fn recommend_discovery(caps: &Capabilities) -> MethodPlan {
    let mut reasons = Vec::new();

    let methods = if caps.raw_socket || caps.icmp_socket {
        vec![DiscoveryMethod::Icmp, DiscoveryMethod::Tcp]
    } else if caps.system_ping {
        reasons.push("ICMP sockets unavailable, using system ping".to_string());
        vec![DiscoveryMethod::Ping, DiscoveryMethod::Tcp]
    } else {
        reasons.push("no ICMP capability, TCP connect probes only".to_string());
        vec![DiscoveryMethod::Tcp]
    };

    MethodPlan { methods, reasons }
}

/// Select the scan type actually used for a request
///
/// Returns the effective type and, when the request was degraded, the
/// reason string to surface in the summary.
pub fn recommend_scan(caps: &Capabilities, requested: ScanType) -> (ScanType, Option<String>) {
    match requested {
        ScanType::Syn if !caps.syn_scan => (
            ScanType::Connect,
            Some("SYN scan requires raw sockets, degraded to connect scan".to_string()),
        ),
        ScanType::Auto => {
            if caps.syn_scan {
                (ScanType::Syn, None)
            } else {
                (ScanType::Connect, None)
            }
        }
        other => (other, None),
    }
}

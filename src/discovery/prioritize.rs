/// Target prioritization
///
/// Hosts already in the ARP cache or acting as the default gateway are the
/// most likely to answer; addresses adjacent to known hosts or inside a
/// local subnet come next. Sorting is stable so equal-priority targets keep
/// their insertion order.

use ipnetwork::Ipv4Network;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::IpAddr;
use tracing::debug;

/// Probe priority, ascending sort puts High first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::High => write!(f, "high"),
            Priority::Medium => write!(f, "medium"),
            Priority::Low => write!(f, "low"),
        }
    }
}

/// A target with its assigned probe priority
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrioritizedTarget {
    pub address: IpAddr,
    pub priority: Priority,
    pub reason: String,
}

/// Local knowledge consulted during prioritization
#[derive(Debug, Clone, Default)]
pub struct LocalContext {
    pub arp_cache: HashSet<IpAddr>,
    pub gateway: Option<IpAddr>,
    pub local_networks: Vec<Ipv4Network>,
}

/// Classify every target and sort stably by priority
///
/// High: ARP-cached or the default gateway. Medium: within the same /28 as
/// a known (ARP-cached) host, or inside a local subnet. Low: the rest.
pub fn prioritize(targets: &[IpAddr], context: &LocalContext) -> Vec<PrioritizedTarget> {
    let mut prioritized: Vec<PrioritizedTarget> = targets
        .iter()
        .map(|&address| classify(address, context))
        .collect();

    // Stable: insertion order is the secondary key
    prioritized.sort_by_key(|t| t.priority);

    let high = prioritized.iter().filter(|t| t.priority == Priority::High).count();
    let medium = prioritized.iter().filter(|t| t.priority == Priority::Medium).count();
    debug!(
        "prioritized {} targets: {} high, {} medium, {} low",
        prioritized.len(),
        high,
        medium,
        prioritized.len() - high - medium
    );

    prioritized
}

fn classify(address: IpAddr, context: &LocalContext) -> PrioritizedTarget {
    if context.arp_cache.contains(&address) {
        return PrioritizedTarget {
            address,
            priority: Priority::High,
            reason: "present in ARP cache".to_string(),
        };
    }

    if context.gateway == Some(address) {
        return PrioritizedTarget {
            address,
            priority: Priority::High,
            reason: "default gateway".to_string(),
        };
    }

    if let IpAddr::V4(v4) = address {
        let slice = u32::from(v4) >> 4;
        let adjacent = context.arp_cache.iter().any(|known| match known {
            IpAddr::V4(k) => (u32::from(*k) >> 4) == slice,
            IpAddr::V6(_) => false,
        });
        if adjacent {
            return PrioritizedTarget {
                address,
                priority: Priority::Medium,
                reason: "adjacent to a known host".to_string(),
            };
        }

        if context.local_networks.iter().any(|net| net.contains(v4)) {
            return PrioritizedTarget {
                address,
                priority: Priority::Medium,
                reason: "within a local subnet".to_string(),
            };
        }
    }

    PrioritizedTarget {
        address,
        priority: Priority::Low,
        reason: "no local knowledge".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> LocalContext {
        let mut arp_cache = HashSet::new();
        arp_cache.insert("192.168.1.20".parse().unwrap());
        LocalContext {
            arp_cache,
            gateway: Some("192.168.1.1".parse().unwrap()),
            local_networks: vec!["192.168.1.0/24".parse().unwrap()],
        }
    }

    #[test]
    fn test_arp_cached_is_high() {
        let out = prioritize(&["192.168.1.20".parse().unwrap()], &context());
        assert_eq!(out[0].priority, Priority::High);
        assert!(out[0].reason.contains("ARP"));
    }

    #[test]
    fn test_gateway_is_high() {
        let out = prioritize(&["192.168.1.1".parse().unwrap()], &context());
        assert_eq!(out[0].priority, Priority::High);
        assert!(out[0].reason.contains("gateway"));
    }

    #[test]
    fn test_same_slash28_is_medium() {
        // 192.168.1.17 and 192.168.1.20 share 192.168.1.16/28
        let out = prioritize(&["192.168.1.17".parse().unwrap()], &context());
        assert_eq!(out[0].priority, Priority::Medium);
        assert!(out[0].reason.contains("adjacent"));
    }

    #[test]
    fn test_local_subnet_is_medium() {
        let out = prioritize(&["192.168.1.200".parse().unwrap()], &context());
        assert_eq!(out[0].priority, Priority::Medium);
        assert!(out[0].reason.contains("local subnet"));
    }

    #[test]
    fn test_unknown_is_low() {
        let out = prioritize(&["10.9.9.9".parse().unwrap()], &context());
        assert_eq!(out[0].priority, Priority::Low);
    }

    #[test]
    fn test_stable_sort_keeps_insertion_order() {
        let targets: Vec<IpAddr> = vec![
            "10.0.0.5".parse().unwrap(),     // low
            "192.168.1.1".parse().unwrap(),  // high (gateway)
            "10.0.0.6".parse().unwrap(),     // low
            "192.168.1.20".parse().unwrap(), // high (arp)
            "10.0.0.7".parse().unwrap(),     // low
        ];
        let out = prioritize(&targets, &context());

        assert_eq!(out[0].address, "192.168.1.1".parse::<IpAddr>().unwrap());
        assert_eq!(out[1].address, "192.168.1.20".parse::<IpAddr>().unwrap());
        // Low-priority targets keep their original relative order
        assert_eq!(out[2].address, "10.0.0.5".parse::<IpAddr>().unwrap());
        assert_eq!(out[3].address, "10.0.0.6".parse::<IpAddr>().unwrap());
        assert_eq!(out[4].address, "10.0.0.7".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn test_empty_context_degrades_to_low() {
        let out = prioritize(
            &["203.0.113.9".parse().unwrap()],
            &LocalContext::default(),
        );
        assert_eq!(out[0].priority, Priority::Low);
    }
}

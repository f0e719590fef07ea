/// Record deduplication and calibration
///
/// A target probed by several methods (or retried) produces several raw
/// records. Merging groups them by address, keeps the strongest status
/// (up > down > timeout > error), the lowest positive RTT among records of
/// that status, and the distinct methods attempted. Merging the same
/// multiset twice yields the same result.

use crate::discovery::{DiscoveryRecord, HostState};
use std::collections::HashMap;
use std::net::IpAddr;
use tracing::debug;

/// Merge raw records into one calibrated record per address
///
/// Output order follows the first appearance of each address in the input.
pub fn merge_records(records: Vec<DiscoveryRecord>) -> Vec<DiscoveryRecord> {
    let mut order: Vec<IpAddr> = Vec::new();
    let mut groups: HashMap<IpAddr, Vec<DiscoveryRecord>> = HashMap::new();

    for record in records {
        if !groups.contains_key(&record.address) {
            order.push(record.address);
        }
        groups.entry(record.address).or_default().push(record);
    }

    let merged: Vec<DiscoveryRecord> = order
        .into_iter()
        .map(|addr| merge_group(groups.remove(&addr).unwrap_or_default()))
        .collect();

    debug!("merged into {} calibrated records", merged.len());
    merged
}

fn merge_group(group: Vec<DiscoveryRecord>) -> DiscoveryRecord {
    debug_assert!(!group.is_empty());

    let status = group
        .iter()
        .map(|r| r.status)
        .max_by_key(HostState::priority)
        .unwrap_or(HostState::Error);

    let rtt_ms = group
        .iter()
        .filter(|r| r.status == status)
        .filter_map(|r| r.rtt_ms)
        .filter(|rtt| *rtt > 0.0)
        .fold(None::<f64>, |best, rtt| match best {
            Some(b) if b <= rtt => Some(b),
            _ => Some(rtt),
        });

    // Distinct methods in first-seen order; records may already carry
    // comma-joined lists from a previous merge
    let mut methods: Vec<String> = Vec::new();
    for record in &group {
        for method in record.method_used.split(',') {
            let method = method.trim();
            if !method.is_empty() && !methods.iter().any(|m| m == method) {
                methods.push(method.to_string());
            }
        }
    }

    let mut details = HashMap::new();
    let mut hostname = None;
    for record in &group {
        for (k, v) in &record.details {
            details.entry(k.clone()).or_insert_with(|| v.clone());
        }
        if hostname.is_none() {
            hostname = record.hostname.clone();
        }
    }

    let first = &group[0];
    DiscoveryRecord {
        address: first.address,
        status,
        rtt_ms,
        method_used: methods.join(","),
        details,
        hostname,
        timestamp: first.timestamp,
    }
}

/// Count hosts whose calibrated status is up
pub fn count_alive(records: &[DiscoveryRecord]) -> usize {
    records
        .iter()
        .filter(|r| r.status == HostState::Up)
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::DiscoveryMethod;
    use std::net::IpAddr;

    fn record(addr: &str, status: HostState, method: DiscoveryMethod, rtt: Option<f64>) -> DiscoveryRecord {
        let mut r = DiscoveryRecord::new(addr.parse::<IpAddr>().unwrap(), status, method);
        r.rtt_ms = rtt;
        r
    }

    #[test]
    fn test_status_priority_wins() {
        let merged = merge_records(vec![
            record("10.0.0.1", HostState::Timeout, DiscoveryMethod::Icmp, None),
            record("10.0.0.1", HostState::Up, DiscoveryMethod::Tcp, Some(3.0)),
            record("10.0.0.1", HostState::Error, DiscoveryMethod::Ping, None),
        ]);

        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].status, HostState::Up);
        assert_eq!(merged[0].method_used, "icmp,tcp,ping");
    }

    #[test]
    fn test_lowest_positive_rtt_among_equal_status() {
        let merged = merge_records(vec![
            record("10.0.0.1", HostState::Up, DiscoveryMethod::Icmp, Some(5.0)),
            record("10.0.0.1", HostState::Up, DiscoveryMethod::Tcp, Some(2.0)),
            // RTT on a losing status must not win
            record("10.0.0.1", HostState::Down, DiscoveryMethod::Ping, Some(0.5)),
            // Non-positive RTTs are ignored
            record("10.0.0.1", HostState::Up, DiscoveryMethod::Arp, Some(0.0)),
        ]);

        assert_eq!(merged[0].rtt_ms, Some(2.0));
    }

    #[test]
    fn test_merge_is_idempotent() {
        let raw = vec![
            record("10.0.0.1", HostState::Up, DiscoveryMethod::Icmp, Some(5.0)),
            record("10.0.0.1", HostState::Up, DiscoveryMethod::Tcp, Some(2.0)),
            record("10.0.0.2", HostState::Down, DiscoveryMethod::Tcp, None),
        ];

        let once = merge_records(raw);
        let twice = merge_records(once.clone());

        assert_eq!(once.len(), twice.len());
        for (a, b) in once.iter().zip(twice.iter()) {
            assert_eq!(a.address, b.address);
            assert_eq!(a.status, b.status);
            assert_eq!(a.rtt_ms, b.rtt_ms);
            assert_eq!(a.method_used, b.method_used);
        }
    }

    #[test]
    fn test_output_order_follows_first_appearance() {
        let merged = merge_records(vec![
            record("10.0.0.3", HostState::Down, DiscoveryMethod::Tcp, None),
            record("10.0.0.1", HostState::Up, DiscoveryMethod::Tcp, Some(1.0)),
            record("10.0.0.3", HostState::Up, DiscoveryMethod::Icmp, Some(2.0)),
        ]);

        assert_eq!(merged[0].address, "10.0.0.3".parse::<IpAddr>().unwrap());
        assert_eq!(merged[1].address, "10.0.0.1".parse::<IpAddr>().unwrap());
        assert_eq!(merged[0].status, HostState::Up);
    }

    #[test]
    fn test_count_alive() {
        let merged = merge_records(vec![
            record("10.0.0.1", HostState::Up, DiscoveryMethod::Tcp, Some(1.0)),
            record("10.0.0.2", HostState::Down, DiscoveryMethod::Tcp, None),
            record("10.0.0.3", HostState::Up, DiscoveryMethod::Icmp, Some(2.0)),
        ]);
        assert_eq!(count_alive(&merged), 2);
    }

    #[test]
    fn test_details_and_hostname_first_wins() {
        let mut a = record("10.0.0.1", HostState::Up, DiscoveryMethod::Tcp, Some(1.0));
        a.details.insert("port".to_string(), "80".to_string());
        let mut b = record("10.0.0.1", HostState::Up, DiscoveryMethod::Icmp, Some(2.0));
        b.details.insert("port".to_string(), "443".to_string());
        b.hostname = Some("printer.lan".to_string());

        let merged = merge_records(vec![a, b]);
        assert_eq!(merged[0].details.get("port"), Some(&"80".to_string()));
        assert_eq!(merged[0].hostname.as_deref(), Some("printer.lan"));
    }
}

/// In-memory result store
///
/// Aggregates the summaries of a process's runs, keyed by run id. Records
/// are stored verbatim inside their summaries and surfaced through
/// iterate/filter accessors for downstream export. Nothing here touches
/// disk; persistence belongs to external collaborators.

use crate::discovery::{DiscoveryRecord, DiscoverySummary, HostState};
use crate::scanner::{PortState, ScanRecord, ScanSummary};
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Mutex;
use tracing::debug;

/// Either kind of run summary
#[derive(Debug, Clone)]
pub enum RunSummary {
    Discovery(DiscoverySummary),
    Scan(ScanSummary),
}

impl RunSummary {
    pub fn run_id(&self) -> &str {
        match self {
            RunSummary::Discovery(s) => &s.run_id,
            RunSummary::Scan(s) => &s.run_id,
        }
    }
}

/// Run-keyed aggregator
#[derive(Default)]
pub struct ResultStore {
    runs: Mutex<RunsInner>,
}

#[derive(Default)]
struct RunsInner {
    order: Vec<String>,
    by_id: HashMap<String, RunSummary>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a discovery run
    pub fn put_discovery(&self, summary: DiscoverySummary) {
        self.put(RunSummary::Discovery(summary));
    }

    /// Store a scan run
    pub fn put_scan(&self, summary: ScanSummary) {
        self.put(RunSummary::Scan(summary));
    }

    fn put(&self, summary: RunSummary) {
        let mut runs = self.runs.lock().expect("result store poisoned");
        let id = summary.run_id().to_string();
        if !runs.by_id.contains_key(&id) {
            runs.order.push(id.clone());
        }
        debug!("stored run {}", id);
        runs.by_id.insert(id, summary);
    }

    /// Fetch one run by id
    pub fn get(&self, run_id: &str) -> Option<RunSummary> {
        self.runs
            .lock()
            .expect("result store poisoned")
            .by_id
            .get(run_id)
            .cloned()
    }

    /// All runs in insertion order
    pub fn iter(&self) -> Vec<RunSummary> {
        let runs = self.runs.lock().expect("result store poisoned");
        runs.order
            .iter()
            .filter_map(|id| runs.by_id.get(id).cloned())
            .collect()
    }

    /// Number of stored runs
    pub fn len(&self) -> usize {
        self.runs.lock().expect("result store poisoned").order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Discovery records matching a predicate, across all runs
    pub fn filter_discovery<F>(&self, predicate: F) -> Vec<DiscoveryRecord>
    where
        F: Fn(&DiscoveryRecord) -> bool,
    {
        self.iter()
            .into_iter()
            .filter_map(|run| match run {
                RunSummary::Discovery(s) => Some(s.records),
                RunSummary::Scan(_) => None,
            })
            .flatten()
            .filter(|r| predicate(r))
            .collect()
    }

    /// Scan records matching a predicate, across all runs
    pub fn filter_scan<F>(&self, predicate: F) -> Vec<ScanRecord>
    where
        F: Fn(&ScanRecord) -> bool,
    {
        self.iter()
            .into_iter()
            .filter_map(|run| match run {
                RunSummary::Scan(s) => Some(s.records),
                RunSummary::Discovery(_) => None,
            })
            .flatten()
            .filter(|r| predicate(r))
            .collect()
    }

    /// Every address seen up in any stored discovery run
    pub fn known_live_hosts(&self) -> Vec<IpAddr> {
        let mut hosts = Vec::new();
        for record in self.filter_discovery(|r| r.status == HostState::Up) {
            if !hosts.contains(&record.address) {
                hosts.push(record.address);
            }
        }
        hosts
    }

    /// Every (host, port) seen open in any stored scan run
    pub fn known_open_ports(&self) -> Vec<(IpAddr, u16)> {
        let mut ports = Vec::new();
        for record in self.filter_scan(|r| r.status == PortState::Open) {
            let pair = (record.host, record.port);
            if !ports.contains(&pair) {
                ports.push(pair);
            }
        }
        ports
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::{DiscoveryStats, EnhancedStats, SamplingReport};
    use crate::scanner::{Protocol, ScanType};
    use chrono::Utc;

    fn discovery_summary(run_id: &str, records: Vec<DiscoveryRecord>) -> DiscoverySummary {
        let hosts = records.iter().filter(|r| r.status == HostState::Up).count();
        DiscoverySummary {
            run_id: run_id.to_string(),
            start: Utc::now(),
            end: Utc::now(),
            duration_s: 0.1,
            targets_input: 1,
            targets_resolved: records.len(),
            hosts_discovered: hosts,
            success_rate: 0.0,
            methods_used: vec!["tcp".to_string()],
            interface_used: None,
            records,
            stats: DiscoveryStats::default(),
            privilege_mode: "degraded".to_string(),
            fallback_reasons: Vec::new(),
            enhanced: EnhancedStats {
                prioritized: true,
                sampling: SamplingReport::not_sampled(),
                density_estimate: 0.0,
                original_methods: Vec::new(),
                actual_methods: Vec::new(),
                rate_adjustments: Vec::new(),
                window_stats: Vec::new(),
                priority_counts: HashMap::new(),
            },
        }
    }

    fn scan_summary(run_id: &str, records: Vec<ScanRecord>) -> ScanSummary {
        ScanSummary {
            run_id: run_id.to_string(),
            start: Utc::now(),
            end: Utc::now(),
            duration_s: 0.1,
            hosts_scanned: 1,
            ports_per_host: records.len(),
            scan_type_requested: ScanType::Connect,
            scan_type_used: ScanType::Connect,
            records,
            by_status: HashMap::new(),
            by_service: HashMap::new(),
            scan_rate_pps: 0.0,
            privilege_mode: "degraded".to_string(),
            fallback_reasons: Vec::new(),
        }
    }

    fn up_record(addr: &str) -> DiscoveryRecord {
        DiscoveryRecord::new(
            addr.parse().unwrap(),
            HostState::Up,
            crate::discovery::DiscoveryMethod::Tcp,
        )
    }

    #[test]
    fn test_put_and_get() {
        let store = ResultStore::new();
        store.put_discovery(discovery_summary("run-1", vec![up_record("10.0.0.1")]));

        assert_eq!(store.len(), 1);
        assert!(matches!(store.get("run-1"), Some(RunSummary::Discovery(_))));
        assert!(store.get("run-2").is_none());
    }

    #[test]
    fn test_put_same_run_id_replaces() {
        let store = ResultStore::new();
        store.put_discovery(discovery_summary("run-1", vec![]));
        store.put_discovery(discovery_summary("run-1", vec![up_record("10.0.0.1")]));

        assert_eq!(store.len(), 1);
        assert_eq!(store.known_live_hosts().len(), 1);
    }

    #[test]
    fn test_iter_preserves_order() {
        let store = ResultStore::new();
        store.put_discovery(discovery_summary("a", vec![]));
        store.put_scan(scan_summary("b", vec![]));
        store.put_discovery(discovery_summary("c", vec![]));

        let ids: Vec<String> = store.iter().iter().map(|r| r.run_id().to_string()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_filters_cross_runs() {
        let store = ResultStore::new();
        store.put_discovery(discovery_summary("a", vec![up_record("10.0.0.1")]));
        store.put_discovery(discovery_summary(
            "b",
            vec![up_record("10.0.0.2"), {
                let mut r = up_record("10.0.0.3");
                r.status = HostState::Down;
                r
            }],
        ));

        let live = store.known_live_hosts();
        assert_eq!(live.len(), 2);

        let down = store.filter_discovery(|r| r.status == HostState::Down);
        assert_eq!(down.len(), 1);
    }

    #[test]
    fn test_open_ports_dedup() {
        let store = ResultStore::new();
        let host: IpAddr = "10.0.0.1".parse().unwrap();
        let open = ScanRecord::new(host, 80, Protocol::Tcp, PortState::Open);
        store.put_scan(scan_summary("a", vec![open.clone()]));
        store.put_scan(scan_summary("b", vec![open]));

        assert_eq!(store.known_open_ports(), vec![(host, 80)]);
    }
}

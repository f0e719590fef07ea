/// Host discovery
///
/// The discovery pipeline: prioritize targets from local network knowledge,
/// validate candidate methods, sample large networks before committing to a
/// full sweep, probe with per-target method fallback, then merge duplicate
/// observations into calibrated records.

pub mod engine;
pub mod merge;
pub mod methods;
pub mod prioritize;
pub mod sampling;

pub use engine::{DiscoveryEngine, DiscoveryOptions, DiscoveryStats, DiscoverySummary, EnhancedStats};
pub use merge::merge_records;
pub use prioritize::{prioritize, Priority, PrioritizedTarget};
pub use sampling::{SamplingDecision, SamplingReport};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::IpAddr;

/// A discovery technique
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscoveryMethod {
    /// ICMP echo through a datagram or raw socket
    Icmp,
    /// The OS ping command
    Ping,
    /// TCP connect attempts against commonly open ports
    Tcp,
    /// ARP cache membership (local segment only)
    Arp,
}

impl std::fmt::Display for DiscoveryMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiscoveryMethod::Icmp => write!(f, "icmp"),
            DiscoveryMethod::Ping => write!(f, "ping"),
            DiscoveryMethod::Tcp => write!(f, "tcp"),
            DiscoveryMethod::Arp => write!(f, "arp"),
        }
    }
}

/// Host state observed by one probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostState {
    Up,
    Down,
    Timeout,
    Error,
}

impl HostState {
    /// Merge priority: higher wins when combining observations
    pub fn priority(&self) -> u8 {
        match self {
            HostState::Up => 3,
            HostState::Down => 2,
            HostState::Timeout => 1,
            HostState::Error => 0,
        }
    }
}

impl std::fmt::Display for HostState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HostState::Up => write!(f, "up"),
            HostState::Down => write!(f, "down"),
            HostState::Timeout => write!(f, "timeout"),
            HostState::Error => write!(f, "error"),
        }
    }
}

/// One discovery observation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryRecord {
    pub address: IpAddr,
    pub status: HostState,
    pub rtt_ms: Option<f64>,
    /// Method that produced this record; comma-joined after merging
    pub method_used: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub details: HashMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl DiscoveryRecord {
    pub fn new(address: IpAddr, status: HostState, method: DiscoveryMethod) -> Self {
        Self {
            address,
            status,
            rtt_ms: None,
            method_used: method.to_string(),
            details: HashMap::new(),
            hostname: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_rtt(mut self, rtt_ms: f64) -> Self {
        self.rtt_ms = Some(rtt_ms);
        self
    }

    pub fn with_detail<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }
}

impl std::fmt::Display for DiscoveryRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {} (method: {}, rtt: {})",
            self.address,
            self.status,
            self.method_used,
            self.rtt_ms
                .map_or("N/A".to_string(), |t| format!("{:.1}ms", t))
        )
    }
}

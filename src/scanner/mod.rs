/// Port scanning
///
/// This module coordinates concurrent TCP/UDP port probes over live hosts,
/// selecting the scan technique the detected privileges allow and tagging
/// records whenever a request had to be degraded.

pub mod ports;
pub mod service;
pub mod tcp_connect;
pub mod tcp_syn;
pub mod udp_scan;

pub use ports::{PortSpec, COMMON_PORTS, DATABASE_PORTS, TOP_100, TOP_1000, WEB_PORTS};
pub use service::{hint_for, port_name, ServiceHint};
pub use tcp_connect::ConnectScanner;
pub use tcp_syn::SynScanner;
pub use udp_scan::UdpProbeScanner;

use crate::config::{RateProfile, ScannerConfig};
use crate::error::{ProbeError, ProbeResult};
use crate::privilege::{recommend_scan, router::SYN_FALLBACK_TAG, Capabilities};
use crate::rate::{ProbeOutcome, RateController};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

/// Requested port-probing technique
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanType {
    Syn,
    Connect,
    Udp,
    Auto,
}

impl std::str::FromStr for ScanType {
    type Err = ProbeError;

    fn from_str(s: &str) -> ProbeResult<Self> {
        match s.to_lowercase().as_str() {
            "syn" => Ok(ScanType::Syn),
            "connect" => Ok(ScanType::Connect),
            "udp" => Ok(ScanType::Udp),
            "auto" => Ok(ScanType::Auto),
            other => Err(ProbeError::validation(
                "scan_type",
                format!("unknown scan type: {}", other),
            )),
        }
    }
}

impl std::fmt::Display for ScanType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanType::Syn => write!(f, "syn"),
            ScanType::Connect => write!(f, "connect"),
            ScanType::Udp => write!(f, "udp"),
            ScanType::Auto => write!(f, "auto"),
        }
    }
}

/// Transport protocol of a probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
}

/// Observed port state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortState {
    Open,
    Closed,
    Filtered,
    OpenFiltered,
    Error,
}

impl std::fmt::Display for PortState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PortState::Open => write!(f, "open"),
            PortState::Closed => write!(f, "closed"),
            PortState::Filtered => write!(f, "filtered"),
            PortState::OpenFiltered => write!(f, "open|filtered"),
            PortState::Error => write!(f, "error"),
        }
    }
}

/// One port observation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanRecord {
    pub host: IpAddr,
    pub port: u16,
    pub protocol: Protocol,
    pub status: PortState,
    pub rtt_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_hint: Option<ServiceHint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ScanRecord {
    pub fn new(host: IpAddr, port: u16, protocol: Protocol, status: PortState) -> Self {
        Self {
            host,
            port,
            protocol,
            status,
            rtt_ms: None,
            service_hint: None,
            detail: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_rtt(mut self, rtt_ms: f64) -> Self {
        self.rtt_ms = Some(rtt_ms);
        self
    }

    pub fn with_detail<S: Into<String>>(mut self, detail: S) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

impl std::fmt::Display for ScanRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{} {} ({:?})", self.host, self.port, self.status, self.protocol)?;
        if let Some(ref hint) = self.service_hint {
            write!(f, " [{} {:.0}%]", hint.name, hint.confidence * 100.0)?;
        }
        Ok(())
    }
}

/// Tunables for one scan invocation
#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub scan_type: ScanType,
    pub timeout: Duration,
    pub retry_count: u32,
    pub concurrency: usize,
    pub service_hints: bool,
    pub banner_timeout: Duration,
    pub udp_read_timeout: Duration,
}

impl ScanOptions {
    pub fn from_config(config: &ScannerConfig, profile: &RateProfile, scan_type: ScanType) -> Self {
        Self {
            scan_type,
            timeout: profile.timeout(),
            retry_count: profile.retries,
            concurrency: profile.concurrency,
            service_hints: config.service_hints,
            banner_timeout: Duration::from_millis(config.banner_timeout_ms),
            udp_read_timeout: Duration::from_millis(config.udp_read_timeout_ms.min(500)),
        }
    }
}

/// The result of one scan run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanSummary {
    pub run_id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub duration_s: f64,
    pub hosts_scanned: usize,
    pub ports_per_host: usize,
    pub scan_type_requested: ScanType,
    pub scan_type_used: ScanType,
    pub records: Vec<ScanRecord>,
    pub by_status: HashMap<String, usize>,
    pub by_service: HashMap<String, usize>,
    pub scan_rate_pps: f64,
    pub privilege_mode: String,
    pub fallback_reasons: Vec<String>,
}

impl ScanSummary {
    /// Records whose port answered open
    pub fn open_ports(&self) -> Vec<&ScanRecord> {
        self.records
            .iter()
            .filter(|r| r.status == PortState::Open)
            .collect()
    }
}

enum ProbeBackend {
    Connect(ConnectScanner),
    // Single raw receive path; probes through it are serialized
    Syn(tokio::sync::Mutex<SynScanner>),
    Udp(UdpProbeScanner),
}

/// Port scan orchestrator
pub struct PortScanner {
    caps: Arc<Capabilities>,
    rate: Arc<RateController>,
    options: ScanOptions,
    cancel: CancellationToken,
}

impl PortScanner {
    pub fn new(
        caps: Arc<Capabilities>,
        rate: Arc<RateController>,
        options: ScanOptions,
        cancel: CancellationToken,
    ) -> Self {
        info!(
            "port scanner: type={}, concurrency={}, timeout={}ms",
            options.scan_type,
            options.concurrency,
            options.timeout.as_millis()
        );
        Self {
            caps,
            rate,
            options,
            cancel,
        }
    }

    /// Scan every (host, port) pair and summarize
    ///
    /// Per-probe failures become records; the scan itself always completes.
    pub async fn scan(&self, hosts: &[IpAddr], ports: &[u16]) -> ScanSummary {
        let run_id = Uuid::new_v4().to_string();
        let start = Utc::now();
        let mut fallback_reasons = Vec::new();

        let (mut effective, degrade_reason) = recommend_scan(&self.caps, self.options.scan_type);
        if let Some(reason) = degrade_reason {
            fallback_reasons.push(reason);
        }

        let backend = self.build_backend(&mut effective, &mut fallback_reasons);
        let degraded = self.options.scan_type == ScanType::Syn && effective == ScanType::Connect;

        info!(
            run_id = %run_id,
            hosts = hosts.len(),
            ports = ports.len(),
            scan_type = %effective,
            "scan started"
        );

        let backend = Arc::new(backend);
        let pairs: Vec<(IpAddr, u16)> = hosts
            .iter()
            .flat_map(|&h| ports.iter().map(move |&p| (h, p)))
            .collect();

        let mut records: Vec<ScanRecord> = stream::iter(pairs)
            .map(|(host, port)| {
                let backend = backend.clone();
                let rate = self.rate.clone();
                let cancel = self.cancel.clone();
                async move { probe_pair(backend, rate, cancel, host, port).await }
            })
            .buffer_unordered(self.options.concurrency)
            .collect::<Vec<_>>()
            .await;

        if degraded {
            tag_degraded_records(&mut records);
        }

        self.rate.close_window();
        let end = Utc::now();
        let duration_s = ((end - start).num_milliseconds() as f64 / 1000.0).max(0.001);

        let mut by_status: HashMap<String, usize> = HashMap::new();
        let mut by_service: HashMap<String, usize> = HashMap::new();
        for record in &records {
            *by_status.entry(record.status.to_string()).or_insert(0) += 1;
            if record.status == PortState::Open {
                if let Some(ref hint) = record.service_hint {
                    *by_service.entry(hint.name.clone()).or_insert(0) += 1;
                }
            }
        }

        info!(
            run_id = %run_id,
            open = by_status.get("open").copied().unwrap_or(0),
            records = records.len(),
            "scan complete"
        );

        ScanSummary {
            run_id,
            start,
            end,
            duration_s,
            hosts_scanned: hosts.len(),
            ports_per_host: ports.len(),
            scan_type_requested: self.options.scan_type,
            scan_type_used: effective,
            scan_rate_pps: records.len() as f64 / duration_s,
            records,
            by_status,
            by_service,
            privilege_mode: self.caps.level.to_string(),
            fallback_reasons,
        }
    }

    fn build_backend(&self, effective: &mut ScanType, reasons: &mut Vec<String>) -> ProbeBackend {
        match *effective {
            ScanType::Udp => ProbeBackend::Udp(UdpProbeScanner {
                read_timeout: self.options.udp_read_timeout,
            }),
            ScanType::Syn => match SynScanner::new(self.options.timeout) {
                Ok(scanner) => ProbeBackend::Syn(tokio::sync::Mutex::new(scanner)),
                Err(e) => {
                    warn!("SYN backend unavailable ({}), degrading to connect", e);
                    reasons.push(format!("raw socket open failed at scan time: {}", e));
                    *effective = ScanType::Connect;
                    self.connect_backend()
                }
            },
            _ => {
                *effective = ScanType::Connect;
                self.connect_backend()
            }
        }
    }

    fn connect_backend(&self) -> ProbeBackend {
        ProbeBackend::Connect(ConnectScanner {
            timeout: self.options.timeout,
            retry_count: self.options.retry_count,
            service_hints: self.options.service_hints,
            banner_timeout: self.options.banner_timeout,
        })
    }
}

async fn probe_pair(
    backend: Arc<ProbeBackend>,
    rate: Arc<RateController>,
    cancel: CancellationToken,
    host: IpAddr,
    port: u16,
) -> ScanRecord {
    let protocol = match *backend {
        ProbeBackend::Udp(_) => Protocol::Udp,
        _ => Protocol::Tcp,
    };

    if cancel.is_cancelled() {
        return cancelled_record(host, port, protocol);
    }

    tokio::select! {
        _ = cancel.cancelled() => return cancelled_record(host, port, protocol),
        _ = rate.acquire() => {}
    }

    let result = tokio::select! {
        _ = cancel.cancelled() => {
            rate.record_outcome(ProbeOutcome::Error);
            return cancelled_record(host, port, protocol);
        }
        result = run_probe(&backend, host, port) => result,
    };

    match result {
        Ok(record) => {
            rate.record_outcome(match record.status {
                PortState::Open | PortState::Closed => ProbeOutcome::Received,
                PortState::Filtered | PortState::OpenFiltered => ProbeOutcome::Timeout,
                PortState::Error => ProbeOutcome::Error,
            });
            record
        }
        Err(e) => {
            rate.record_outcome(ProbeOutcome::Error);
            ScanRecord::new(host, port, protocol, PortState::Error).with_detail(e.to_string())
        }
    }
}

async fn run_probe(backend: &ProbeBackend, host: IpAddr, port: u16) -> ProbeResult<ScanRecord> {
    match backend {
        ProbeBackend::Connect(scanner) => scanner.scan_port(host, port).await,
        ProbeBackend::Udp(scanner) => scanner.scan_port(host, port).await,
        ProbeBackend::Syn(scanner) => {
            let scanner = scanner.lock().await;
            scanner.scan_port(host, port).await
        }
    }
}

fn cancelled_record(host: IpAddr, port: u16, protocol: Protocol) -> ScanRecord {
    ScanRecord::new(host, port, protocol, PortState::Error).with_detail("cancelled")
}

/// Mark every open record from a degraded SYN request
fn tag_degraded_records(records: &mut [ScanRecord]) {
    for record in records.iter_mut().filter(|r| r.status == PortState::Open) {
        let hint = record
            .service_hint
            .get_or_insert_with(|| hint_for(record.port, None));
        hint.banner = Some(match hint.banner.take() {
            Some(banner) => format!("{} {}", banner, SYN_FALLBACK_TAG),
            None => SYN_FALLBACK_TAG.to_string(),
        });
    }
}

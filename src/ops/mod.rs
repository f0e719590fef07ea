/// Operations
///
/// The closed set of atomic operations the toolkit exposes: discover, scan,
/// banner grab, fingerprint, packet send, and privilege inspection. Every
/// operation
/// shares the same shape (targets, pacing, timeout -> summary) and passes
/// the compliance gate before its first probe. The template engine and the
/// quick-mode pipeline both dispatch on this variant set.

pub mod quick;

pub use quick::{run_quick, QuickReport};

use crate::compliance::{AuditLog, ComplianceGate, GateRequest};
use crate::config::{AppConfig, RateProfile};
use crate::detection::{analyze_banner, BannerGrabber, Fingerprint, Fingerprinter};
use crate::discovery::{DiscoveryEngine, DiscoveryOptions, DiscoverySummary};
use crate::error::{ProbeError, ProbeResult};
use crate::privilege::{Capabilities, PrivilegeProbe};
use crate::rate::RateController;
use crate::results::ResultStore;
use crate::scanner::{
    ConnectScanner, PortScanner, PortSpec, PortState, Protocol, ScanOptions, ScanSummary,
    ScanType, SynScanner, UdpProbeScanner,
};
use crate::target::TargetExpander;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

/// Target token that resolves to hosts already seen up this session
pub const LIVE_HOSTS_TOKEN: &str = "live";

/// One atomic operation request
#[derive(Debug, Clone)]
pub enum Operation {
    Discover {
        targets: Vec<String>,
    },
    Scan {
        targets: Vec<String>,
        ports: PortSpec,
        scan_type: ScanType,
    },
    BannerGrab {
        targets: Vec<String>,
        ports: PortSpec,
    },
    Fingerprint {
        targets: Vec<String>,
        ports: PortSpec,
    },
    PacketSend {
        targets: Vec<String>,
        port: u16,
        protocol: Protocol,
    },
    Privileges,
}

impl Operation {
    /// Name used in audit events and template step dispatch
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Discover { .. } => "discover",
            Operation::Scan { .. } => "scan",
            Operation::BannerGrab { .. } => "banner_grab",
            Operation::Fingerprint { .. } => "fingerprint",
            Operation::PacketSend { .. } => "packet_send",
            Operation::Privileges => "privileges",
        }
    }

    /// Build an operation from a template step's operation name and inputs
    pub fn from_step(
        operation: &str,
        inputs: &HashMap<String, serde_yaml::Value>,
    ) -> ProbeResult<Self> {
        let targets = || -> ProbeResult<Vec<String>> {
            match inputs.get("targets") {
                Some(serde_yaml::Value::String(s)) => Ok(vec![s.clone()]),
                Some(serde_yaml::Value::Sequence(seq)) => seq
                    .iter()
                    .map(|v| {
                        v.as_str().map(String::from).ok_or_else(|| {
                            ProbeError::validation("targets", "list elements must be strings")
                        })
                    })
                    .collect(),
                Some(_) => Err(ProbeError::validation(
                    "targets",
                    "must be a string or list of strings",
                )),
                None => Err(ProbeError::validation("targets", "input is required")),
            }
        };

        let ports = || -> ProbeResult<PortSpec> {
            match inputs.get("ports") {
                Some(serde_yaml::Value::String(s)) => PortSpec::parse(s),
                Some(_) => Err(ProbeError::validation("ports", "must be a string")),
                None => Ok(PortSpec::Named("top100".to_string())),
            }
        };

        match operation {
            "discover" => Ok(Operation::Discover { targets: targets()? }),
            "scan" => {
                let scan_type = match inputs.get("scan_type") {
                    Some(serde_yaml::Value::String(s)) => s.parse()?,
                    Some(_) => {
                        return Err(ProbeError::validation("scan_type", "must be a string"))
                    }
                    None => ScanType::Auto,
                };
                Ok(Operation::Scan {
                    targets: targets()?,
                    ports: ports()?,
                    scan_type,
                })
            }
            "banner_grab" => Ok(Operation::BannerGrab {
                targets: targets()?,
                ports: ports()?,
            }),
            "fingerprint" => Ok(Operation::Fingerprint {
                targets: targets()?,
                ports: ports()?,
            }),
            "packet_send" => {
                let port = match inputs.get("port") {
                    Some(serde_yaml::Value::Number(n)) => {
                        let raw = n.as_u64().unwrap_or(0);
                        if raw == 0 || raw > 65_535 {
                            return Err(ProbeError::invalid_port_spec(
                                raw.to_string(),
                                "port outside [1, 65535]",
                            ));
                        }
                        raw as u16
                    }
                    _ => return Err(ProbeError::validation("port", "integer input is required")),
                };
                let protocol = match inputs.get("protocol").and_then(|v| v.as_str()) {
                    Some("udp") => Protocol::Udp,
                    Some("tcp") | None => Protocol::Tcp,
                    Some(other) => {
                        return Err(ProbeError::validation(
                            "protocol",
                            format!("unknown protocol '{}'", other),
                        ))
                    }
                };
                Ok(Operation::PacketSend {
                    targets: targets()?,
                    port,
                    protocol,
                })
            }
            "privileges" => Ok(Operation::Privileges),
            other => Err(ProbeError::validation(
                "operation",
                format!("unknown operation '{}'", other),
            )),
        }
    }
}

/// Outcome of one custom packet probe
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacketReport {
    pub target: IpAddr,
    pub port: u16,
    pub protocol: Protocol,
    /// Technique actually used: syn, connect, or udp
    pub method: String,
    pub status: PortState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rtt_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Banner grab output row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BannerReport {
    pub target: IpAddr,
    pub port: u16,
    pub banner: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub confidence: u8,
}

/// Shared toolkit context: capability cache, gate, store, configuration
pub struct Toolkit {
    pub config: AppConfig,
    pub profile: RateProfile,
    pub caps: Arc<Capabilities>,
    pub gate: ComplianceGate,
    pub store: Arc<ResultStore>,
    pub cancel: CancellationToken,
    session_id: String,
    dangerous: bool,
    acknowledgement: Option<String>,
}

impl Toolkit {
    /// Initialize the toolkit: probe capabilities once, open the audit trail
    pub async fn init(config: AppConfig, cancel: CancellationToken) -> ProbeResult<Self> {
        let profile = config.rate_profile()?;
        let caps = PrivilegeProbe::detect().await?;
        let audit = Arc::new(AuditLog::open(&config.compliance.audit_log)?);
        let gate = ComplianceGate::new(audit, config.compliance.require_ack_for_public);

        info!(
            profile = %profile.name,
            privilege = %caps.level,
            "toolkit initialized"
        );

        Ok(Self {
            config,
            profile,
            caps,
            gate,
            store: Arc::new(ResultStore::new()),
            cancel,
            session_id: Uuid::new_v4().to_string(),
            dangerous: false,
            acknowledgement: None,
        })
    }

    /// Session identifier used in audit events
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Authorize this session for public targets
    ///
    /// The acknowledgement is the deliberate secondary input checked by the
    /// gate; passing the flag alone is not enough.
    pub fn authorize_dangerous(&mut self, acknowledgement: Option<String>) {
        self.dangerous = true;
        self.acknowledgement = acknowledgement;
    }

    fn new_rate(&self) -> Arc<RateController> {
        Arc::new(RateController::new(self.profile.rate_pps, &self.config.rate))
    }

    /// Expand target inputs, resolving the `live` token from the store
    async fn expand(&self, targets: &[String]) -> ProbeResult<(Vec<IpAddr>, Option<String>)> {
        if targets.len() == 1 && targets[0] == LIVE_HOSTS_TOKEN {
            let hosts = self.store.known_live_hosts();
            if hosts.is_empty() {
                return Err(ProbeError::invalid_target(
                    LIVE_HOSTS_TOKEN,
                    "no live hosts recorded yet in this session",
                ));
            }
            return Ok((hosts, None));
        }

        let expander = TargetExpander::new(crate::netinfo::InterfaceEnumerator::new());
        let expansion = expander.expand(targets).await?;
        Ok((expansion.addresses, expansion.interface_used))
    }

    fn admit(&self, command: &str, addresses: &[IpAddr]) -> ProbeResult<()> {
        self.gate.check(&GateRequest {
            session_id: self.session_id.clone(),
            command: command.to_string(),
            targets: addresses.to_vec(),
            dangerous: self.dangerous,
            acknowledgement: self.acknowledgement.clone(),
        })?;
        Ok(())
    }

    /// Run host discovery over the given target inputs
    pub async fn discover(&self, targets: &[String]) -> ProbeResult<DiscoverySummary> {
        let (addresses, interface_used) = self.expand(targets).await?;
        self.admit("discover", &addresses)?;

        let options = DiscoveryOptions::from_config(&self.config.discovery, &self.profile);
        let engine = DiscoveryEngine::new(
            self.caps.clone(),
            self.new_rate(),
            options,
            self.cancel.clone(),
        );

        let summary = engine
            .discover(&addresses, targets.len(), interface_used)
            .await;
        self.store.put_discovery(summary.clone());
        Ok(summary)
    }

    /// Run a port scan over the given target inputs
    pub async fn scan(
        &self,
        targets: &[String],
        ports: &PortSpec,
        scan_type: ScanType,
    ) -> ProbeResult<ScanSummary> {
        let (addresses, _) = self.expand(targets).await?;
        self.admit("scan", &addresses)?;
        let port_list = ports.resolve();
        if port_list.is_empty() {
            return Err(ProbeError::invalid_port_spec(
                ports.to_string(),
                "resolved to no ports",
            ));
        }

        let options = ScanOptions::from_config(&self.config.scanner, &self.profile, scan_type);
        let scanner = PortScanner::new(
            self.caps.clone(),
            self.new_rate(),
            options,
            self.cancel.clone(),
        );

        let summary = scanner.scan(&addresses, &port_list).await;
        self.store.put_scan(summary.clone());
        Ok(summary)
    }

    /// Grab and analyze banners from the given endpoints
    pub async fn banner_grab(
        &self,
        targets: &[String],
        ports: &PortSpec,
    ) -> ProbeResult<Vec<BannerReport>> {
        let (addresses, _) = self.expand(targets).await?;
        self.admit("banner_grab", &addresses)?;

        let grabber = BannerGrabber::new(self.profile.timeout(), 1024);
        let rate = self.new_rate();
        let port_list = ports.resolve();

        let endpoints: Vec<(IpAddr, u16)> = addresses
            .iter()
            .flat_map(|&h| port_list.iter().map(move |&p| (h, p)))
            .collect();

        let grabber = &grabber;
        let reports: Vec<BannerReport> = stream::iter(endpoints)
            .map(|(target, port)| {
                let rate = rate.clone();
                async move {
                    rate.acquire().await;
                    match grabber.grab(target, port).await {
                        Ok(Some(banner)) => {
                            rate.record_outcome(crate::rate::ProbeOutcome::Received);
                            let analysis = analyze_banner(&banner.data);
                            Some(BannerReport {
                                target,
                                port,
                                banner: banner.data,
                                service: analysis.service,
                                version: analysis.version,
                                confidence: analysis.confidence,
                            })
                        }
                        Ok(None) => {
                            rate.record_outcome(crate::rate::ProbeOutcome::Timeout);
                            None
                        }
                        Err(_) => {
                            rate.record_outcome(crate::rate::ProbeOutcome::Error);
                            None
                        }
                    }
                }
            })
            .buffer_unordered(self.profile.concurrency)
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .flatten()
            .collect();

        Ok(reports)
    }

    /// Run protocol fingerprints against the given endpoints
    pub async fn fingerprint(
        &self,
        targets: &[String],
        ports: &PortSpec,
    ) -> ProbeResult<Vec<Fingerprint>> {
        let (addresses, _) = self.expand(targets).await?;
        self.admit("fingerprint", &addresses)?;

        let prober = Fingerprinter::new(self.profile.timeout());
        let rate = self.new_rate();
        let port_list = ports.resolve();

        let endpoints: Vec<(IpAddr, u16)> = addresses
            .iter()
            .flat_map(|&h| port_list.iter().map(move |&p| (h, p)))
            .collect();

        let prober = &prober;
        let fingerprints: Vec<Fingerprint> = stream::iter(endpoints)
            .map(|(target, port)| {
                let rate = rate.clone();
                async move {
                    rate.acquire().await;
                    let fp = prober.probe(target, port).await;
                    rate.record_outcome(if fp.is_empty() {
                        crate::rate::ProbeOutcome::Timeout
                    } else {
                        crate::rate::ProbeOutcome::Received
                    });
                    fp
                }
            })
            .buffer_unordered(self.profile.concurrency)
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .filter(|fp| !fp.is_empty())
            .collect();

        Ok(fingerprints)
    }

    /// Send one custom probe packet to each target
    ///
    /// TCP uses a crafted SYN when raw sockets allow it and degrades to a
    /// connect probe otherwise; UDP sends the service-appropriate payload.
    pub async fn packet_send(
        &self,
        targets: &[String],
        port: u16,
        protocol: Protocol,
    ) -> ProbeResult<Vec<PacketReport>> {
        let (addresses, _) = self.expand(targets).await?;
        self.admit("packet_send", &addresses)?;

        let rate = self.new_rate();
        let mut reports = Vec::with_capacity(addresses.len());

        match protocol {
            Protocol::Udp => {
                let scanner = UdpProbeScanner {
                    read_timeout: Duration::from_millis(
                        self.config.scanner.udp_read_timeout_ms.min(500),
                    ),
                };
                for &target in &addresses {
                    rate.acquire().await;
                    let record = scanner.scan_port(target, port).await?;
                    rate.record_outcome(outcome_for_state(record.status));
                    reports.push(PacketReport {
                        target,
                        port,
                        protocol,
                        method: "udp".to_string(),
                        status: record.status,
                        rtt_ms: record.rtt_ms,
                        note: record.detail,
                    });
                }
            }
            Protocol::Tcp => {
                let syn = if self.caps.syn_scan {
                    SynScanner::new(self.profile.timeout()).ok()
                } else {
                    None
                };

                match syn {
                    Some(syn) => {
                        for &target in &addresses {
                            rate.acquire().await;
                            match syn.scan_port(target, port).await {
                                Ok(record) => {
                                    rate.record_outcome(outcome_for_state(record.status));
                                    reports.push(PacketReport {
                                        target,
                                        port,
                                        protocol,
                                        method: "syn".to_string(),
                                        status: record.status,
                                        rtt_ms: record.rtt_ms,
                                        note: record.detail,
                                    });
                                }
                                Err(e) => {
                                    rate.record_outcome(crate::rate::ProbeOutcome::Error);
                                    reports.push(PacketReport {
                                        target,
                                        port,
                                        protocol,
                                        method: "syn".to_string(),
                                        status: PortState::Error,
                                        rtt_ms: None,
                                        note: Some(e.to_string()),
                                    });
                                }
                            }
                        }
                    }
                    None => {
                        let connect = ConnectScanner {
                            timeout: self.profile.timeout(),
                            retry_count: self.profile.retries,
                            service_hints: false,
                            banner_timeout: Duration::from_millis(
                                self.config.scanner.banner_timeout_ms,
                            ),
                        };
                        for &target in &addresses {
                            rate.acquire().await;
                            let record = connect.scan_port(target, port).await?;
                            rate.record_outcome(outcome_for_state(record.status));
                            reports.push(PacketReport {
                                target,
                                port,
                                protocol,
                                method: "connect".to_string(),
                                status: record.status,
                                rtt_ms: record.rtt_ms,
                                note: Some(
                                    "raw sockets unavailable, connect probe used".to_string(),
                                ),
                            });
                        }
                    }
                }
            }
        }

        Ok(reports)
    }

    /// Execute one operation and serialize its summary
    pub async fn run_operation(&self, operation: &Operation) -> ProbeResult<serde_json::Value> {
        match operation {
            Operation::Discover { targets } => {
                let summary = self.discover(targets).await?;
                serde_json::to_value(summary).map_err(into_output_error)
            }
            Operation::Scan {
                targets,
                ports,
                scan_type,
            } => {
                let summary = self.scan(targets, ports, *scan_type).await?;
                serde_json::to_value(summary).map_err(into_output_error)
            }
            Operation::BannerGrab { targets, ports } => {
                let reports = self.banner_grab(targets, ports).await?;
                serde_json::to_value(reports).map_err(into_output_error)
            }
            Operation::Fingerprint { targets, ports } => {
                let fingerprints = self.fingerprint(targets, ports).await?;
                serde_json::to_value(fingerprints).map_err(into_output_error)
            }
            Operation::PacketSend {
                targets,
                port,
                protocol,
            } => {
                let reports = self.packet_send(targets, *port, *protocol).await?;
                serde_json::to_value(reports).map_err(into_output_error)
            }
            Operation::Privileges => Ok(json!({
                "level": self.caps.level.to_string(),
                "raw_socket": self.caps.raw_socket,
                "icmp_socket": self.caps.icmp_socket,
                "system_ping": self.caps.system_ping,
                "tcp_connect": self.caps.tcp_connect,
                "udp": self.caps.udp,
                "syn_scan": self.caps.syn_scan,
                "fallback_reasons": self.caps.fallback_reasons,
            })),
        }
    }
}

fn into_output_error(e: serde_json::Error) -> ProbeError {
    ProbeError::fatal(format!("summary serialization failed: {}", e))
}

fn outcome_for_state(status: PortState) -> crate::rate::ProbeOutcome {
    match status {
        PortState::Open | PortState::Closed => crate::rate::ProbeOutcome::Received,
        PortState::Filtered | PortState::OpenFiltered => crate::rate::ProbeOutcome::Timeout,
        PortState::Error => crate::rate::ProbeOutcome::Error,
    }
}

/// Bridges template steps onto toolkit operations
pub struct OperationRunner {
    toolkit: Arc<Toolkit>,
}

impl OperationRunner {
    pub fn new(toolkit: Arc<Toolkit>) -> Self {
        Self { toolkit }
    }
}

#[async_trait]
impl crate::template::StepRunner for OperationRunner {
    async fn run(
        &self,
        operation: &str,
        inputs: &HashMap<String, serde_yaml::Value>,
    ) -> ProbeResult<serde_json::Value> {
        let operation = Operation::from_step(operation, inputs)?;
        self.toolkit.run_operation(&operation).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compliance::{ComplianceEvent, ComplianceStatus};
    use tempfile::tempdir;

    async fn toolkit(dir: &tempfile::TempDir) -> Toolkit {
        let mut config = AppConfig::default();
        config.compliance.audit_log = dir
            .path()
            .join("audit.jsonl")
            .display()
            .to_string();
        config.rate.profile = "fast".to_string();
        Toolkit::init(config, CancellationToken::new()).await.unwrap()
    }

    #[tokio::test]
    async fn test_public_block_without_authorization() {
        let dir = tempdir().unwrap();
        let tk = toolkit(&dir).await;

        let err = tk
            .discover(&["1.1.1.0/30".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, ProbeError::PolicyViolation { .. }));

        // No records were stored and the block was audited
        assert!(tk.store.is_empty());
        let audit = std::fs::read_to_string(dir.path().join("audit.jsonl")).unwrap();
        let event: ComplianceEvent =
            serde_json::from_str(audit.lines().next().unwrap()).unwrap();
        assert_eq!(event.status, ComplianceStatus::Blocked);
        assert!(event.block_reason.unwrap().contains("authorization flag"));
    }

    #[tokio::test]
    async fn test_private_discover_stores_summary() {
        let dir = tempdir().unwrap();
        let tk = toolkit(&dir).await;

        let summary = tk.discover(&["127.0.0.1".to_string()]).await.unwrap();
        assert_eq!(summary.hosts_discovered, 1);
        assert_eq!(tk.store.len(), 1);
        assert_eq!(tk.store.known_live_hosts(), vec!["127.0.0.1".parse::<IpAddr>().unwrap()]);
    }

    #[tokio::test]
    async fn test_live_token_requires_prior_discovery() {
        let dir = tempdir().unwrap();
        let tk = toolkit(&dir).await;

        let err = tk
            .scan(
                &[LIVE_HOSTS_TOKEN.to_string()],
                &PortSpec::List(vec![80]),
                ScanType::Connect,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ProbeError::InvalidTarget { .. }));
    }

    #[tokio::test]
    async fn test_live_token_after_discovery() {
        let dir = tempdir().unwrap();
        let tk = toolkit(&dir).await;

        tk.discover(&["127.0.0.1".to_string()]).await.unwrap();
        let summary = tk
            .scan(
                &[LIVE_HOSTS_TOKEN.to_string()],
                &PortSpec::List(vec![1]),
                ScanType::Connect,
            )
            .await
            .unwrap();
        assert_eq!(summary.hosts_scanned, 1);
    }

    #[tokio::test]
    async fn test_packet_send_tcp_loopback() {
        let dir = tempdir().unwrap();
        let tk = toolkit(&dir).await;

        // Bind then drop so the port refuses deterministically
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let reports = tk
            .packet_send(&["127.0.0.1".to_string()], port, Protocol::Tcp)
            .await
            .unwrap();

        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].status, PortState::Closed);
        assert!(["syn", "connect"].contains(&reports[0].method.as_str()));
    }

    #[tokio::test]
    async fn test_packet_send_udp_silent() {
        let dir = tempdir().unwrap();
        let tk = toolkit(&dir).await;

        let socket = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        let port = socket.local_addr().unwrap().port();

        let reports = tk
            .packet_send(&["127.0.0.1".to_string()], port, Protocol::Udp)
            .await
            .unwrap();

        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].method, "udp");
        assert_eq!(reports[0].status, PortState::OpenFiltered);
    }

    #[test]
    fn test_from_step_packet_send() {
        let mut inputs = HashMap::new();
        inputs.insert(
            "targets".to_string(),
            serde_yaml::Value::String("127.0.0.1".to_string()),
        );
        inputs.insert("port".to_string(), serde_yaml::Value::Number(443.into()));
        inputs.insert(
            "protocol".to_string(),
            serde_yaml::Value::String("tcp".to_string()),
        );

        let op = Operation::from_step("packet_send", &inputs).unwrap();
        assert_eq!(op.name(), "packet_send");

        inputs.insert("port".to_string(), serde_yaml::Value::Number(0.into()));
        assert!(Operation::from_step("packet_send", &inputs).is_err());
    }

    #[tokio::test]
    async fn test_privileges_operation() {
        let dir = tempdir().unwrap();
        let tk = toolkit(&dir).await;

        let output = tk.run_operation(&Operation::Privileges).await.unwrap();
        assert_eq!(output["tcp_connect"], true);
        assert!(output["level"].is_string());
    }

    #[test]
    fn test_from_step_parsing() {
        let mut inputs = HashMap::new();
        inputs.insert(
            "targets".to_string(),
            serde_yaml::Value::String("10.0.0.0/24".to_string()),
        );
        inputs.insert(
            "ports".to_string(),
            serde_yaml::Value::String("22,80".to_string()),
        );
        inputs.insert(
            "scan_type".to_string(),
            serde_yaml::Value::String("connect".to_string()),
        );

        let op = Operation::from_step("scan", &inputs).unwrap();
        match op {
            Operation::Scan {
                targets,
                ports,
                scan_type,
            } => {
                assert_eq!(targets, vec!["10.0.0.0/24"]);
                assert_eq!(ports.resolve(), vec![22, 80]);
                assert_eq!(scan_type, ScanType::Connect);
            }
            other => panic!("unexpected operation {:?}", other),
        }
    }

    #[test]
    fn test_from_step_requires_targets() {
        let err = Operation::from_step("discover", &HashMap::new()).unwrap_err();
        assert!(err.to_string().contains("required"));
    }

    #[test]
    fn test_from_step_unknown_operation() {
        let mut inputs = HashMap::new();
        inputs.insert(
            "targets".to_string(),
            serde_yaml::Value::String("127.0.0.1".to_string()),
        );
        assert!(Operation::from_step("exploit", &inputs).is_err());
    }
}

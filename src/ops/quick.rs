/// Quick mode
///
/// The guided pipeline: resolve the local network, discover live hosts,
/// scan the usual ports, and fingerprint whatever answered. Each stage
/// feeds the next; an empty stage ends the run early with whatever was
/// gathered.

use crate::detection::Fingerprint;
use crate::discovery::DiscoverySummary;
use crate::error::ProbeResult;
use crate::ops::Toolkit;
use crate::scanner::{PortSpec, ScanSummary, ScanType};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Combined output of a quick run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuickReport {
    pub discovery: DiscoverySummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scan: Option<ScanSummary>,
    pub fingerprints: Vec<Fingerprint>,
}

/// Run the full discovery -> scan -> fingerprint pipeline against the
/// local network
///
/// # Arguments
/// * `toolkit` - Initialized toolkit context
/// * `targets` - Target inputs; defaults to `auto` when empty
pub async fn run_quick(toolkit: &Toolkit, targets: &[String]) -> ProbeResult<QuickReport> {
    let targets: Vec<String> = if targets.is_empty() {
        vec!["auto".to_string()]
    } else {
        targets.to_vec()
    };

    info!("quick mode: discovering {:?}", targets);
    let discovery = toolkit.discover(&targets).await?;

    let live: Vec<String> = discovery
        .live_hosts()
        .iter()
        .map(|h| h.to_string())
        .collect();

    if live.is_empty() {
        info!("quick mode: no live hosts, stopping after discovery");
        return Ok(QuickReport {
            discovery,
            scan: None,
            fingerprints: Vec::new(),
        });
    }

    info!("quick mode: scanning {} live host(s)", live.len());
    let ports = PortSpec::Named("top100".to_string());
    let scan = toolkit.scan(&live, &ports, ScanType::Auto).await?;

    let open: Vec<(String, u16)> = scan
        .open_ports()
        .iter()
        .map(|r| (r.host.to_string(), r.port))
        .collect();

    if open.is_empty() {
        info!("quick mode: no open ports, stopping after scan");
        return Ok(QuickReport {
            discovery,
            scan: Some(scan),
            fingerprints: Vec::new(),
        });
    }

    info!("quick mode: fingerprinting {} open port(s)", open.len());
    let mut fingerprints = Vec::new();
    for (host, port) in &open {
        let spec = PortSpec::List(vec![*port]);
        let mut found = toolkit
            .fingerprint(std::slice::from_ref(host), &spec)
            .await?;
        fingerprints.append(&mut found);
    }

    Ok(QuickReport {
        discovery,
        scan: Some(scan),
        fingerprints,
    })
}

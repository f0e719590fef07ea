/// Compliance gate
///
/// Every public entry point passes its expanded target list through this
/// gate before any packet leaves the host. Private-range targets flow
/// through freely; public targets require the explicit `dangerous` flag and
/// a confirming acknowledgement token. Every decision, allowed or blocked,
/// is appended to the audit trail.

pub mod audit;

pub use audit::AuditLog;

use crate::error::{ProbeError, ProbeResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{info, warn};

/// The deliberate secondary input required to touch public targets
pub const ACK_TOKEN: &str = "YES";

/// Risk classification of a gated request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    High,
}

/// Gate decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComplianceStatus {
    Allowed,
    Blocked,
}

/// One audited gate decision, appended as a single JSON object per line
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceEvent {
    pub timestamp: DateTime<Utc>,
    pub session_id: String,
    pub command: String,
    pub targets: usize,
    pub public_targets: Vec<IpAddr>,
    pub risk_level: RiskLevel,
    pub status: ComplianceStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_reason: Option<String>,
}

/// A request presented to the gate
#[derive(Debug, Clone)]
pub struct GateRequest {
    pub session_id: String,
    pub command: String,
    pub targets: Vec<IpAddr>,
    pub dangerous: bool,
    pub acknowledgement: Option<String>,
}

/// Classify an address as private for gating purposes
///
/// Private means RFC 1918, loopback, or link-local. Everything else,
/// including CGNAT and documentation ranges, is treated as public.
pub fn is_private(addr: &IpAddr) -> bool {
    match addr {
        IpAddr::V4(v4) => v4.is_private() || v4.is_loopback() || v4.is_link_local(),
        IpAddr::V6(v6) => {
            v6.is_loopback()
                // fe80::/10 link-local
                || (v6.segments()[0] & 0xffc0) == 0xfe80
                // fc00::/7 unique-local
                || (v6.segments()[0] & 0xfe00) == 0xfc00
        }
    }
}

/// The compliance gate itself
pub struct ComplianceGate {
    audit: Arc<AuditLog>,
    require_ack: bool,
}

impl ComplianceGate {
    /// Create a gate writing to the given audit trail
    pub fn new(audit: Arc<AuditLog>, require_ack: bool) -> Self {
        Self { audit, require_ack }
    }

    /// Admit or block a request
    ///
    /// Blocks return `PolicyViolation` and guarantee no probe was sent.
    /// The decision is appended to the audit trail either way.
    pub fn check(&self, request: &GateRequest) -> ProbeResult<ComplianceEvent> {
        let public_targets: Vec<IpAddr> = request
            .targets
            .iter()
            .filter(|t| !is_private(t))
            .copied()
            .collect();

        let risk_level = if public_targets.is_empty() {
            RiskLevel::Low
        } else {
            RiskLevel::High
        };

        let block_reason = self.evaluate(request, &public_targets);

        let event = ComplianceEvent {
            timestamp: Utc::now(),
            session_id: request.session_id.clone(),
            command: request.command.clone(),
            targets: request.targets.len(),
            public_targets,
            risk_level,
            status: if block_reason.is_none() {
                ComplianceStatus::Allowed
            } else {
                ComplianceStatus::Blocked
            },
            block_reason: block_reason.clone(),
        };

        self.audit.append(&event)?;

        match block_reason {
            None => {
                info!(
                    session = %request.session_id,
                    command = %request.command,
                    targets = request.targets.len(),
                    "compliance gate: allowed"
                );
                Ok(event)
            }
            Some(reason) => {
                warn!(
                    session = %request.session_id,
                    command = %request.command,
                    reason = %reason,
                    "compliance gate: blocked"
                );
                Err(ProbeError::policy_violation(reason))
            }
        }
    }

    fn evaluate(&self, request: &GateRequest, public_targets: &[IpAddr]) -> Option<String> {
        if public_targets.is_empty() {
            return None;
        }

        if !request.dangerous {
            return Some(format!(
                "{} public target(s) require the dangerous authorization flag",
                public_targets.len()
            ));
        }

        if self.require_ack {
            match request.acknowledgement.as_deref() {
                Some(token) if token == ACK_TOKEN => None,
                Some(_) => Some(format!(
                    "acknowledgement token did not match '{}', user declined confirmation",
                    ACK_TOKEN
                )),
                None => Some(format!(
                    "public targets require the confirming acknowledgement token '{}'",
                    ACK_TOKEN
                )),
            }
        } else {
            None
        }
    }
}

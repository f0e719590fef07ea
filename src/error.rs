/// Error handling for netprobe
///
/// This module defines all custom error types and implements proper error handling
/// throughout the toolkit using thiserror for ergonomic error definitions.
///
/// The taxonomy distinguishes errors that abort an operation before any probe
/// is sent (invalid input, policy violations, fatal setup failures) from errors
/// that are captured per-record and never interrupt a run (transient network
/// failures, permission-class probe failures).

use std::net::IpAddr;
use thiserror::Error;
use tracing::error;

/// Main error type for netprobe operations
#[derive(Error, Debug)]
pub enum ProbeError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed target specification
    #[error("Invalid target: {target} - {reason}")]
    InvalidTarget { target: String, reason: String },

    /// Target expansion exceeded the per-input address cap
    #[error("Target expansion too large: {input} expands to {count} addresses (cap {cap})")]
    ExpansionOverflow {
        input: String,
        count: usize,
        cap: usize,
    },

    /// Invalid port number or port specification
    #[error("Invalid port specification: {spec} - {reason}")]
    InvalidPortSpec { spec: String, reason: String },

    /// Invalid port range
    #[error("Invalid port range: {start}-{end}")]
    InvalidPortRange { start: u32, end: u32 },

    /// Template document failed validation
    #[error("Invalid template: {reason}")]
    InvalidTemplate { reason: String },

    /// Template step dependency graph contains a cycle
    #[error("Template dependency cycle involving step '{step}'")]
    DependencyCycle { step: String },

    /// Template parameter failed type or rule validation
    #[error("Invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },

    /// Request blocked by the compliance gate
    #[error("Policy violation: {reason}")]
    PolicyViolation { reason: String },

    /// Requested method unavailable at the current privilege level
    #[error("Capability missing: {capability} - {fallback}")]
    CapabilityMissing {
        capability: String,
        fallback: String,
    },

    /// Transient network failures (recorded per-record, never aborts a run)
    #[error("Network error: {message}")]
    Network { message: String },

    /// Timeout on a single probe
    #[error("Timeout: operation timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// EPERM/EACCES on a socket operation
    #[error("Permission denied: {operation} requires elevated privileges")]
    PermissionDenied { operation: String },

    /// Operation cancelled from the entry point
    #[error("Cancelled: {operation}")]
    Cancelled { operation: String },

    /// Per-target discovery failure
    #[error("Discovery failed for {target}: {reason}")]
    DiscoveryFailed { target: IpAddr, reason: String },

    /// Per-port scan failure
    #[error("Scan failed on {target}:{port} - {reason}")]
    ScanFailed {
        target: IpAddr,
        port: u16,
        reason: String,
    },

    /// Packet crafting/parsing errors
    #[error("Packet error: {message}")]
    Packet { message: String },

    /// Unrecoverable setup failure (no usable interface, config unwritable)
    #[error("Fatal: {message}")]
    Fatal { message: String },

    /// Validation errors on configuration or input fields
    #[error("Validation error: {field} - {reason}")]
    Validation { field: String, reason: String },
}

/// Result type alias for netprobe operations
pub type ProbeResult<T> = Result<T, ProbeError>;

impl ProbeError {
    /// Create a network error
    pub fn network<S: Into<String>>(message: S) -> Self {
        ProbeError::Network {
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(timeout_ms: u64) -> Self {
        ProbeError::Timeout { timeout_ms }
    }

    /// Create a permission denied error
    pub fn permission_denied<S: Into<String>>(operation: S) -> Self {
        ProbeError::PermissionDenied {
            operation: operation.into(),
        }
    }

    /// Create a cancelled error
    pub fn cancelled<S: Into<String>>(operation: S) -> Self {
        ProbeError::Cancelled {
            operation: operation.into(),
        }
    }

    /// Create an invalid target error
    pub fn invalid_target<S1: Into<String>, S2: Into<String>>(target: S1, reason: S2) -> Self {
        ProbeError::InvalidTarget {
            target: target.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid port specification error
    pub fn invalid_port_spec<S1: Into<String>, S2: Into<String>>(spec: S1, reason: S2) -> Self {
        ProbeError::InvalidPortSpec {
            spec: spec.into(),
            reason: reason.into(),
        }
    }

    /// Create a policy violation error
    pub fn policy_violation<S: Into<String>>(reason: S) -> Self {
        ProbeError::PolicyViolation {
            reason: reason.into(),
        }
    }

    /// Create a capability missing error
    pub fn capability_missing<S1: Into<String>, S2: Into<String>>(
        capability: S1,
        fallback: S2,
    ) -> Self {
        ProbeError::CapabilityMissing {
            capability: capability.into(),
            fallback: fallback.into(),
        }
    }

    /// Create a discovery failed error
    pub fn discovery_failed<S: Into<String>>(target: IpAddr, reason: S) -> Self {
        ProbeError::DiscoveryFailed {
            target,
            reason: reason.into(),
        }
    }

    /// Create a scan failed error
    pub fn scan_failed<S: Into<String>>(target: IpAddr, port: u16, reason: S) -> Self {
        ProbeError::ScanFailed {
            target,
            port,
            reason: reason.into(),
        }
    }

    /// Create a packet error
    pub fn packet<S: Into<String>>(message: S) -> Self {
        ProbeError::Packet {
            message: message.into(),
        }
    }

    /// Create a fatal error
    pub fn fatal<S: Into<String>>(message: S) -> Self {
        ProbeError::Fatal {
            message: message.into(),
        }
    }

    /// Create an invalid template error
    pub fn invalid_template<S: Into<String>>(reason: S) -> Self {
        ProbeError::InvalidTemplate {
            reason: reason.into(),
        }
    }

    /// Create an invalid parameter error
    pub fn invalid_parameter<S1: Into<String>, S2: Into<String>>(name: S1, reason: S2) -> Self {
        ProbeError::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create a validation error
    pub fn validation<S1: Into<String>, S2: Into<String>>(field: S1, reason: S2) -> Self {
        ProbeError::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error is raised before any probe is sent
    pub fn is_pre_execution(&self) -> bool {
        matches!(
            self,
            ProbeError::InvalidTarget { .. }
                | ProbeError::ExpansionOverflow { .. }
                | ProbeError::InvalidPortSpec { .. }
                | ProbeError::InvalidPortRange { .. }
                | ProbeError::InvalidTemplate { .. }
                | ProbeError::DependencyCycle { .. }
                | ProbeError::InvalidParameter { .. }
                | ProbeError::PolicyViolation { .. }
                | ProbeError::Validation { .. }
        )
    }

    /// Whether this error is captured per-record rather than aborting a run
    pub fn is_per_record(&self) -> bool {
        matches!(
            self,
            ProbeError::Network { .. }
                | ProbeError::Timeout { .. }
                | ProbeError::PermissionDenied { .. }
                | ProbeError::DiscoveryFailed { .. }
                | ProbeError::ScanFailed { .. }
        )
    }

    /// Whether this error class triggers method elimination in fallback probing
    pub fn is_permission_class(&self) -> bool {
        match self {
            ProbeError::PermissionDenied { .. } => true,
            ProbeError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::PermissionDenied | std::io::ErrorKind::Unsupported
            ),
            _ => false,
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProbeError::Timeout { .. }
                | ProbeError::Network { .. }
                | ProbeError::ScanFailed { .. }
                | ProbeError::DiscoveryFailed { .. }
        )
    }

    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            ProbeError::Config(_) | ProbeError::Fatal { .. } => ErrorSeverity::Critical,
            ProbeError::PolicyViolation { .. } | ProbeError::Io(_) => ErrorSeverity::High,
            ProbeError::InvalidTarget { .. }
            | ProbeError::ExpansionOverflow { .. }
            | ProbeError::InvalidPortSpec { .. }
            | ProbeError::InvalidPortRange { .. }
            | ProbeError::InvalidTemplate { .. }
            | ProbeError::DependencyCycle { .. }
            | ProbeError::InvalidParameter { .. }
            | ProbeError::Validation { .. }
            | ProbeError::CapabilityMissing { .. } => ErrorSeverity::Medium,
            ProbeError::Timeout { .. }
            | ProbeError::Network { .. }
            | ProbeError::PermissionDenied { .. }
            | ProbeError::Cancelled { .. }
            | ProbeError::DiscoveryFailed { .. }
            | ProbeError::ScanFailed { .. }
            | ProbeError::Packet { .. } => ErrorSeverity::Low,
        }
    }

    /// Log this error with appropriate level and context
    pub fn log(&self) {
        match self.severity() {
            ErrorSeverity::Critical | ErrorSeverity::High => {
                error!("{}", self);
            }
            ErrorSeverity::Medium => {
                tracing::warn!("{}", self);
            }
            ErrorSeverity::Low => {
                tracing::debug!("{}", self);
            }
        }
    }
}

/// Error severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorSeverity::Low => write!(f, "LOW"),
            ErrorSeverity::Medium => write!(f, "MEDIUM"),
            ErrorSeverity::High => write!(f, "HIGH"),
            ErrorSeverity::Critical => write!(f, "CRITICAL"),
        }
    }
}

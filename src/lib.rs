/// netprobe - Network Security Testing Toolkit
///
/// Host discovery, port scanning, service identification, and declarative
/// workflow execution for authorized network testing, with privilege-aware
/// method selection and a compliance gate in front of every operation.

// Module declarations
pub mod compliance;
pub mod config;
pub mod detection;
pub mod discovery;
pub mod error;
pub mod logging;
pub mod netinfo;
pub mod ops;
pub mod packet;
pub mod privilege;
pub mod rate;
pub mod results;
pub mod scanner;
pub mod target;
pub mod template;

// Re-export commonly used types
pub use compliance::{AuditLog, ComplianceEvent, ComplianceGate};
pub use config::{AppConfig, RateProfile};
pub use detection::{BannerGrabber, Fingerprint, Fingerprinter};
pub use discovery::{DiscoveryEngine, DiscoveryRecord, DiscoverySummary, HostState};
pub use error::{ProbeError, ProbeResult};
pub use ops::{run_quick, Operation, OperationRunner, QuickReport, Toolkit};
pub use privilege::{Capabilities, PrivilegeLevel, PrivilegeProbe};
pub use rate::{RateAdjustment, RateController, RateWindow};
pub use results::ResultStore;
pub use scanner::{PortScanner, PortSpec, ScanRecord, ScanSummary, ScanType};
pub use target::{TargetExpander, TargetSpec};
pub use template::{ExecutionSummary, TemplateDefinition, TemplateEngine};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Initialize the library with configuration
///
/// Loads configuration (creating the default file when missing),
/// initializes logging, probes privileges once, and returns the toolkit
/// context.
///
/// # Arguments
/// * `config_path` - Optional path to configuration file (defaults if None)
///
/// # Returns
/// * Toolkit context and the logging guard (must be kept alive)
pub async fn init_library<P: AsRef<std::path::Path>>(
    config_path: Option<P>,
) -> ProbeResult<(
    Toolkit,
    Option<tracing_appender::non_blocking::WorkerGuard>,
)> {
    use tokio_util::sync::CancellationToken;
    use tracing::info;

    let config = if let Some(path) = config_path {
        AppConfig::load_or_create(path)?
    } else {
        AppConfig::default()
    };

    let guard = logging::init_logging(&config.logging)?;

    info!("{} v{} initialized", NAME, VERSION);

    let toolkit = Toolkit::init(config, CancellationToken::new()).await?;

    Ok((toolkit, guard))
}

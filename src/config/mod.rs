/// Configuration module for netprobe
///
/// This module handles loading and validating the single configuration file
/// (config.toml) that controls rate profiles, discovery behavior, scanning
/// defaults, and compliance settings.

use crate::error::{ProbeError, ProbeResult};
use config::{Config, ConfigError, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub general: GeneralConfig,
    pub logging: LoggingConfig,
    pub rate: RateConfig,
    pub discovery: DiscoveryConfig,
    pub scanner: ScannerConfig,
    pub compliance: ComplianceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    pub app_name: String,
    pub session_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
    pub file_logging: bool,
    pub log_dir: String,
    pub max_files: usize,
}

/// Rate profile selection plus adaptive-control parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateConfig {
    /// Name of the active profile: slow, medium, fast, ludicrous
    pub profile: String,
    pub adaptive: bool,
    pub window_secs: u64,
    pub high_loss_threshold: f64,
    pub downshift_step: f64,
    pub upshift_step: f64,
    pub good_windows_required: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    pub method_fallback: bool,
    pub sampling_enabled: bool,
    /// Target count at or above which sampling kicks in (/22-equivalent)
    pub sampling_threshold: usize,
    pub sampling_percent: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    pub default_ports: String,
    pub service_hints: bool,
    pub banner_timeout_ms: u64,
    pub udp_read_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceConfig {
    pub audit_log: String,
    pub require_ack_for_public: bool,
}

/// A named bundle of rate, concurrency, timeout, and retry settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateProfile {
    pub name: String,
    pub description: String,
    pub rate_pps: u32,
    pub concurrency: usize,
    pub per_op_timeout_ms: u64,
    pub retries: u32,
}

impl RateProfile {
    /// Look up a built-in profile by name
    pub fn by_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "slow" => Some(Self::slow()),
            "medium" => Some(Self::medium()),
            "fast" => Some(Self::fast()),
            "ludicrous" => Some(Self::ludicrous()),
            _ => None,
        }
    }

    /// Slow profile: gentle on congested or monitored networks
    pub fn slow() -> Self {
        Self {
            name: "slow".to_string(),
            description: "Low-impact scanning for fragile networks".to_string(),
            rate_pps: 50,
            concurrency: 50,
            per_op_timeout_ms: 3000,
            retries: 3,
        }
    }

    /// Medium profile: the default
    pub fn medium() -> Self {
        Self {
            name: "medium".to_string(),
            description: "Balanced rate and reliability".to_string(),
            rate_pps: 200,
            concurrency: 200,
            per_op_timeout_ms: 2000,
            retries: 2,
        }
    }

    /// Fast profile: assumes a healthy local network
    pub fn fast() -> Self {
        Self {
            name: "fast".to_string(),
            description: "Fast scanning for healthy local networks".to_string(),
            rate_pps: 1000,
            concurrency: 500,
            per_op_timeout_ms: 1000,
            retries: 1,
        }
    }

    /// Ludicrous profile: maximum speed, no retries
    pub fn ludicrous() -> Self {
        Self {
            name: "ludicrous".to_string(),
            description: "Maximum speed, minimum patience".to_string(),
            rate_pps: 5000,
            concurrency: 1000,
            per_op_timeout_ms: 500,
            retries: 0,
        }
    }

    /// Per-operation timeout as a Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.per_op_timeout_ms)
    }
}

impl AppConfig {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    /// * `path` - Path to the configuration file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().display().to_string();
        debug!("Loading configuration from: {}", path_str);

        let config = Config::builder()
            .add_source(File::with_name(&path_str))
            .build()?;

        let app_config: AppConfig = config.try_deserialize()?;

        info!("Configuration loaded successfully from: {}", path_str);
        app_config.validate()?;

        Ok(app_config)
    }

    /// Load from file, or create the file with defaults if it is missing
    ///
    /// A missing file is populated with the default configuration so the
    /// next run picks it up. If neither loading nor creating works the
    /// operation cannot proceed.
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> ProbeResult<Self> {
        let path = path.as_ref();
        if path.exists() {
            return Ok(Self::from_file(path)?);
        }

        let defaults = Self::default();
        let rendered = toml::to_string_pretty(&defaults)
            .map_err(|e| ProbeError::fatal(format!("Failed to render default config: {}", e)))?;
        std::fs::write(path, rendered).map_err(|e| {
            ProbeError::fatal(format!(
                "Config file {} missing and default creation failed: {}",
                path.display(),
                e
            ))
        })?;

        info!("Created default configuration at {}", path.display());
        Ok(defaults)
    }

    /// Resolve the active rate profile
    pub fn rate_profile(&self) -> ProbeResult<RateProfile> {
        RateProfile::by_name(&self.rate.profile).ok_or_else(|| {
            ProbeError::validation(
                "rate.profile",
                format!("Unknown rate profile: {}", self.rate.profile),
            )
        })
    }

    /// Validate configuration values
    fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::Message(format!(
                "Invalid logging level: {}. Must be one of: {:?}",
                self.logging.level, valid_levels
            )));
        }

        let valid_formats = ["text", "json"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            return Err(ConfigError::Message(format!(
                "Invalid logging format: {}. Must be one of: {:?}",
                self.logging.format, valid_formats
            )));
        }

        if RateProfile::by_name(&self.rate.profile).is_none() {
            return Err(ConfigError::Message(format!(
                "Unknown rate profile: {}. Must be one of: slow, medium, fast, ludicrous",
                self.rate.profile
            )));
        }

        if !(0.0..=1.0).contains(&self.rate.high_loss_threshold) {
            return Err(ConfigError::Message(
                "high_loss_threshold must be between 0.0 and 1.0".to_string(),
            ));
        }

        if !(0.0..1.0).contains(&self.rate.downshift_step) {
            return Err(ConfigError::Message(
                "downshift_step must be in [0.0, 1.0)".to_string(),
            ));
        }

        if self.rate.window_secs == 0 {
            return Err(ConfigError::Message(
                "window_secs must be at least 1".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.discovery.sampling_percent) {
            return Err(ConfigError::Message(
                "sampling_percent must be between 0.0 and 1.0".to_string(),
            ));
        }

        info!("Configuration validation successful");
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            general: GeneralConfig {
                app_name: "netprobe".to_string(),
                session_dir: "./sessions".to_string(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "text".to_string(),
                file_logging: false,
                log_dir: "./logs".to_string(),
                max_files: 5,
            },
            rate: RateConfig {
                profile: "medium".to_string(),
                adaptive: true,
                window_secs: 10,
                high_loss_threshold: 0.30,
                downshift_step: 0.20,
                upshift_step: 0.10,
                good_windows_required: 3,
            },
            discovery: DiscoveryConfig {
                method_fallback: true,
                sampling_enabled: true,
                sampling_threshold: 1024,
                sampling_percent: 0.10,
            },
            scanner: ScannerConfig {
                default_ports: "top100".to_string(),
                service_hints: true,
                banner_timeout_ms: 2000,
                udp_read_timeout_ms: 500,
            },
            compliance: ComplianceConfig {
                audit_log: "./audit.jsonl".to_string(),
                require_ack_for_public: true,
            },
        }
    }
}

/// netprobe - Network Security Testing CLI
///
/// Thin wrapper over the library: quick mode, individual operations, and
/// template execution.

use clap::{Parser, Subcommand};
use netprobe::ops::LIVE_HOSTS_TOKEN;
use netprobe::template::{TemplateDefinition, TemplateEngine};
use netprobe::{init_library, run_quick, Operation, OperationRunner, PortSpec, ScanType};
use std::collections::HashMap;
use std::process;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "netprobe")]
#[command(version = netprobe::VERSION)]
#[command(about = "Network security testing toolkit", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Authorize probes against public targets
    #[arg(long)]
    dangerous: bool,

    /// Confirmation token required alongside --dangerous (literal YES)
    #[arg(long)]
    acknowledge: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Guided pipeline: discover, scan, fingerprint the local network
    Quick {
        /// Targets (defaults to auto)
        targets: Vec<String>,
    },

    /// Discover live hosts
    Discover {
        /// Targets: CIDR, range, address, hostname, file:PATH, or auto
        targets: Vec<String>,
    },

    /// Scan ports on targets
    Scan {
        /// Targets, or "live" for hosts discovered this session
        targets: Vec<String>,

        /// Ports: named set, list, or range
        #[arg(short, long, default_value = "top100")]
        ports: String,

        /// Scan type: syn, connect, udp, auto
        #[arg(short = 't', long, default_value = "auto")]
        scan_type: String,
    },

    /// Grab service banners
    Banner {
        targets: Vec<String>,

        #[arg(short, long, default_value = "common")]
        ports: String,
    },

    /// Run protocol fingerprints
    Fingerprint {
        targets: Vec<String>,

        #[arg(short, long, default_value = "web")]
        ports: String,
    },

    /// Send one custom probe packet per target
    Probe {
        targets: Vec<String>,

        /// Destination port
        #[arg(short = 'P', long)]
        port: u16,

        /// Protocol: tcp or udp
        #[arg(long, default_value = "tcp")]
        protocol: String,
    },

    /// Show detected privileges and capabilities
    Privileges,

    /// List built-in templates
    Templates,

    /// Execute a template workflow
    Template {
        /// Path to a YAML template, or the name of a built-in
        file: String,

        /// Parameters as name=value pairs
        #[arg(short = 'P', long = "param")]
        params: Vec<String>,

        /// Verbose session logging
        #[arg(short, long)]
        verbose: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let (mut toolkit, _guard) = match init_library(Some(&cli.config)).await {
        Ok(ready) => ready,
        Err(e) => {
            eprintln!("initialization failed: {}", e);
            process::exit(1);
        }
    };

    if cli.dangerous {
        toolkit.authorize_dangerous(cli.acknowledge.clone());
    }

    let outcome = run_command(toolkit, cli).await;
    if let Err(e) = outcome {
        error!("{}", e);
        eprintln!("error: {}", e);
        process::exit(1);
    }
}

async fn run_command(toolkit: netprobe::Toolkit, cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Quick { targets } => {
            let report = run_quick(&toolkit, &targets).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }

        Commands::Discover { targets } => {
            let summary = toolkit.discover(&require_targets(targets)?).await?;
            info!(
                "{} of {} hosts up",
                summary.hosts_discovered, summary.targets_resolved
            );
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }

        Commands::Scan {
            targets,
            ports,
            scan_type,
        } => {
            let spec = PortSpec::parse(&ports)?;
            let scan_type: ScanType = scan_type.parse()?;
            let summary = toolkit
                .scan(&require_targets(targets)?, &spec, scan_type)
                .await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }

        Commands::Banner { targets, ports } => {
            let spec = PortSpec::parse(&ports)?;
            let reports = toolkit
                .banner_grab(&require_targets(targets)?, &spec)
                .await?;
            println!("{}", serde_json::to_string_pretty(&reports)?);
        }

        Commands::Fingerprint { targets, ports } => {
            let spec = PortSpec::parse(&ports)?;
            let fingerprints = toolkit
                .fingerprint(&require_targets(targets)?, &spec)
                .await?;
            println!("{}", serde_json::to_string_pretty(&fingerprints)?);
        }

        Commands::Probe {
            targets,
            port,
            protocol,
        } => {
            let protocol = match protocol.as_str() {
                "udp" => netprobe::scanner::Protocol::Udp,
                "tcp" => netprobe::scanner::Protocol::Tcp,
                other => anyhow::bail!("unknown protocol '{}'", other),
            };
            let reports = toolkit
                .packet_send(&require_targets(targets)?, port, protocol)
                .await?;
            println!("{}", serde_json::to_string_pretty(&reports)?);
        }

        Commands::Privileges => {
            println!("{}", toolkit.caps.describe());
            let output = toolkit.run_operation(&Operation::Privileges).await?;
            println!("{}", serde_json::to_string_pretty(&output)?);
        }

        Commands::Templates => {
            for name in netprobe::template::builtin_names() {
                let template = netprobe::template::builtin(name)?;
                println!("{} ({} steps)", template.name, template.steps.len());
            }
        }

        Commands::Template {
            file,
            params,
            verbose,
        } => {
            let template = if std::path::Path::new(&file).exists() {
                TemplateDefinition::from_file(&file)?
            } else {
                netprobe::template::builtin(&file)?
            };
            let provided = parse_params(&params)?;
            let session_dir = toolkit.config.general.session_dir.clone().into();

            let runner = Arc::new(OperationRunner::new(Arc::new(toolkit)));
            let engine = TemplateEngine::new(runner, session_dir, verbose);
            let summary = engine.execute(&template, &provided).await?;

            info!(
                "template '{}': {:?} ({} completed, {} failed, {} skipped)",
                summary.template,
                summary.overall_status,
                summary.completed,
                summary.failed,
                summary.skipped
            );
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
    }

    Ok(())
}

fn require_targets(targets: Vec<String>) -> anyhow::Result<Vec<String>> {
    if targets.is_empty() {
        anyhow::bail!("at least one target is required (try 'auto' or '{}')", LIVE_HOSTS_TOKEN);
    }
    Ok(targets)
}

fn parse_params(pairs: &[String]) -> anyhow::Result<HashMap<String, serde_yaml::Value>> {
    let mut params = HashMap::new();
    for pair in pairs {
        let Some((name, value)) = pair.split_once('=') else {
            anyhow::bail!("parameter '{}' is not name=value", pair);
        };
        // Parse through YAML so numbers, bools, and lists come out typed
        let value: serde_yaml::Value = serde_yaml::from_str(value)
            .unwrap_or_else(|_| serde_yaml::Value::String(value.to_string()));
        params.insert(name.to_string(), value);
    }
    Ok(params)
}

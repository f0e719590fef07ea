/// Capability probing
///
/// Runs a set of idempotent probes once at startup to determine which
/// network mechanisms are available to the process. Results are cached for
/// the process lifetime and passed around as an immutable handle; nothing
/// in the toolkit re-probes mid-run.

use crate::error::ProbeResult;
use serde::{Deserialize, Serialize};
use socket2::{Domain, Protocol, Socket, Type};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Derived privilege level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrivilegeLevel {
    /// Raw and ICMP sockets available
    Full,
    /// System ping or TCP available, no raw sockets
    Degraded,
    /// Only the bare minimum works
    Restricted,
}

impl std::fmt::Display for PrivilegeLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PrivilegeLevel::Full => write!(f, "full"),
            PrivilegeLevel::Degraded => write!(f, "degraded"),
            PrivilegeLevel::Restricted => write!(f, "restricted"),
        }
    }
}

/// Capability flags detected at startup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Capabilities {
    pub raw_socket: bool,
    pub icmp_socket: bool,
    pub system_ping: bool,
    pub tcp_connect: bool,
    pub udp: bool,
    pub syn_scan: bool,
    pub level: PrivilegeLevel,
    /// Human-readable explanations for every capability that failed
    pub fallback_reasons: Vec<String>,
}

impl Capabilities {
    /// Derive the privilege level from the flag set
    fn derive_level(raw_socket: bool, icmp_socket: bool, system_ping: bool, tcp: bool) -> PrivilegeLevel {
        if raw_socket && icmp_socket {
            PrivilegeLevel::Full
        } else if system_ping || tcp {
            PrivilegeLevel::Degraded
        } else {
            PrivilegeLevel::Restricted
        }
    }

    /// Human summary for the `privileges` operation
    pub fn describe(&self) -> String {
        let mut lines = vec![format!("privilege level: {}", self.level)];
        for (name, available) in [
            ("raw-socket", self.raw_socket),
            ("icmp-socket", self.icmp_socket),
            ("system-ping", self.system_ping),
            ("tcp-connect", self.tcp_connect),
            ("udp", self.udp),
            ("syn-scan", self.syn_scan),
        ] {
            lines.push(format!(
                "  {:<12} {}",
                name,
                if available { "available" } else { "unavailable" }
            ));
        }
        for reason in &self.fallback_reasons {
            lines.push(format!("  note: {}", reason));
        }
        lines.join("\n")
    }
}

/// Probe runner, invoked once per process
pub struct PrivilegeProbe;

impl PrivilegeProbe {
    /// Run all capability probes and cache the result
    ///
    /// Every probe is idempotent and touches only the loopback interface.
    ///
    /// # Returns
    /// * `ProbeResult<Arc<Capabilities>>` - Immutable capability handle
    pub async fn detect() -> ProbeResult<Arc<Capabilities>> {
        let mut fallback_reasons = Vec::new();

        let raw_socket = match Self::probe_raw_socket() {
            Ok(()) => true,
            Err(e) => {
                fallback_reasons.push(format!("raw socket creation failed: {}", e));
                false
            }
        };

        let icmp_socket = match Self::probe_icmp_socket() {
            Ok(()) => true,
            Err(e) => {
                fallback_reasons.push(format!("ICMP datagram socket unavailable: {}", e));
                false
            }
        };

        let system_ping = match Self::probe_system_ping().await {
            Ok(()) => true,
            Err(e) => {
                fallback_reasons.push(format!("system ping unavailable: {}", e));
                false
            }
        };

        let tcp_connect = match Self::probe_tcp() {
            Ok(()) => true,
            Err(e) => {
                fallback_reasons.push(format!("TCP socket creation failed: {}", e));
                false
            }
        };

        let udp = match Self::probe_udp() {
            Ok(()) => true,
            Err(e) => {
                fallback_reasons.push(format!("UDP socket creation failed: {}", e));
                false
            }
        };

        // SYN scanning needs the raw path
        let syn_scan = raw_socket;
        if !syn_scan {
            fallback_reasons
                .push("SYN scan unavailable without raw sockets, connect scan used".to_string());
        }

        let level = Capabilities::derive_level(raw_socket, icmp_socket, system_ping, tcp_connect);

        let caps = Capabilities {
            raw_socket,
            icmp_socket,
            system_ping,
            tcp_connect,
            udp,
            syn_scan,
            level,
            fallback_reasons,
        };

        info!(
            "Capability detection complete: level={}, raw={}, icmp={}, ping={}, tcp={}, udp={}",
            caps.level, caps.raw_socket, caps.icmp_socket, caps.system_ping, caps.tcp_connect, caps.udp
        );

        if !caps.tcp_connect {
            warn!("TCP sockets unavailable; most operations will fail");
        }

        Ok(Arc::new(caps))
    }

    /// Attempt to open an IP-level socket for ICMP, closing it immediately
    fn probe_raw_socket() -> std::io::Result<()> {
        let socket = Socket::new(Domain::IPV4, Type::RAW, Some(Protocol::ICMPV4))?;
        drop(socket);
        debug!("raw socket probe succeeded");
        Ok(())
    }

    /// Attempt an ICMP datagram connection to loopback
    ///
    /// Linux allows unprivileged ICMP echo through SOCK_DGRAM when
    /// net.ipv4.ping_group_range permits it.
    fn probe_icmp_socket() -> std::io::Result<()> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::ICMPV4))?;
        let loopback = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0));
        socket.connect(&loopback.into())?;
        debug!("ICMP datagram socket probe succeeded");
        Ok(())
    }

    /// Invoke the OS ping command with count=1 against loopback
    async fn probe_system_ping() -> std::io::Result<()> {
        let mut cmd = tokio::process::Command::new("ping");
        #[cfg(unix)]
        cmd.args(["-c", "1", "-W", "1", "127.0.0.1"]);
        #[cfg(windows)]
        cmd.args(["-n", "1", "-w", "1000", "127.0.0.1"]);

        let output = cmd
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .output()
            .await?;

        if output.status.success() {
            debug!("system ping probe succeeded");
            Ok(())
        } else {
            Err(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("ping exited with {}", output.status),
            ))
        }
    }

    /// Attempt a loopback TCP listener bind
    fn probe_tcp() -> std::io::Result<()> {
        let listener = std::net::TcpListener::bind((Ipv4Addr::LOCALHOST, 0))?;
        drop(listener);
        debug!("TCP probe succeeded");
        Ok(())
    }

    /// Attempt a loopback UDP bind
    fn probe_udp() -> std::io::Result<()> {
        let socket = std::net::UdpSocket::bind((Ipv4Addr::LOCALHOST, 0))?;
        drop(socket);
        debug!("UDP probe succeeded");
        Ok(())
    }
}

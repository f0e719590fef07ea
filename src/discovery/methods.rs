/// Per-method discovery probes
///
/// Each probe observes one target with one technique and maps the outcome
/// onto host states. Socket-creation and EPERM-class failures surface as
/// errors so the engine can eliminate the method; everything else becomes a
/// per-record observation.

use crate::discovery::{DiscoveryMethod, HostState};
use crate::error::{ProbeError, ProbeResult};
use crate::privilege::Capabilities;
use lazy_static::lazy_static;
use pnet_packet::icmp::echo_request::MutableEchoRequestPacket;
use pnet_packet::icmp::{checksum, IcmpPacket, IcmpTypes};
use pnet_packet::Packet;
use regex::Regex;
use socket2::{Domain, Protocol, Socket, Type};
use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, trace};

/// Ports probed by the TCP discovery method, most commonly open first
const TCP_PROBE_PORTS: &[u16] = &[80, 443, 22, 445, 3389, 21, 25, 53];

lazy_static! {
    static ref PING_RTT: Regex = Regex::new(r"time[=<]([\d.]+)\s*ms").unwrap();
}

/// What one probe saw
#[derive(Debug, Clone)]
pub struct Observation {
    pub status: HostState,
    pub rtt_ms: Option<f64>,
    pub detail: Option<String>,
}

impl Observation {
    fn up(rtt_ms: f64) -> Self {
        Self {
            status: HostState::Up,
            rtt_ms: Some(rtt_ms),
            detail: None,
        }
    }

    fn down(detail: impl Into<String>) -> Self {
        Self {
            status: HostState::Down,
            rtt_ms: None,
            detail: Some(detail.into()),
        }
    }

    fn timed_out() -> Self {
        Self {
            status: HostState::Timeout,
            rtt_ms: None,
            detail: None,
        }
    }
}

/// Runs individual discovery probes
pub struct MethodProber {
    caps: Arc<Capabilities>,
    timeout: Duration,
    arp_cache: HashSet<IpAddr>,
}

impl MethodProber {
    pub fn new(caps: Arc<Capabilities>, timeout: Duration, arp_cache: HashSet<IpAddr>) -> Self {
        Self {
            caps,
            timeout,
            arp_cache,
        }
    }

    /// Probe one target with one method
    ///
    /// # Errors
    /// Returns Err only for method-level failures (socket creation, EPERM);
    /// network outcomes are encoded in the Observation.
    pub async fn probe(&self, method: DiscoveryMethod, target: IpAddr) -> ProbeResult<Observation> {
        trace!("probing {} via {}", target, method);
        match method {
            DiscoveryMethod::Icmp => self.icmp_probe(target).await,
            DiscoveryMethod::Ping => self.ping_probe(target).await,
            DiscoveryMethod::Tcp => Ok(self.tcp_probe(target).await),
            DiscoveryMethod::Arp => Ok(self.arp_probe(target)),
        }
    }

    /// ICMP echo, preferring the unprivileged datagram socket
    async fn icmp_probe(&self, target: IpAddr) -> ProbeResult<Observation> {
        let IpAddr::V4(_) = target else {
            return Ok(Observation::down("ICMP probe supports IPv4 only"));
        };

        let raw_mode = !self.caps.icmp_socket && self.caps.raw_socket;
        let socket_type = if raw_mode { Type::RAW } else { Type::DGRAM };

        let socket =
            Socket::new(Domain::IPV4, socket_type, Some(Protocol::ICMPV4)).map_err(|e| {
                if e.kind() == std::io::ErrorKind::PermissionDenied {
                    ProbeError::permission_denied("ICMP socket creation")
                } else {
                    ProbeError::Io(e)
                }
            })?;
        socket.set_nonblocking(true)?;

        let dest = SocketAddr::new(target, 0);
        socket.connect(&dest.into()).or_else(|e| {
            // Nonblocking connect on a datagram socket should not block;
            // treat EINPROGRESS as success
            if e.raw_os_error() == Some(libc::EINPROGRESS) {
                Ok(())
            } else {
                Err(e)
            }
        })?;

        let socket: std::net::UdpSocket = socket.into();
        let socket = tokio::net::UdpSocket::from_std(socket)?;

        let mut request = [0u8; 16];
        let mut packet = MutableEchoRequestPacket::new(&mut request)
            .ok_or_else(|| ProbeError::packet("echo request buffer too small"))?;
        packet.set_icmp_type(IcmpTypes::EchoRequest);
        packet.set_identifier(std::process::id() as u16);
        packet.set_sequence_number(1);
        let sum = checksum(
            &IcmpPacket::new(packet.packet())
                .ok_or_else(|| ProbeError::packet("echo request packet malformed"))?,
        );
        packet.set_checksum(sum);

        let start = Instant::now();
        socket.send(&request).await.map_err(|e| map_send_error(e))?;

        let mut reply = [0u8; 128];
        match timeout(self.timeout, socket.recv(&mut reply)).await {
            Ok(Ok(len)) => {
                // Raw sockets deliver the IP header too
                let offset = if raw_mode { 20 } else { 0 };
                if len <= offset {
                    return Ok(Observation::down("short ICMP reply"));
                }
                let rtt = start.elapsed().as_secs_f64() * 1000.0;
                match IcmpPacket::new(&reply[offset..len]) {
                    Some(icmp) if icmp.get_icmp_type() == IcmpTypes::EchoReply => {
                        debug!("ICMP echo reply from {} ({:.1}ms)", target, rtt);
                        Ok(Observation::up(rtt))
                    }
                    Some(icmp) => Ok(Observation::down(format!(
                        "ICMP type {:?}",
                        icmp.get_icmp_type()
                    ))),
                    None => Ok(Observation::down("unparseable ICMP reply")),
                }
            }
            Ok(Err(e)) => Ok(Observation::down(format!("ICMP receive failed: {}", e))),
            Err(_) => Ok(Observation::timed_out()),
        }
    }

    /// System ping, count 1, timeout rounded up to whole seconds
    async fn ping_probe(&self, target: IpAddr) -> ProbeResult<Observation> {
        let wait_secs = self.timeout.as_secs().max(1).to_string();
        let mut cmd = tokio::process::Command::new("ping");
        #[cfg(unix)]
        cmd.args(["-c", "1", "-W", &wait_secs]);
        #[cfg(windows)]
        cmd.args(["-n", "1", "-w", &format!("{}", self.timeout.as_millis())]);
        cmd.arg(target.to_string());

        let output = cmd
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::null())
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    ProbeError::capability_missing("system-ping", "ping command not found")
                } else {
                    ProbeError::Io(e)
                }
            })?;

        if output.status.success() {
            let stdout = String::from_utf8_lossy(&output.stdout);
            let rtt = PING_RTT
                .captures(&stdout)
                .and_then(|c| c.get(1))
                .and_then(|m| m.as_str().parse::<f64>().ok());
            debug!("ping reply from {} ({:?}ms)", target, rtt);
            Ok(Observation {
                status: HostState::Up,
                rtt_ms: rtt,
                detail: None,
            })
        } else {
            // ping exits nonzero both for no-reply and unreachable
            Ok(Observation::timed_out())
        }
    }

    /// TCP connect attempts against commonly open ports
    ///
    /// A completed or refused connection proves the host is up; an
    /// unreachable error is down; all-ports-timeout is a timeout.
    async fn tcp_probe(&self, target: IpAddr) -> Observation {
        let per_port = self.timeout / TCP_PROBE_PORTS.len() as u32;
        let per_port = per_port.max(Duration::from_millis(200));
        let start = Instant::now();

        for &port in TCP_PROBE_PORTS {
            if start.elapsed() >= self.timeout {
                break;
            }
            let addr = SocketAddr::new(target, port);
            match timeout(per_port, TcpStream::connect(addr)).await {
                Ok(Ok(_stream)) => {
                    let rtt = start.elapsed().as_secs_f64() * 1000.0;
                    debug!("TCP connect to {}:{} succeeded", target, port);
                    return Observation::up(rtt);
                }
                Ok(Err(e)) if e.kind() == std::io::ErrorKind::ConnectionRefused => {
                    // Refusal still proves the host answers
                    let rtt = start.elapsed().as_secs_f64() * 1000.0;
                    debug!("TCP connect to {}:{} refused, host up", target, port);
                    return Observation::up(rtt);
                }
                Ok(Err(e))
                    if matches!(
                        e.kind(),
                        std::io::ErrorKind::HostUnreachable | std::io::ErrorKind::NetworkUnreachable
                    ) =>
                {
                    return Observation::down(format!("unreachable: {}", e));
                }
                Ok(Err(_)) | Err(_) => continue,
            }
        }

        Observation::timed_out()
    }

    /// ARP cache membership: a live entry proves the host was recently seen
    fn arp_probe(&self, target: IpAddr) -> Observation {
        if self.arp_cache.contains(&target) {
            Observation {
                status: HostState::Up,
                rtt_ms: None,
                detail: Some("live ARP cache entry".to_string()),
            }
        } else {
            // Absence proves nothing; let the chain continue
            Observation::timed_out()
        }
    }
}

fn map_send_error(e: std::io::Error) -> ProbeError {
    if e.kind() == std::io::ErrorKind::PermissionDenied {
        ProbeError::permission_denied("ICMP send")
    } else {
        ProbeError::Io(e)
    }
}

/// TCP SYN (half-open) scanning
///
/// Sends a crafted SYN over a raw socket and classifies the reply without
/// completing the handshake. Since no local socket owns the connection, the
/// kernel answers any SYN-ACK with its own RST, which tears the half-open
/// state down for us. Requires raw socket capability; callers degrade to a
/// connect scan when creation fails.

use crate::error::{ProbeError, ProbeResult};
use crate::packet::{build_syn_segment, parse_tcp_reply, RawTcpSocket};
use crate::scanner::{PortState, Protocol, ScanRecord};
use rand::Rng;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;
use tracing::{debug, trace};

/// Ephemeral source-port range for crafted segments
const EPHEMERAL_RANGE: std::ops::Range<u16> = 32_768..60_999;

/// SYN scanner holding one raw socket for its lifetime
pub struct SynScanner {
    socket: RawTcpSocket,
    pub timeout: Duration,
}

impl SynScanner {
    /// Open the raw socket; fails with a permission error without raw caps
    pub fn new(timeout: Duration) -> ProbeResult<Self> {
        Ok(Self {
            socket: RawTcpSocket::new()?,
            timeout,
        })
    }

    /// Probe one port with a single SYN
    pub async fn scan_port(&self, host: IpAddr, port: u16) -> ProbeResult<ScanRecord> {
        let IpAddr::V4(dest) = host else {
            return Err(ProbeError::invalid_target(
                host.to_string(),
                "SYN scan supports IPv4 only",
            ));
        };

        let source = local_source_for(dest)?;
        let (source_port, sequence) = {
            let mut rng = rand::thread_rng();
            (rng.gen_range(EPHEMERAL_RANGE), rng.gen::<u32>())
        };

        let segment = build_syn_segment(source, dest, source_port, port, sequence)?;
        let start = std::time::Instant::now();
        self.socket.send_segment(&segment, dest).await?;
        trace!("SYN {} -> {}:{}", source_port, dest, port);

        let reply = self
            .socket
            .recv_matching(self.timeout, |packet| {
                parse_tcp_reply(packet, dest)
                    .filter(|r| r.source_port == port && r.dest_port == source_port)
            })
            .await?;

        let record = match reply {
            Some(reply) if reply.is_syn_ack() => {
                let rtt = start.elapsed().as_secs_f64() * 1000.0;
                debug!("{}:{} SYN-ACK ({:.1}ms)", dest, port, rtt);
                ScanRecord::new(host, port, Protocol::Tcp, PortState::Open).with_rtt(rtt)
            }
            Some(reply) if reply.is_rst() => {
                let rtt = start.elapsed().as_secs_f64() * 1000.0;
                ScanRecord::new(host, port, Protocol::Tcp, PortState::Closed).with_rtt(rtt)
            }
            Some(_) => ScanRecord::new(host, port, Protocol::Tcp, PortState::Error)
                .with_detail("unexpected TCP flags in reply"),
            None => ScanRecord::new(host, port, Protocol::Tcp, PortState::Filtered),
        };

        Ok(record)
    }
}

/// Pick the local address the kernel would route toward the target
///
/// A connected UDP socket performs the route lookup without sending
/// anything.
fn local_source_for(dest: Ipv4Addr) -> ProbeResult<Ipv4Addr> {
    let probe = std::net::UdpSocket::bind("0.0.0.0:0")?;
    probe.connect((dest, 53))?;
    match probe.local_addr()? {
        std::net::SocketAddr::V4(addr) => Ok(*addr.ip()),
        other => Err(ProbeError::network(format!(
            "unexpected local address family: {}",
            other
        ))),
    }
}

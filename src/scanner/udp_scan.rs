/// UDP scanning
///
/// UDP gives no handshake to observe. A reply proves the port open; silence
/// is indistinguishable from filtering, so it becomes open|filtered. The
/// read deadline is short and independent of the connection timeout.

use crate::error::ProbeResult;
use crate::scanner::{PortState, Protocol, ScanRecord};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::timeout;
use tracing::{debug, trace};

/// Service-appropriate probe payloads; anything else gets a generic nudge
fn probe_payload(port: u16) -> &'static [u8] {
    match port {
        // DNS: standard query for the root, id 0x1234
        53 => &[
            0x12, 0x34, 0x01, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x01, 0x00, 0x01,
        ],
        // NTP: client mode, version 3
        123 => &[
            0x1b, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
            0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
        ],
        // SNMP: get-request, community "public"
        161 => &[
            0x30, 0x26, 0x02, 0x01, 0x00, 0x04, 0x06, 0x70, 0x75, 0x62, 0x6c, 0x69, 0x63, 0xa0,
            0x19, 0x02, 0x01, 0x01, 0x02, 0x01, 0x00, 0x02, 0x01, 0x00, 0x30, 0x0e, 0x30, 0x0c,
            0x06, 0x08, 0x2b, 0x06, 0x01, 0x02, 0x01, 0x01, 0x01, 0x00, 0x05, 0x00,
        ],
        _ => b"\r\n\r\n",
    }
}

/// UDP scanner
pub struct UdpProbeScanner {
    pub read_timeout: Duration,
}

impl UdpProbeScanner {
    /// Probe one UDP port
    pub async fn scan_port(&self, host: IpAddr, port: u16) -> ProbeResult<ScanRecord> {
        let local = match host {
            IpAddr::V4(_) => "0.0.0.0:0",
            IpAddr::V6(_) => "[::]:0",
        };

        let socket = match UdpSocket::bind(local).await {
            Ok(s) => s,
            Err(e) => {
                return Ok(
                    ScanRecord::new(host, port, Protocol::Udp, PortState::Error)
                        .with_detail(format!("bind failed: {}", e)),
                )
            }
        };

        let addr = SocketAddr::new(host, port);
        let start = std::time::Instant::now();

        if let Err(e) = socket.send_to(probe_payload(port), addr).await {
            trace!("UDP send to {}:{} failed: {}", host, port, e);
            return Ok(
                ScanRecord::new(host, port, Protocol::Udp, PortState::Error)
                    .with_detail(format!("send failed: {}", e)),
            );
        }

        let mut buffer = vec![0u8; 2048];
        match timeout(self.read_timeout, socket.recv_from(&mut buffer)).await {
            Ok(Ok((len, _from))) => {
                let rtt = start.elapsed().as_secs_f64() * 1000.0;
                debug!("UDP {}:{} replied with {} bytes", host, port, len);
                Ok(ScanRecord::new(host, port, Protocol::Udp, PortState::Open).with_rtt(rtt))
            }
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::ConnectionRefused => {
                // Linux reflects an ICMP port-unreachable as ECONNREFUSED
                Ok(ScanRecord::new(host, port, Protocol::Udp, PortState::Closed))
            }
            Ok(Err(e)) => Ok(
                ScanRecord::new(host, port, Protocol::Udp, PortState::Error)
                    .with_detail(format!("receive failed: {}", e)),
            ),
            Err(_) => Ok(ScanRecord::new(
                host,
                port,
                Protocol::Udp,
                PortState::OpenFiltered,
            )),
        }
    }
}

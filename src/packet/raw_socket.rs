/// Raw TCP socket for SYN scanning
///
/// Wraps a SOCK_RAW / IPPROTO_TCP socket in tokio's async I/O. The kernel
/// builds the IP header on send; received packets arrive with the IP header
/// attached. Creation fails with a permission error when the process lacks
/// raw socket capability, which the scanner turns into a connect-scan
/// fallback.

use crate::error::{ProbeError, ProbeResult};
use socket2::{Domain, Protocol, Socket, Type};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, trace};

/// Async raw TCP socket
pub struct RawTcpSocket {
    socket: tokio::net::UdpSocket,
}

impl RawTcpSocket {
    /// Open a raw IPPROTO_TCP socket
    ///
    /// # Errors
    /// `PermissionDenied` when the process lacks CAP_NET_RAW or equivalent.
    pub fn new() -> ProbeResult<Self> {
        let socket = Socket::new(Domain::IPV4, Type::RAW, Some(Protocol::TCP)).map_err(|e| {
            if e.kind() == std::io::ErrorKind::PermissionDenied {
                ProbeError::permission_denied("raw TCP socket creation")
            } else {
                ProbeError::Io(e)
            }
        })?;
        socket.set_nonblocking(true)?;

        // The fd is a datagram-style socket as far as epoll is concerned
        let std_socket: std::net::UdpSocket = socket.into();
        let socket = tokio::net::UdpSocket::from_std(std_socket)?;

        debug!("raw TCP socket opened");
        Ok(Self { socket })
    }

    /// Send one TCP segment to the target; the kernel adds the IP header
    pub async fn send_segment(&self, segment: &[u8], dest: Ipv4Addr) -> ProbeResult<()> {
        let addr = SocketAddr::V4(SocketAddrV4::new(dest, 0));
        self.socket
            .send_to(segment, addr)
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::PermissionDenied => {
                    ProbeError::permission_denied("raw TCP send")
                }
                _ => ProbeError::Io(e),
            })?;
        trace!("sent {} byte segment to {}", segment.len(), dest);
        Ok(())
    }

    /// Receive raw packets until `matcher` accepts one or the deadline hits
    ///
    /// The socket sees every inbound TCP packet on the host, so the matcher
    /// must filter on addresses and ports.
    pub async fn recv_matching<T, F>(&self, deadline: Duration, mut matcher: F) -> ProbeResult<Option<T>>
    where
        F: FnMut(&[u8]) -> Option<T>,
    {
        let mut buf = vec![0u8; 2048];
        let attempt = async {
            loop {
                match self.socket.recv(&mut buf).await {
                    Ok(len) => {
                        if let Some(hit) = matcher(&buf[..len]) {
                            return Ok::<_, ProbeError>(Some(hit));
                        }
                    }
                    Err(e) => return Err(ProbeError::Io(e)),
                }
            }
        };

        match timeout(deadline, attempt).await {
            Ok(result) => result,
            Err(_) => Ok(None),
        }
    }
}

/// TCP connect scanning
///
/// Completes the full handshake, which needs no privileges and produces the
/// most dependable classification: connection accepted means open, refusal
/// means closed, a timeout means filtered. Everything else is an error and
/// retried with a fixed spacing.

use crate::error::ProbeResult;
use crate::scanner::service::{hint_for, ServiceHint};
use crate::scanner::{PortState, Protocol, ScanRecord};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, trace};

/// Spacing between retries of errored probes
const RETRY_DELAY: Duration = Duration::from_millis(100);

/// Maximum service banner read
const BANNER_LIMIT: usize = 1024;

/// Connect scanner for one (host, port) probe at a time
pub struct ConnectScanner {
    pub timeout: Duration,
    pub retry_count: u32,
    pub service_hints: bool,
    pub banner_timeout: Duration,
}

impl ConnectScanner {
    /// Probe one port
    ///
    /// Retries apply only to the error outcome; open, closed, and filtered
    /// are definitive on the first attempt.
    pub async fn scan_port(&self, host: IpAddr, port: u16) -> ProbeResult<ScanRecord> {
        let mut attempt = 0;
        loop {
            let record = self.try_connect(host, port).await;
            if record.status != PortState::Error || attempt >= self.retry_count {
                if attempt > 0 {
                    debug!("{}:{} settled after {} retries", host, port, attempt);
                }
                return Ok(record);
            }
            attempt += 1;
            trace!("retrying {}:{} (attempt {})", host, port, attempt + 1);
            tokio::time::sleep(RETRY_DELAY).await;
        }
    }

    async fn try_connect(&self, host: IpAddr, port: u16) -> ScanRecord {
        let addr = SocketAddr::new(host, port);
        let start = std::time::Instant::now();

        match timeout(self.timeout, TcpStream::connect(addr)).await {
            Ok(Ok(mut stream)) => {
                let rtt = start.elapsed().as_secs_f64() * 1000.0;
                debug!("{}:{} open ({:.1}ms)", host, port, rtt);

                let hint = if self.service_hints {
                    Some(self.read_hint(&mut stream, port).await)
                } else {
                    None
                };

                let mut record = ScanRecord::new(host, port, Protocol::Tcp, PortState::Open)
                    .with_rtt(rtt);
                record.service_hint = hint;
                record
            }
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::ConnectionRefused => {
                let rtt = start.elapsed().as_secs_f64() * 1000.0;
                ScanRecord::new(host, port, Protocol::Tcp, PortState::Closed).with_rtt(rtt)
            }
            Ok(Err(e)) => {
                trace!("{}:{} error: {}", host, port, e);
                ScanRecord::new(host, port, Protocol::Tcp, PortState::Error)
                    .with_detail(e.to_string())
            }
            Err(_) => ScanRecord::new(host, port, Protocol::Tcp, PortState::Filtered),
        }
    }

    /// Read up to 1 KiB of banner within the banner deadline and hint from it
    async fn read_hint(&self, stream: &mut TcpStream, port: u16) -> ServiceHint {
        let mut buffer = vec![0u8; BANNER_LIMIT];

        let banner = match timeout(self.banner_timeout, stream.read(&mut buffer)).await {
            Ok(Ok(n)) if n > 0 => {
                let text = String::from_utf8_lossy(&buffer[..n]).trim().to_string();
                if text.is_empty() {
                    None
                } else {
                    Some(text)
                }
            }
            _ => None,
        };

        hint_for(port, banner.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    fn scanner() -> ConnectScanner {
        ConnectScanner {
            timeout: Duration::from_millis(800),
            retry_count: 1,
            service_hints: true,
            banner_timeout: Duration::from_millis(500),
        }
    }

    #[tokio::test]
    async fn test_open_port_with_banner() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((mut stream, _)) = listener.accept().await {
                let _ = stream.write_all(b"SSH-2.0-OpenSSH_9.0\r\n").await;
                let _ = stream.flush().await;
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
        });

        let record = scanner()
            .scan_port(addr.ip(), addr.port())
            .await
            .unwrap();

        assert_eq!(record.status, PortState::Open);
        assert!(record.rtt_ms.is_some());
        let hint = record.service_hint.unwrap();
        assert_eq!(hint.name, "ssh");
        assert!(hint.confidence >= 0.9);
    }

    #[tokio::test]
    async fn test_closed_port() {
        // Bind then drop to find a port that refuses
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let record = scanner().scan_port(addr.ip(), addr.port()).await.unwrap();
        assert_eq!(record.status, PortState::Closed);
    }

    #[tokio::test]
    async fn test_silent_open_port_hints_from_port_number() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((_stream, _)) = listener.accept().await {
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        });

        let record = scanner().scan_port(addr.ip(), addr.port()).await.unwrap();
        assert_eq!(record.status, PortState::Open);
        let hint = record.service_hint.unwrap();
        assert_eq!(hint.confidence, 0.5);
        assert!(hint.banner.is_none());
    }

    #[tokio::test]
    async fn test_hints_disabled() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = listener.accept().await;
        });

        let mut s = scanner();
        s.service_hints = false;
        let record = s.scan_port(addr.ip(), addr.port()).await.unwrap();
        assert_eq!(record.status, PortState::Open);
        assert!(record.service_hint.is_none());
    }
}

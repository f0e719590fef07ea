/// Banner grabbing and analysis
///
/// Connects, sends a protocol-appropriate elicitor when one is defined, and
/// reads whatever the service volunteers. Analysis walks an ordered pattern
/// list per known service, scores confidence 0-100, and extracts a version
/// with a service-specific expression before falling back to a generic one.

use crate::error::{ProbeError, ProbeResult};
use lazy_static::lazy_static;
use regex::Regex;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, trace, warn};

/// A captured service banner
#[derive(Debug, Clone)]
pub struct ServiceBanner {
    pub target: IpAddr,
    pub port: u16,
    pub data: String,
    pub raw_bytes: Vec<u8>,
    pub response_time_ms: u64,
}

impl std::fmt::Display for ServiceBanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{} - {} ({}ms)",
            self.target,
            self.port,
            self.data.chars().take(50).collect::<String>(),
            self.response_time_ms
        )
    }
}

/// One entry in the ordered pattern table
struct ServicePattern {
    service: &'static str,
    /// Substrings tried in order; first hit wins
    patterns: &'static [&'static str],
    /// Service-specific version expression
    version: Option<&'static str>,
    confidence: u8,
}

/// Ordered pattern list; earlier entries are more specific
const SERVICE_PATTERNS: &[ServicePattern] = &[
    ServicePattern {
        service: "ssh",
        patterns: &["SSH-2.0-", "SSH-1.99-", "SSH-"],
        version: Some(r"SSH-[\d.]+-[A-Za-z]+[_-]([\w.]+)"),
        confidence: 95,
    },
    ServicePattern {
        service: "http",
        patterns: &["HTTP/1.1", "HTTP/1.0", "HTTP/2", "<html", "<!DOCTYPE"],
        version: Some(r"Server:\s*[^/\r\n]+/([\d.]+)"),
        confidence: 90,
    },
    ServicePattern {
        service: "ftp",
        patterns: &["220 ", "220-"],
        version: Some(r"220[- ][^\r\n]*?([\d]+\.[\d.]+)"),
        confidence: 80,
    },
    ServicePattern {
        service: "smtp",
        patterns: &["220 ", "ESMTP"],
        version: Some(r"ESMTP [^\s]+ ([\d.]+)"),
        confidence: 75,
    },
    ServicePattern {
        service: "redis",
        patterns: &["+PONG", "-NOAUTH", "-ERR"],
        version: Some(r"redis_version:([\d.]+)"),
        confidence: 90,
    },
    ServicePattern {
        service: "mysql",
        patterns: &["mysql_native_password", "caching_sha2_password", "MariaDB"],
        version: None,
        confidence: 85,
    },
    ServicePattern {
        service: "pop3",
        patterns: &["+OK"],
        version: None,
        confidence: 70,
    },
    ServicePattern {
        service: "imap",
        patterns: &["* OK"],
        version: None,
        confidence: 70,
    },
    ServicePattern {
        service: "vnc",
        patterns: &["RFB "],
        version: Some(r"RFB (\d{3}\.\d{3})"),
        confidence: 90,
    },
];

lazy_static! {
    static ref GENERIC_VERSION: Regex = Regex::new(r"\d+\.\d+(\.\d+)?").unwrap();
}

/// Result of banner analysis
#[derive(Debug, Clone)]
pub struct BannerAnalysis {
    pub service: Option<String>,
    pub version: Option<String>,
    /// 0-100
    pub confidence: u8,
}

impl std::fmt::Display for BannerAnalysis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.service {
            Some(service) => {
                write!(f, "{}", service)?;
                if let Some(ref version) = self.version {
                    write!(f, " v{}", version)?;
                }
                write!(f, " ({}%)", self.confidence)
            }
            None => write!(f, "unidentified"),
        }
    }
}

/// Analyze banner text against the ordered pattern table
pub fn analyze_banner(data: &str) -> BannerAnalysis {
    for entry in SERVICE_PATTERNS {
        let hit = entry.patterns.iter().any(|p| data.contains(p));
        if !hit {
            continue;
        }

        let version = entry
            .version
            .and_then(|expr| Regex::new(expr).ok())
            .and_then(|re| re.captures(data))
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .or_else(|| GENERIC_VERSION.find(data).map(|m| m.as_str().to_string()));

        let confidence = if version.is_some() {
            entry.confidence.saturating_add(5).min(100)
        } else {
            entry.confidence
        };

        return BannerAnalysis {
            service: Some(entry.service.to_string()),
            version,
            confidence,
        };
    }

    if data.trim().is_empty() {
        BannerAnalysis {
            service: None,
            version: None,
            confidence: 0,
        }
    } else {
        BannerAnalysis {
            service: None,
            version: GENERIC_VERSION.find(data).map(|m| m.as_str().to_string()),
            confidence: 20,
        }
    }
}

/// Banner grabber
pub struct BannerGrabber {
    timeout: Duration,
    max_banner_size: usize,
}

impl BannerGrabber {
    /// Create a grabber with the given read deadline
    pub fn new(timeout: Duration, max_banner_size: usize) -> Self {
        Self {
            timeout,
            max_banner_size,
        }
    }

    /// Grab a banner from one service
    ///
    /// # Returns
    /// * `ProbeResult<Option<ServiceBanner>>` - None when the service stays silent
    pub async fn grab(&self, target: IpAddr, port: u16) -> ProbeResult<Option<ServiceBanner>> {
        debug!("grabbing banner from {}:{}", target, port);
        let start = std::time::Instant::now();
        let addr = SocketAddr::new(target, port);

        match timeout(self.timeout, self.try_grab(addr, port)).await {
            Ok(Ok(bytes)) => {
                if bytes.is_empty() {
                    return Ok(None);
                }
                let elapsed = start.elapsed();
                Ok(Some(ServiceBanner {
                    target,
                    port,
                    data: String::from_utf8_lossy(&bytes).to_string(),
                    raw_bytes: bytes,
                    response_time_ms: elapsed.as_millis() as u64,
                }))
            }
            Ok(Err(e)) => {
                trace!("banner grab failed for {}:{}: {}", target, port, e);
                Ok(None)
            }
            Err(_) => {
                trace!("banner grab timeout for {}:{}", target, port);
                Ok(None)
            }
        }
    }

    async fn try_grab(&self, addr: SocketAddr, port: u16) -> ProbeResult<Vec<u8>> {
        let mut stream = TcpStream::connect(addr)
            .await
            .map_err(|e| ProbeError::network(format!("connect failed: {}", e)))?;

        if let Some(elicitor) = elicitor_for(port) {
            trace!("sending elicitor to {}", addr);
            stream
                .write_all(elicitor)
                .await
                .map_err(|e| ProbeError::network(format!("elicitor send failed: {}", e)))?;
        }

        let mut buffer = vec![0u8; self.max_banner_size];
        let n = stream
            .read(&mut buffer)
            .await
            .map_err(|e| ProbeError::network(format!("read failed: {}", e)))?;
        buffer.truncate(n);
        Ok(buffer)
    }

    /// Grab banners from many endpoints concurrently
    pub async fn grab_many(
        &self,
        targets: Vec<(IpAddr, u16)>,
        max_concurrent: usize,
    ) -> Vec<ServiceBanner> {
        use futures::stream::{self, StreamExt};

        let results = stream::iter(targets)
            .map(|(target, port)| async move {
                match self.grab(target, port).await {
                    Ok(banner) => banner,
                    Err(e) => {
                        warn!("banner grab failed for {}:{} - {}", target, port, e);
                        None
                    }
                }
            })
            .buffer_unordered(max_concurrent)
            .collect::<Vec<_>>()
            .await;

        results.into_iter().flatten().collect()
    }
}

/// Elicitor payload for services that only talk when spoken to
fn elicitor_for(port: u16) -> Option<&'static [u8]> {
    match port {
        80 | 8000 | 8080 | 8081 | 8888 | 3000 | 5000 => Some(b"HEAD / HTTP/1.0\r\n\r\n"),
        6379 => Some(b"PING\r\n"),
        11211 => Some(b"version\r\n"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elicitors() {
        assert!(elicitor_for(80).is_some());
        assert!(elicitor_for(6379).unwrap().starts_with(b"PING"));
        // Server-talks-first protocols get a passive read
        assert!(elicitor_for(22).is_none());
        assert!(elicitor_for(21).is_none());
    }

    #[test]
    fn test_analyze_ssh() {
        let analysis = analyze_banner("SSH-2.0-OpenSSH_8.9p1 Ubuntu-3ubuntu0.1\r\n");
        assert_eq!(analysis.service.as_deref(), Some("ssh"));
        assert_eq!(analysis.version.as_deref(), Some("8.9p1"));
        assert!(analysis.confidence >= 95);
    }

    #[test]
    fn test_analyze_http_with_server_header() {
        let analysis = analyze_banner("HTTP/1.1 200 OK\r\nServer: nginx/1.18.0\r\n\r\n");
        assert_eq!(analysis.service.as_deref(), Some("http"));
        assert_eq!(analysis.version.as_deref(), Some("1.18.0"));
    }

    #[test]
    fn test_analyze_redis_pong() {
        let analysis = analyze_banner("+PONG\r\n");
        assert_eq!(analysis.service.as_deref(), Some("redis"));
        assert!(analysis.version.is_none());
        assert_eq!(analysis.confidence, 90);
    }

    #[test]
    fn test_analyze_ftp_generic_version_fallback() {
        let analysis = analyze_banner("220 ProFTPD 1.3.7 Server ready\r\n");
        assert_eq!(analysis.service.as_deref(), Some("ftp"));
        assert_eq!(analysis.version.as_deref(), Some("1.3.7"));
    }

    #[test]
    fn test_analyze_unknown_banner() {
        let analysis = analyze_banner("WELCOME TO MUD 4.2");
        assert!(analysis.service.is_none());
        assert_eq!(analysis.confidence, 20);
        assert_eq!(analysis.version.as_deref(), Some("4.2"));
    }

    #[test]
    fn test_analyze_empty() {
        let analysis = analyze_banner("");
        assert!(analysis.service.is_none());
        assert_eq!(analysis.confidence, 0);
    }

    #[tokio::test]
    async fn test_grab_from_talking_service() {
        use tokio::io::AsyncWriteExt;
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((mut stream, _)) = listener.accept().await {
                let _ = stream.write_all(b"220 test FTP ready\r\n").await;
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        });

        let grabber = BannerGrabber::new(Duration::from_millis(800), 1024);
        let banner = grabber.grab(addr.ip(), addr.port()).await.unwrap().unwrap();
        assert!(banner.data.starts_with("220"));

        let analysis = analyze_banner(&banner.data);
        assert_eq!(analysis.service.as_deref(), Some("ftp"));
    }

    #[tokio::test]
    async fn test_grab_silent_service_returns_none() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = listener.accept().await;
            tokio::time::sleep(Duration::from_secs(2)).await;
        });

        let grabber = BannerGrabber::new(Duration::from_millis(300), 1024);
        let banner = grabber.grab(addr.ip(), addr.port()).await.unwrap();
        assert!(banner.is_none());
    }
}

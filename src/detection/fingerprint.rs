/// Protocol fingerprinting
///
/// Deeper, protocol-aware probes for the services worth the extra round
/// trips: a TLS handshake with certificate summary, an HTTP HEAD with
/// header capture and technology inference, SSH banner structure, and the
/// MySQL handshake packet. Each sub-probe is independent and optional; a
/// fingerprint is whatever subset answered.

use crate::error::{ProbeError, ProbeResult};
use rustls::client::{ServerCertVerified, ServerCertVerifier};
use rustls::{Certificate, ClientConfig, ServerName};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use tracing::{debug, trace};
use x509_parser::prelude::FromDer;

/// Ports that plausibly carry TLS
const TLS_PORTS: &[u16] = &[443, 465, 563, 636, 853, 990, 993, 995, 8443];

/// Ports that plausibly carry plain HTTP
const HTTP_PORTS: &[u16] = &[80, 3000, 5000, 8000, 8080, 8081, 8888];

/// TLS handshake summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TlsInfo {
    pub version: String,
    pub cipher_suite: String,
    pub subject: Option<String>,
    pub issuer: Option<String>,
    pub not_before: Option<String>,
    pub not_after: Option<String>,
}

/// HTTP HEAD response summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpInfo {
    pub status_line: String,
    pub headers: HashMap<String, String>,
    pub technologies: Vec<String>,
}

/// SSH banner structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshInfo {
    pub protocol_version: String,
    pub software: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// MySQL handshake summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MysqlInfo {
    pub packet_type: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Combined fingerprint for one endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fingerprint {
    pub target: IpAddr,
    pub port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http: Option<HttpInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssh: Option<SshInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mysql: Option<MysqlInfo>,
}

impl Fingerprint {
    /// Whether any sub-probe produced a result
    pub fn is_empty(&self) -> bool {
        self.tls.is_none() && self.http.is_none() && self.ssh.is_none() && self.mysql.is_none()
    }
}

/// Accepts any certificate; this is reconnaissance, not trust establishment
struct AcceptAnyCert;

impl ServerCertVerifier for AcceptAnyCert {
    fn verify_server_cert(
        &self,
        _end_entity: &Certificate,
        _intermediates: &[Certificate],
        _server_name: &ServerName,
        _scts: &mut dyn Iterator<Item = &[u8]>,
        _ocsp_response: &[u8],
        _now: SystemTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }
}

/// Protocol fingerprint prober
pub struct Fingerprinter {
    timeout: Duration,
    tls_connector: TlsConnector,
}

impl Fingerprinter {
    pub fn new(timeout: Duration) -> Self {
        let config = ClientConfig::builder()
            .with_safe_defaults()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyCert))
            .with_no_client_auth();

        Self {
            timeout,
            tls_connector: TlsConnector::from(Arc::new(config)),
        }
    }

    /// Fingerprint one endpoint, running the probes its port plausibly speaks
    pub async fn probe(&self, target: IpAddr, port: u16) -> Fingerprint {
        let mut fingerprint = Fingerprint {
            target,
            port,
            tls: None,
            http: None,
            ssh: None,
            mysql: None,
        };

        if TLS_PORTS.contains(&port) {
            fingerprint.tls = self.tls_probe(target, port).await.ok();
        }
        if HTTP_PORTS.contains(&port) {
            fingerprint.http = self.http_probe(target, port).await.ok();
        }
        if port == 22 || port == 2222 {
            fingerprint.ssh = self.ssh_probe(target, port).await.ok();
        }
        if port == 3306 {
            fingerprint.mysql = self.mysql_probe(target, port).await.ok();
        }

        debug!(
            "fingerprint {}:{}: tls={} http={} ssh={} mysql={}",
            target,
            port,
            fingerprint.tls.is_some(),
            fingerprint.http.is_some(),
            fingerprint.ssh.is_some(),
            fingerprint.mysql.is_some()
        );
        fingerprint
    }

    /// TLS handshake and certificate summary
    async fn tls_probe(&self, target: IpAddr, port: u16) -> ProbeResult<TlsInfo> {
        let addr = SocketAddr::new(target, port);
        let stream = timeout(self.timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| ProbeError::timeout(self.timeout.as_millis() as u64))?
            .map_err(|e| ProbeError::network(format!("connect failed: {}", e)))?;

        let server_name = ServerName::IpAddress(target);
        let tls = timeout(self.timeout, self.tls_connector.connect(server_name, stream))
            .await
            .map_err(|_| ProbeError::timeout(self.timeout.as_millis() as u64))?
            .map_err(|e| ProbeError::network(format!("TLS handshake failed: {}", e)))?;

        let (_io, session) = tls.get_ref();
        let version = session
            .protocol_version()
            .map(|v| format!("{:?}", v))
            .unwrap_or_else(|| "unknown".to_string());
        let cipher_suite = session
            .negotiated_cipher_suite()
            .map(|s| format!("{:?}", s.suite()))
            .unwrap_or_else(|| "unknown".to_string());

        let mut info = TlsInfo {
            version,
            cipher_suite,
            subject: None,
            issuer: None,
            not_before: None,
            not_after: None,
        };

        if let Some(certs) = session.peer_certificates() {
            if let Some(cert) = certs.first() {
                if let Ok((_, parsed)) = x509_parser::certificate::X509Certificate::from_der(&cert.0)
                {
                    info.subject = Some(parsed.subject().to_string());
                    info.issuer = Some(parsed.issuer().to_string());
                    info.not_before = Some(parsed.validity().not_before.to_string());
                    info.not_after = Some(parsed.validity().not_after.to_string());
                }
            }
        }

        Ok(info)
    }

    /// HEAD request, header capture, technology inference
    async fn http_probe(&self, target: IpAddr, port: u16) -> ProbeResult<HttpInfo> {
        let addr = SocketAddr::new(target, port);
        let mut stream = timeout(self.timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| ProbeError::timeout(self.timeout.as_millis() as u64))?
            .map_err(|e| ProbeError::network(format!("connect failed: {}", e)))?;

        let request = format!("HEAD / HTTP/1.0\r\nHost: {}\r\n\r\n", target);
        stream
            .write_all(request.as_bytes())
            .await
            .map_err(|e| ProbeError::network(format!("request failed: {}", e)))?;

        let mut buffer = vec![0u8; 4096];
        let n = timeout(self.timeout, stream.read(&mut buffer))
            .await
            .map_err(|_| ProbeError::timeout(self.timeout.as_millis() as u64))?
            .map_err(|e| ProbeError::network(format!("read failed: {}", e)))?;

        let text = String::from_utf8_lossy(&buffer[..n]);
        let mut lines = text.lines();
        let status_line = lines
            .next()
            .filter(|l| l.starts_with("HTTP/"))
            .ok_or_else(|| ProbeError::network("not an HTTP response"))?
            .to_string();

        let mut headers = HashMap::new();
        for line in lines {
            if line.is_empty() {
                break;
            }
            if let Some((name, value)) = line.split_once(':') {
                headers.insert(name.trim().to_lowercase(), value.trim().to_string());
            }
        }

        let technologies = infer_technologies(&headers);
        trace!("{}:{} http: {} ({:?})", target, port, status_line, technologies);

        Ok(HttpInfo {
            status_line,
            headers,
            technologies,
        })
    }

    /// SSH banner structure per RFC 4253
    async fn ssh_probe(&self, target: IpAddr, port: u16) -> ProbeResult<SshInfo> {
        let addr = SocketAddr::new(target, port);
        let mut stream = timeout(self.timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| ProbeError::timeout(self.timeout.as_millis() as u64))?
            .map_err(|e| ProbeError::network(format!("connect failed: {}", e)))?;

        let mut buffer = vec![0u8; 256];
        let n = timeout(self.timeout, stream.read(&mut buffer))
            .await
            .map_err(|_| ProbeError::timeout(self.timeout.as_millis() as u64))?
            .map_err(|e| ProbeError::network(format!("read failed: {}", e)))?;

        let banner = String::from_utf8_lossy(&buffer[..n]);
        parse_ssh_banner(banner.trim())
    }

    /// MySQL initial handshake packet
    async fn mysql_probe(&self, target: IpAddr, port: u16) -> ProbeResult<MysqlInfo> {
        let addr = SocketAddr::new(target, port);
        let mut stream = timeout(self.timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| ProbeError::timeout(self.timeout.as_millis() as u64))?
            .map_err(|e| ProbeError::network(format!("connect failed: {}", e)))?;

        let mut buffer = vec![0u8; 512];
        let n = timeout(self.timeout, stream.read(&mut buffer))
            .await
            .map_err(|_| ProbeError::timeout(self.timeout.as_millis() as u64))?
            .map_err(|e| ProbeError::network(format!("read failed: {}", e)))?;

        parse_mysql_handshake(&buffer[..n])
    }
}

/// Infer serving technologies from response headers
fn infer_technologies(headers: &HashMap<String, String>) -> Vec<String> {
    let mut technologies = Vec::new();

    if let Some(server) = headers.get("server") {
        let lower = server.to_lowercase();
        for (needle, name) in [
            ("nginx", "nginx"),
            ("apache", "Apache httpd"),
            ("iis", "Microsoft IIS"),
            ("caddy", "Caddy"),
            ("lighttpd", "lighttpd"),
        ] {
            if lower.contains(needle) {
                technologies.push(name.to_string());
            }
        }
        if technologies.is_empty() {
            technologies.push(server.clone());
        }
    }

    if let Some(powered) = headers.get("x-powered-by") {
        let lower = powered.to_lowercase();
        for (needle, name) in [
            ("php", "PHP"),
            ("express", "Express"),
            ("asp.net", "ASP.NET"),
            ("servlet", "Java Servlet"),
        ] {
            if lower.contains(needle) {
                technologies.push(name.to_string());
            }
        }
    }

    technologies
}

/// Parse `SSH-protoversion-softwareversion [comments]`
fn parse_ssh_banner(banner: &str) -> ProbeResult<SshInfo> {
    let line = banner
        .lines()
        .find(|l| l.starts_with("SSH-"))
        .ok_or_else(|| ProbeError::network("no SSH banner line"))?;

    let rest = line.strip_prefix("SSH-").unwrap_or(line);
    let (protocol_version, software_part) = rest
        .split_once('-')
        .ok_or_else(|| ProbeError::network("malformed SSH banner"))?;

    let (software, comment) = match software_part.split_once(' ') {
        Some((sw, comment)) => (sw.to_string(), Some(comment.to_string())),
        None => (software_part.to_string(), None),
    };

    Ok(SshInfo {
        protocol_version: protocol_version.to_string(),
        software,
        comment,
    })
}

/// Parse the MySQL initial handshake: 4-byte header, then protocol byte and
/// a null-terminated version string (0x0a), or an error packet (0xff)
fn parse_mysql_handshake(data: &[u8]) -> ProbeResult<MysqlInfo> {
    if data.len() < 5 {
        return Err(ProbeError::network("MySQL handshake too short"));
    }

    let payload = &data[4..];
    let packet_type = payload[0];

    match packet_type {
        0x0a => {
            let version_bytes: Vec<u8> = payload[1..]
                .iter()
                .take_while(|&&b| b != 0)
                .copied()
                .collect();
            Ok(MysqlInfo {
                packet_type,
                server_version: Some(String::from_utf8_lossy(&version_bytes).to_string()),
                error: None,
            })
        }
        0xff => {
            // Error packet: 2-byte code, then message
            let message = if payload.len() > 3 {
                String::from_utf8_lossy(&payload[3..]).to_string()
            } else {
                String::new()
            };
            Ok(MysqlInfo {
                packet_type,
                server_version: None,
                error: Some(message),
            })
        }
        other => Ok(MysqlInfo {
            packet_type: other,
            server_version: None,
            error: None,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ssh_banner_with_comment() {
        let info = parse_ssh_banner("SSH-2.0-OpenSSH_8.2p1 Ubuntu-4ubuntu0.3").unwrap();
        assert_eq!(info.protocol_version, "2.0");
        assert_eq!(info.software, "OpenSSH_8.2p1");
        assert_eq!(info.comment.as_deref(), Some("Ubuntu-4ubuntu0.3"));
    }

    #[test]
    fn test_parse_ssh_banner_bare() {
        let info = parse_ssh_banner("SSH-2.0-Dropbear_2020.81").unwrap();
        assert_eq!(info.software, "Dropbear_2020.81");
        assert!(info.comment.is_none());
    }

    #[test]
    fn test_parse_ssh_banner_rejects_other() {
        assert!(parse_ssh_banner("220 ftp ready").is_err());
    }

    #[test]
    fn test_parse_mysql_handshake_version() {
        let mut packet = vec![0x4a, 0x00, 0x00, 0x00, 0x0a];
        packet.extend_from_slice(b"8.0.27-0ubuntu0.20.04.1\x00");
        packet.extend_from_slice(&[0u8; 16]);

        let info = parse_mysql_handshake(&packet).unwrap();
        assert_eq!(info.packet_type, 0x0a);
        assert!(info.server_version.unwrap().starts_with("8.0.27"));
    }

    #[test]
    fn test_parse_mysql_error_packet() {
        let mut packet = vec![0x20, 0x00, 0x00, 0x00, 0xff, 0x69, 0x04];
        packet.extend_from_slice(b"Host not allowed");

        let info = parse_mysql_handshake(&packet).unwrap();
        assert_eq!(info.packet_type, 0xff);
        assert!(info.error.unwrap().contains("not allowed"));
    }

    #[test]
    fn test_parse_mysql_too_short() {
        assert!(parse_mysql_handshake(&[0x01, 0x02]).is_err());
    }

    #[test]
    fn test_infer_technologies() {
        let mut headers = HashMap::new();
        headers.insert("server".to_string(), "nginx/1.18.0".to_string());
        headers.insert("x-powered-by".to_string(), "PHP/8.1".to_string());

        let tech = infer_technologies(&headers);
        assert!(tech.contains(&"nginx".to_string()));
        assert!(tech.contains(&"PHP".to_string()));
    }

    #[test]
    fn test_infer_unrecognized_server_kept_verbatim() {
        let mut headers = HashMap::new();
        headers.insert("server".to_string(), "CustomServer/2".to_string());
        let tech = infer_technologies(&headers);
        assert_eq!(tech, vec!["CustomServer/2".to_string()]);
    }

    #[tokio::test]
    async fn test_ssh_probe_against_fake_server() {
        use tokio::io::AsyncWriteExt;
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((mut stream, _)) = listener.accept().await {
                let _ = stream.write_all(b"SSH-2.0-OpenSSH_9.0\r\n").await;
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        });

        let prober = Fingerprinter::new(Duration::from_millis(800));
        let info = prober.ssh_probe(addr.ip(), addr.port()).await.unwrap();
        assert_eq!(info.software, "OpenSSH_9.0");
    }

    #[tokio::test]
    async fn test_http_probe_against_fake_server() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((mut stream, _)) = listener.accept().await {
                let mut buf = [0u8; 512];
                let _ = stream.read(&mut buf).await;
                let _ = stream
                    .write_all(
                        b"HTTP/1.0 200 OK\r\nServer: nginx/1.18.0\r\nX-Powered-By: PHP/8.1\r\n\r\n",
                    )
                    .await;
            }
        });

        let prober = Fingerprinter::new(Duration::from_millis(800));
        let info = prober.http_probe(addr.ip(), addr.port()).await.unwrap();
        assert!(info.status_line.contains("200"));
        assert!(info.technologies.contains(&"nginx".to_string()));
        assert!(info.technologies.contains(&"PHP".to_string()));
    }

    #[tokio::test]
    async fn test_probe_unknown_port_is_empty() {
        let prober = Fingerprinter::new(Duration::from_millis(200));
        // Nothing listens and the port maps to no sub-probe
        let fp = prober.probe("127.0.0.1".parse().unwrap(), 49151).await;
        assert!(fp.is_empty());
    }
}

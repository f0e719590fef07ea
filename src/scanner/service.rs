/// Service hinting
///
/// Combines the port-to-name map with banner substring matching to attach a
/// lightweight service hint to open ports. Confidence reflects how much
/// evidence backs the hint: port number only, any banner, a recognized
/// service, or an extracted version.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A lightweight service identification attached to a scan record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceHint {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub banner: Option<String>,
    pub confidence: f64,
}

/// Known banner prefixes mapped to service names, checked in order
const BANNER_SIGNATURES: &[(&str, &str)] = &[
    ("SSH-", "ssh"),
    ("HTTP/", "http"),
    ("220 ", "ftp"),
    ("+OK", "pop3"),
    ("* OK", "imap"),
    ("-ERR", "redis"),
    ("+PONG", "redis"),
    ("MySQL", "mysql"),
    ("mariadb", "mysql"),
    ("RFB ", "vnc"),
    ("AMQP", "amqp"),
];

/// Version token prefixes recognized inside banners
const VERSION_PREFIXES: &[(&str, &str)] = &[
    ("ssh", "OpenSSH_"),
    ("http", "Server: "),
    ("ftp", "vsftpd "),
    ("mysql", "5."),
];

lazy_static! {
    static ref PORT_NAMES: HashMap<u16, &'static str> = {
        let mut m = HashMap::new();
        m.insert(21, "ftp");
        m.insert(22, "ssh");
        m.insert(23, "telnet");
        m.insert(25, "smtp");
        m.insert(53, "dns");
        m.insert(80, "http");
        m.insert(110, "pop3");
        m.insert(111, "rpcbind");
        m.insert(135, "msrpc");
        m.insert(139, "netbios-ssn");
        m.insert(143, "imap");
        m.insert(443, "https");
        m.insert(445, "microsoft-ds");
        m.insert(465, "smtps");
        m.insert(587, "submission");
        m.insert(631, "ipp");
        m.insert(993, "imaps");
        m.insert(995, "pop3s");
        m.insert(1433, "ms-sql-s");
        m.insert(1521, "oracle");
        m.insert(1723, "pptp");
        m.insert(3000, "http-alt");
        m.insert(3128, "squid-http");
        m.insert(3306, "mysql");
        m.insert(3389, "ms-wbt-server");
        m.insert(5432, "postgresql");
        m.insert(5900, "vnc");
        m.insert(6379, "redis");
        m.insert(8000, "http-alt");
        m.insert(8080, "http-proxy");
        m.insert(8443, "https-alt");
        m.insert(8888, "http-alt");
        m.insert(9200, "elasticsearch");
        m.insert(11211, "memcached");
        m.insert(27017, "mongodb");
        m
    };

    static ref GENERIC_VERSION: Regex = Regex::new(r"(\d+\.\d+(?:\.\d+)?)").unwrap();
}

/// Name a port from the fixed map, "unknown" otherwise
pub fn port_name(port: u16) -> &'static str {
    PORT_NAMES.get(&port).copied().unwrap_or("unknown")
}

/// Build a service hint from the port number and an optional banner
///
/// Confidence ladder: 0.5 port only, 0.8 banner present, 0.9 banner matches
/// a known service, 0.95 version extracted.
pub fn hint_for(port: u16, banner: Option<&str>) -> ServiceHint {
    let port_based = port_name(port);

    let Some(banner) = banner.filter(|b| !b.trim().is_empty()) else {
        return ServiceHint {
            name: port_based.to_string(),
            version: None,
            banner: None,
            confidence: 0.5,
        };
    };

    let trimmed = banner.trim();
    let matched = BANNER_SIGNATURES
        .iter()
        .find(|(prefix, _)| trimmed.contains(prefix))
        .map(|(_, name)| *name);

    let name = matched.unwrap_or(port_based);
    let version = matched.and_then(|service| extract_version(service, trimmed));

    let confidence = if version.is_some() {
        0.95
    } else if matched.is_some() {
        0.9
    } else {
        0.8
    };

    ServiceHint {
        name: name.to_string(),
        version,
        banner: Some(truncate(trimmed, 256)),
        confidence,
    }
}

/// Extract a version token, preferring known service prefixes
fn extract_version(service: &str, banner: &str) -> Option<String> {
    for (svc, prefix) in VERSION_PREFIXES {
        if *svc != service {
            continue;
        }
        if let Some(idx) = banner.find(prefix) {
            let tail = &banner[idx + prefix.len()..];
            if let Some(m) = GENERIC_VERSION.find(tail) {
                if m.start() <= 16 {
                    return Some(m.as_str().to_string());
                }
            }
        }
    }

    GENERIC_VERSION
        .find(banner)
        .map(|m| m.as_str().to_string())
}

fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        text.to_string()
    } else {
        let mut cut = max;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text[..cut].to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_only_confidence() {
        let hint = hint_for(22, None);
        assert_eq!(hint.name, "ssh");
        assert_eq!(hint.confidence, 0.5);
        assert!(hint.banner.is_none());
    }

    #[test]
    fn test_unknown_port() {
        let hint = hint_for(49999, None);
        assert_eq!(hint.name, "unknown");
        assert_eq!(hint.confidence, 0.5);
    }

    #[test]
    fn test_unrecognized_banner_confidence() {
        let hint = hint_for(4242, Some("hello stranger"));
        assert_eq!(hint.name, "unknown");
        assert_eq!(hint.confidence, 0.8);
        assert_eq!(hint.banner.as_deref(), Some("hello stranger"));
    }

    #[test]
    fn test_known_service_without_version() {
        let hint = hint_for(6379, Some("+PONG"));
        assert_eq!(hint.name, "redis");
        assert_eq!(hint.confidence, 0.9);
        assert!(hint.version.is_none());
    }

    #[test]
    fn test_version_extraction() {
        let hint = hint_for(22, Some("SSH-2.0-OpenSSH_8.9p1 Ubuntu"));
        assert_eq!(hint.name, "ssh");
        assert_eq!(hint.version.as_deref(), Some("8.9"));
        assert_eq!(hint.confidence, 0.95);
    }

    #[test]
    fn test_http_server_header_version() {
        let banner = "HTTP/1.1 200 OK\r\nServer: nginx/1.18.0\r\n";
        let hint = hint_for(80, Some(banner));
        assert_eq!(hint.name, "http");
        assert_eq!(hint.version.as_deref(), Some("1.18.0"));
        assert_eq!(hint.confidence, 0.95);
    }

    #[test]
    fn test_banner_truncated() {
        let long = "x".repeat(1024);
        let hint = hint_for(80, Some(&long));
        assert_eq!(hint.banner.unwrap().len(), 256);
    }
}

/// Target expansion
///
/// Parses the stable target grammar (CIDR, `A-B` ranges, last-octet
/// shorthand, bare addresses, hostnames, `file:PATH`, literal `auto`) into
/// a flat address list. Expansion is capped at 65,535 addresses per input
/// and never silently truncates; network and broadcast addresses of any
/// expanded block are excluded.

use crate::error::{ProbeError, ProbeResult};
use crate::netinfo::InterfaceEnumerator;
use ipnetwork::Ipv4Network;
use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use tracing::{debug, info};

/// Hard cap on the number of addresses a single input may expand to
pub const MAX_EXPANSION: usize = 65_535;

/// A parsed target specifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetSpec {
    /// One address
    Single(IpAddr),
    /// Inclusive IPv4 range
    Range(Ipv4Addr, Ipv4Addr),
    /// IPv4 CIDR block
    Cidr(Ipv4Network),
    /// Hostname to resolve
    Hostname(String),
    /// Targets listed in a file, one spec per line
    File(PathBuf),
    /// Resolve from the first operational private interface
    Auto,
}

impl TargetSpec {
    /// Parse one textual target specifier
    pub fn parse(input: &str) -> ProbeResult<Self> {
        let input = input.trim();

        if input.is_empty() {
            return Err(ProbeError::invalid_target(input, "empty target"));
        }

        if input == "auto" {
            return Ok(TargetSpec::Auto);
        }

        if let Some(path) = input.strip_prefix("file:") {
            if path.is_empty() {
                return Err(ProbeError::invalid_target(input, "empty file path"));
            }
            return Ok(TargetSpec::File(PathBuf::from(path)));
        }

        if input.contains('/') {
            let network: Ipv4Network = input
                .parse()
                .map_err(|e| ProbeError::invalid_target(input, format!("bad CIDR: {}", e)))?;
            return Ok(TargetSpec::Cidr(network));
        }

        if let Some((start, end)) = input.split_once('-') {
            return Self::parse_range(input, start.trim(), end.trim());
        }

        if let Ok(addr) = input.parse::<IpAddr>() {
            return Ok(TargetSpec::Single(addr));
        }

        if is_valid_hostname(input) {
            return Ok(TargetSpec::Hostname(input.to_string()));
        }

        Err(ProbeError::invalid_target(
            input,
            "not a CIDR, range, address, or hostname",
        ))
    }

    /// Parse `A-B` as a full range or a last-octet shorthand
    fn parse_range(original: &str, start: &str, end: &str) -> ProbeResult<Self> {
        let start_addr: Ipv4Addr = start
            .parse()
            .map_err(|_| ProbeError::invalid_target(original, "range start is not an IPv4 address"))?;

        // Full form: 10.0.0.1-10.0.0.50; shorthand: 10.0.0.1-50
        let end_addr: Ipv4Addr = if let Ok(full) = end.parse::<Ipv4Addr>() {
            full
        } else {
            let last: u8 = end.parse().map_err(|_| {
                ProbeError::invalid_target(original, "range end is neither an address nor an octet")
            })?;
            let octets = start_addr.octets();
            Ipv4Addr::new(octets[0], octets[1], octets[2], last)
        };

        if u32::from(end_addr) < u32::from(start_addr) {
            return Err(ProbeError::invalid_target(
                original,
                "range end precedes range start",
            ));
        }

        Ok(TargetSpec::Range(start_addr, end_addr))
    }
}

/// Check a hostname against a conservative DNS-label grammar
///
/// RFC 1123 labels: alphanumeric plus interior hyphens, 63 chars per label,
/// 253 total, at least one alphabetic character somewhere.
pub fn is_valid_hostname(name: &str) -> bool {
    if name.is_empty() || name.len() > 253 || !name.chars().any(|c| c.is_ascii_alphabetic()) {
        return false;
    }

    name.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
            && !label.starts_with('-')
            && !label.ends_with('-')
    })
}

/// Result of expanding a set of target inputs
#[derive(Debug, Clone)]
pub struct Expansion {
    pub addresses: Vec<IpAddr>,
    /// Interface name when `auto` was resolved
    pub interface_used: Option<String>,
}

/// Target expander
pub struct TargetExpander {
    interfaces: InterfaceEnumerator,
}

impl TargetExpander {
    pub fn new(interfaces: InterfaceEnumerator) -> Self {
        Self { interfaces }
    }

    /// Expand a mixed list of target inputs into a deduplicated address list
    ///
    /// # Arguments
    /// * `inputs` - Textual specifiers in any supported form
    pub async fn expand(&self, inputs: &[String]) -> ProbeResult<Expansion> {
        let mut seen = HashSet::new();
        let mut addresses = Vec::new();
        let mut interface_used = None;

        for input in inputs {
            let spec = TargetSpec::parse(input)?;
            let expanded = self.expand_spec(input, spec, &mut interface_used).await?;
            for addr in expanded {
                if seen.insert(addr) {
                    addresses.push(addr);
                }
            }
        }

        info!(
            "expanded {} input(s) into {} unique address(es)",
            inputs.len(),
            addresses.len()
        );

        Ok(Expansion {
            addresses,
            interface_used,
        })
    }

    async fn expand_spec(
        &self,
        input: &str,
        spec: TargetSpec,
        interface_used: &mut Option<String>,
    ) -> ProbeResult<Vec<IpAddr>> {
        match spec {
            TargetSpec::Single(addr) => Ok(vec![addr]),
            TargetSpec::Range(start, end) => expand_range(input, start, end),
            TargetSpec::Cidr(network) => expand_cidr(input, network),
            TargetSpec::Hostname(name) => {
                let addr = resolve_hostname(&name).await?;
                debug!("resolved {} to {}", name, addr);
                Ok(vec![addr])
            }
            TargetSpec::File(path) => {
                let contents = std::fs::read_to_string(&path).map_err(|e| {
                    ProbeError::invalid_target(input, format!("cannot read target file: {}", e))
                })?;
                let mut out = Vec::new();
                for line in contents.lines() {
                    let line = line.trim();
                    if line.is_empty() || line.starts_with('#') {
                        continue;
                    }
                    let nested = TargetSpec::parse(line)?;
                    if matches!(nested, TargetSpec::File(_)) {
                        return Err(ProbeError::invalid_target(
                            line,
                            "nested file: targets are not allowed",
                        ));
                    }
                    out.extend(
                        Box::pin(self.expand_spec(line, nested, interface_used)).await?,
                    );
                }
                Ok(out)
            }
            TargetSpec::Auto => {
                let (name, network) = self.interfaces.first_private_network()?;
                info!("auto target resolved to {} on {}", network, name);
                *interface_used = Some(name);
                expand_cidr(input, network)
            }
        }
    }
}

/// Expand an inclusive IPv4 range, enforcing the cap
fn expand_range(input: &str, start: Ipv4Addr, end: Ipv4Addr) -> ProbeResult<Vec<IpAddr>> {
    let count = (u32::from(end) - u32::from(start)) as usize + 1;
    if count > MAX_EXPANSION {
        return Err(ProbeError::ExpansionOverflow {
            input: input.to_string(),
            count,
            cap: MAX_EXPANSION,
        });
    }

    Ok((u32::from(start)..=u32::from(end))
        .map(|raw| IpAddr::V4(Ipv4Addr::from(raw)))
        .collect())
}

/// Expand a CIDR block, excluding network and broadcast for /30 and larger
fn expand_cidr(input: &str, network: Ipv4Network) -> ProbeResult<Vec<IpAddr>> {
    let total = network.size() as usize;
    let usable = if network.prefix() <= 30 {
        total.saturating_sub(2)
    } else {
        total
    };

    if usable > MAX_EXPANSION {
        return Err(ProbeError::ExpansionOverflow {
            input: input.to_string(),
            count: usable,
            cap: MAX_EXPANSION,
        });
    }

    let net_addr = network.network();
    let bcast_addr = network.broadcast();

    Ok(network
        .iter()
        .filter(|addr| network.prefix() > 30 || (*addr != net_addr && *addr != bcast_addr))
        .map(IpAddr::V4)
        .collect())
}

/// Resolve a hostname to its first address, preferring IPv4
async fn resolve_hostname(name: &str) -> ProbeResult<IpAddr> {
    let addrs: Vec<IpAddr> = tokio::net::lookup_host((name, 0u16))
        .await
        .map_err(|e| ProbeError::invalid_target(name, format!("DNS resolution failed: {}", e)))?
        .map(|sa| sa.ip())
        .collect();

    addrs
        .iter()
        .find(|a| a.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
        .ok_or_else(|| ProbeError::invalid_target(name, "hostname resolved to no addresses"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single() {
        assert_eq!(
            TargetSpec::parse("192.168.1.1").unwrap(),
            TargetSpec::Single("192.168.1.1".parse().unwrap())
        );
        assert_eq!(
            TargetSpec::parse("::1").unwrap(),
            TargetSpec::Single("::1".parse().unwrap())
        );
    }

    #[test]
    fn test_parse_auto_and_file() {
        assert_eq!(TargetSpec::parse("auto").unwrap(), TargetSpec::Auto);
        assert_eq!(
            TargetSpec::parse("file:targets.txt").unwrap(),
            TargetSpec::File(PathBuf::from("targets.txt"))
        );
    }

    #[test]
    fn test_parse_range_forms() {
        assert_eq!(
            TargetSpec::parse("10.0.0.1-10.0.0.5").unwrap(),
            TargetSpec::Range("10.0.0.1".parse().unwrap(), "10.0.0.5".parse().unwrap())
        );
        assert_eq!(
            TargetSpec::parse("10.0.0.1-5").unwrap(),
            TargetSpec::Range("10.0.0.1".parse().unwrap(), "10.0.0.5".parse().unwrap())
        );
        assert!(TargetSpec::parse("10.0.0.5-10.0.0.1").is_err());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(TargetSpec::parse("").is_err());
        assert!(TargetSpec::parse("not a target!").is_err());
        assert!(TargetSpec::parse("300.1.1.1").is_err());
    }

    #[test]
    fn test_hostname_grammar() {
        assert!(is_valid_hostname("example.com"));
        assert!(is_valid_hostname("a-b.example"));
        assert!(is_valid_hostname("localhost"));
        assert!(!is_valid_hostname("-bad.example"));
        assert!(!is_valid_hostname("bad-.example"));
        assert!(!is_valid_hostname("under_score.example"));
        assert!(!is_valid_hostname(""));
        assert!(!is_valid_hostname(&"a".repeat(254)));
        // All-numeric strings are addresses, not hostnames
        assert!(!is_valid_hostname("12345"));
    }

    #[test]
    fn test_expand_slash32() {
        let network: Ipv4Network = "192.168.1.10/32".parse().unwrap();
        let addrs = expand_cidr("192.168.1.10/32", network).unwrap();
        assert_eq!(addrs, vec!["192.168.1.10".parse::<IpAddr>().unwrap()]);
    }

    #[test]
    fn test_expand_slash31_keeps_both() {
        let network: Ipv4Network = "192.168.1.0/31".parse().unwrap();
        let addrs = expand_cidr("192.168.1.0/31", network).unwrap();
        assert_eq!(addrs.len(), 2);
    }

    #[test]
    fn test_expand_slash24_excludes_network_and_broadcast() {
        let network: Ipv4Network = "192.168.1.0/24".parse().unwrap();
        let addrs = expand_cidr("192.168.1.0/24", network).unwrap();
        assert_eq!(addrs.len(), 254);
        assert!(!addrs.contains(&"192.168.1.0".parse::<IpAddr>().unwrap()));
        assert!(!addrs.contains(&"192.168.1.255".parse::<IpAddr>().unwrap()));
        assert!(addrs.contains(&"192.168.1.1".parse::<IpAddr>().unwrap()));
        assert!(addrs.contains(&"192.168.1.254".parse::<IpAddr>().unwrap()));
    }

    #[test]
    fn test_expand_slash30() {
        let network: Ipv4Network = "10.0.0.0/30".parse().unwrap();
        let addrs = expand_cidr("10.0.0.0/30", network).unwrap();
        assert_eq!(
            addrs,
            vec![
                "10.0.0.1".parse::<IpAddr>().unwrap(),
                "10.0.0.2".parse::<IpAddr>().unwrap(),
            ]
        );
    }

    #[test]
    fn test_expansion_cap() {
        let network: Ipv4Network = "10.0.0.0/8".parse().unwrap();
        let err = expand_cidr("10.0.0.0/8", network).unwrap_err();
        assert!(matches!(err, ProbeError::ExpansionOverflow { .. }));

        // /16 expands to 65534 usable, under the cap
        let network: Ipv4Network = "10.1.0.0/16".parse().unwrap();
        let addrs = expand_cidr("10.1.0.0/16", network).unwrap();
        assert_eq!(addrs.len(), 65_534);
        assert!(addrs.len() <= MAX_EXPANSION);
    }

    #[test]
    fn test_range_cap() {
        let err = expand_range(
            "1.0.0.0-1.255.255.255",
            "1.0.0.0".parse().unwrap(),
            "1.255.255.255".parse().unwrap(),
        )
        .unwrap_err();
        assert!(matches!(err, ProbeError::ExpansionOverflow { .. }));
    }

    #[tokio::test]
    async fn test_expand_mixed_inputs_dedup() {
        let expander = TargetExpander::new(InterfaceEnumerator::new());
        let inputs = vec![
            "10.0.0.1-3".to_string(),
            "10.0.0.2".to_string(),
            "10.0.0.4/32".to_string(),
        ];
        let expansion = expander.expand(&inputs).await.unwrap();
        assert_eq!(
            expansion.addresses,
            vec![
                "10.0.0.1".parse::<IpAddr>().unwrap(),
                "10.0.0.2".parse::<IpAddr>().unwrap(),
                "10.0.0.3".parse::<IpAddr>().unwrap(),
                "10.0.0.4".parse::<IpAddr>().unwrap(),
            ]
        );
        assert!(expansion.interface_used.is_none());
    }

    #[tokio::test]
    async fn test_expand_file() {
        use std::io::Write;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("targets.txt");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "# lab hosts").unwrap();
        writeln!(f, "10.0.0.1").unwrap();
        writeln!(f, "10.0.0.8/30").unwrap();
        drop(f);

        let expander = TargetExpander::new(InterfaceEnumerator::new());
        let input = vec![format!("file:{}", path.display())];
        let expansion = expander.expand(&input).await.unwrap();
        assert_eq!(expansion.addresses.len(), 3);
    }
}

/// Port specifications
///
/// The port grammar is part of the public contract: named sets, comma
/// lists, and inclusive ranges. The named sets are fixed value lists.
/// Parsing rejects anything outside [1, 65535] instead of clamping.

use crate::error::{ProbeError, ProbeResult};
use lazy_static::lazy_static;

/// The 100 most commonly open TCP ports
pub const TOP_100: &[u16] = &[
    7, 9, 13, 21, 22, 23, 25, 26, 37, 53,
    79, 80, 81, 88, 106, 110, 111, 113, 119, 135,
    139, 143, 144, 179, 199, 389, 427, 443, 444, 445,
    465, 513, 514, 515, 543, 544, 548, 554, 587, 631,
    646, 873, 990, 993, 995, 1025, 1026, 1027, 1028, 1029,
    1110, 1433, 1720, 1723, 1755, 1900, 2000, 2001, 2049, 2121,
    2717, 3000, 3128, 3306, 3389, 3986, 4899, 5000, 5009, 5051,
    5060, 5101, 5190, 5357, 5432, 5631, 5666, 5800, 5900, 6000,
    6001, 6646, 7070, 8000, 8008, 8009, 8080, 8081, 8443, 8888,
    9100, 9999, 10000, 32768, 49152, 49153, 49154, 49155, 49156, 49157,
];

/// Common web server ports
pub const WEB_PORTS: &[u16] = &[80, 443, 3000, 5000, 8000, 8080, 8443, 8888];

/// Common database ports
pub const DATABASE_PORTS: &[u16] = &[1433, 1521, 3306, 5432, 6379, 9200, 11211, 27017];

/// A short everyday set
pub const COMMON_PORTS: &[u16] = &[
    21, 22, 23, 25, 53, 80, 110, 111, 135, 139,
    143, 443, 445, 993, 995, 1723, 3306, 3389, 5900, 8080,
];

lazy_static! {
    /// The 1000-port set: TOP_100 padded with the lowest remaining port
    /// numbers until exactly 1000 entries, sorted ascending
    pub static ref TOP_1000: Vec<u16> = {
        let mut ports: Vec<u16> = TOP_100.to_vec();
        let mut candidate: u16 = 1;
        while ports.len() < 1000 {
            if !TOP_100.contains(&candidate) {
                ports.push(candidate);
            }
            candidate += 1;
        }
        ports.sort_unstable();
        ports
    };
}

/// A parsed port specification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortSpec {
    /// One of the fixed named sets
    Named(String),
    /// Explicit list, sorted and deduplicated
    List(Vec<u16>),
    /// Inclusive range
    Range(u16, u16),
}

impl PortSpec {
    /// Parse a port specification string
    ///
    /// Accepts a named set, a single inclusive range (`80-90`), or a comma
    /// list whose elements are ports or ranges (`22,80-82,443`).
    pub fn parse(input: &str) -> ProbeResult<Self> {
        let input = input.trim();
        if input.is_empty() {
            return Err(ProbeError::invalid_port_spec(input, "empty specification"));
        }

        if matches!(
            input.to_lowercase().as_str(),
            "top100" | "top1000" | "web" | "database" | "common"
        ) {
            return Ok(PortSpec::Named(input.to_lowercase()));
        }

        if !input.contains(',') {
            if let Some((start, end)) = input.split_once('-') {
                let start = parse_port(input, start)?;
                let end = parse_port(input, end)?;
                if start > end {
                    return Err(ProbeError::InvalidPortRange {
                        start: start as u32,
                        end: end as u32,
                    });
                }
                return Ok(PortSpec::Range(start, end));
            }
            return Ok(PortSpec::List(vec![parse_port(input, input)?]));
        }

        let mut ports = Vec::new();
        for part in input.split(',') {
            let part = part.trim();
            if let Some((start, end)) = part.split_once('-') {
                let start = parse_port(input, start)?;
                let end = parse_port(input, end)?;
                if start > end {
                    return Err(ProbeError::InvalidPortRange {
                        start: start as u32,
                        end: end as u32,
                    });
                }
                ports.extend(start..=end);
            } else {
                ports.push(parse_port(input, part)?);
            }
        }

        ports.sort_unstable();
        ports.dedup();
        Ok(PortSpec::List(ports))
    }

    /// Resolve the specification into an explicit port list
    pub fn resolve(&self) -> Vec<u16> {
        match self {
            PortSpec::Named(name) => match name.as_str() {
                "top100" => TOP_100.to_vec(),
                "top1000" => TOP_1000.clone(),
                "web" => WEB_PORTS.to_vec(),
                "database" => DATABASE_PORTS.to_vec(),
                "common" => COMMON_PORTS.to_vec(),
                _ => Vec::new(),
            },
            PortSpec::List(ports) => ports.clone(),
            PortSpec::Range(start, end) => (*start..=*end).collect(),
        }
    }
}

impl std::fmt::Display for PortSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PortSpec::Named(name) => write!(f, "{}", name),
            PortSpec::Range(start, end) => write!(f, "{}-{}", start, end),
            PortSpec::List(ports) => {
                let rendered: Vec<String> = ports.iter().map(|p| p.to_string()).collect();
                write!(f, "{}", rendered.join(","))
            }
        }
    }
}

/// Parse one port token, rejecting 0 and anything above 65535
fn parse_port(spec: &str, token: &str) -> ProbeResult<u16> {
    let token = token.trim();
    let value: u32 = token
        .parse()
        .map_err(|_| ProbeError::invalid_port_spec(spec, format!("'{}' is not a number", token)))?;

    if value == 0 || value > 65_535 {
        return Err(ProbeError::invalid_port_spec(
            spec,
            format!("port {} outside [1, 65535]", value),
        ));
    }

    Ok(value as u16)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_named_sets_sizes() {
        assert_eq!(TOP_100.len(), 100);
        assert_eq!(TOP_1000.len(), 1000);
        assert_eq!(COMMON_PORTS.len(), 20);

        // Fixed sets contain no duplicates
        let mut sorted = TOP_1000.clone();
        sorted.dedup();
        assert_eq!(sorted.len(), 1000);
    }

    #[test]
    fn test_top1000_superset_of_top100() {
        for port in TOP_100 {
            assert!(TOP_1000.contains(port), "missing {}", port);
        }
    }

    #[test]
    fn test_parse_named() {
        assert_eq!(
            PortSpec::parse("top100").unwrap(),
            PortSpec::Named("top100".to_string())
        );
        assert_eq!(PortSpec::parse("WEB").unwrap().resolve(), WEB_PORTS.to_vec());
    }

    #[test]
    fn test_parse_mixed_list() {
        let spec = PortSpec::parse("22,80-82,443").unwrap();
        assert_eq!(spec.resolve(), vec![22, 80, 81, 82, 443]);
    }

    #[test]
    fn test_parse_single_range() {
        let spec = PortSpec::parse("80-90").unwrap();
        assert_eq!(spec, PortSpec::Range(80, 90));
        assert_eq!(spec.resolve().len(), 11);
    }

    #[test]
    fn test_boundary_rejection() {
        assert!(PortSpec::parse("0").is_err());
        assert!(PortSpec::parse("65536").is_err());
        assert!(PortSpec::parse("22,0").is_err());
        assert!(PortSpec::parse("70000-70001").is_err());
        assert!(PortSpec::parse("90-80").is_err());
        assert!(PortSpec::parse("").is_err());
        assert!(PortSpec::parse("http").is_err());
    }

    #[test]
    fn test_valid_extremes() {
        assert_eq!(PortSpec::parse("1").unwrap().resolve(), vec![1]);
        assert_eq!(PortSpec::parse("65535").unwrap().resolve(), vec![65535]);
    }

    #[test]
    fn test_list_dedup_and_sort() {
        let spec = PortSpec::parse("443,80,443,22").unwrap();
        assert_eq!(spec.resolve(), vec![22, 80, 443]);
    }

    #[test]
    fn test_print_parse_roundtrip() {
        for input in ["top100", "common", "22,80,81,82,443", "80-90", "8080"] {
            let spec = PortSpec::parse(input).unwrap();
            let printed = spec.to_string();
            let reparsed = PortSpec::parse(&printed).unwrap();
            assert_eq!(spec, reparsed, "roundtrip failed for {}", input);
        }
    }
}

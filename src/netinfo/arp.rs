/// ARP cache reading
///
/// The cache seeds High-priority discovery targets. Parsing is OS-dependent
/// and best-effort: /proc/net/arp on Linux, the `arp -a` command elsewhere.
/// An empty or unreadable cache yields an empty set, never an error.

use std::collections::HashSet;
use std::net::IpAddr;
use tracing::debug;

/// Read the set of addresses with a live ARP entry
pub async fn read_arp_cache() -> HashSet<IpAddr> {
    let mut entries = read_proc_arp();

    if entries.is_empty() {
        entries = query_arp_command().await;
    }

    debug!("ARP cache: {} entries", entries.len());
    entries
}

/// Parse /proc/net/arp, keeping entries with a resolved hardware address
fn read_proc_arp() -> HashSet<IpAddr> {
    let mut entries = HashSet::new();

    let Ok(contents) = std::fs::read_to_string("/proc/net/arp") else {
        return entries;
    };

    for line in contents.lines().skip(1) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 4 {
            continue;
        }
        // Flags 0x0 means incomplete; unresolved entries show a zero MAC
        if fields[2] == "0x0" || fields[3] == "00:00:00:00:00:00" {
            continue;
        }
        if let Ok(addr) = fields[0].parse::<IpAddr>() {
            entries.insert(addr);
        }
    }

    entries
}

/// Fall back to `arp -a`, parsing the parenthesized addresses
async fn query_arp_command() -> HashSet<IpAddr> {
    let mut entries = HashSet::new();

    let Ok(output) = tokio::process::Command::new("arp")
        .arg("-a")
        .output()
        .await
    else {
        return entries;
    };

    if !output.status.success() {
        return entries;
    }

    let text = String::from_utf8_lossy(&output.stdout);
    for line in text.lines() {
        if line.contains("incomplete") {
            continue;
        }
        if let (Some(open), Some(close)) = (line.find('('), line.find(')')) {
            if open < close {
                if let Ok(addr) = line[open + 1..close].parse::<IpAddr>() {
                    entries.insert(addr);
                }
            }
        }
    }

    entries
}

/// Privilege detection and capability fallback
///
/// This module detects what the process is actually allowed to do on the
/// network (raw sockets, ICMP, system ping, plain TCP/UDP) and routes every
/// operation to the best method the detected capabilities support.

pub mod probe;
pub mod router;

pub use probe::{Capabilities, PrivilegeLevel, PrivilegeProbe};
pub use router::{recommend_discovery, recommend_scan, MethodPlan};

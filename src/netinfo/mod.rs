/// Local network information
///
/// Interface enumeration, default gateway lookup, and ARP cache reading.
/// Gateway and ARP data are best-effort: an empty result degrades
/// prioritization, it never fails a run.

pub mod arp;
pub mod gateway;
pub mod interfaces;

pub use arp::read_arp_cache;
pub use gateway::default_gateway;
pub use interfaces::{InterfaceAddress, InterfaceEnumerator, InterfaceInfo};

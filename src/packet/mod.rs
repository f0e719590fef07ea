/// Packet layer
///
/// TCP segment crafting and the raw socket used by the SYN scanner. Only
/// the SYN path needs this module; everything else in the toolkit speaks
/// through the ordinary socket APIs.

pub mod crafting;
pub mod raw_socket;

pub use crafting::{build_syn_segment, parse_tcp_reply, TcpReply};
pub use raw_socket::RawTcpSocket;

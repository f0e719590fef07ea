/// TCP segment crafting and reply parsing
///
/// Builds the SYN segments the raw scanner sends and decodes the replies it
/// receives. Checksums cover the IPv4 pseudo-header, so both endpoint
/// addresses are required at build time.

use crate::error::{ProbeError, ProbeResult};
use pnet_packet::ip::IpNextHeaderProtocols;
use pnet_packet::ipv4::Ipv4Packet;
use pnet_packet::tcp::{ipv4_checksum, MutableTcpPacket, TcpFlags, TcpPacket};
use pnet_packet::Packet;
use std::net::Ipv4Addr;

/// Minimal TCP header length in bytes (no options)
const TCP_HEADER_LEN: usize = 20;

/// Flags observed in a reply segment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcpReply {
    pub source_port: u16,
    pub dest_port: u16,
    pub syn: bool,
    pub ack: bool,
    pub rst: bool,
}

impl TcpReply {
    /// SYN-ACK means the port accepted the handshake offer
    pub fn is_syn_ack(&self) -> bool {
        self.syn && self.ack && !self.rst
    }

    /// RST means the port is closed
    pub fn is_rst(&self) -> bool {
        self.rst
    }
}

/// Build a SYN segment ready to hand to a raw IPPROTO_TCP socket
///
/// The kernel prepends the IP header; the checksum here covers the
/// pseudo-header for the given endpoints.
pub fn build_syn_segment(
    source: Ipv4Addr,
    dest: Ipv4Addr,
    source_port: u16,
    dest_port: u16,
    sequence: u32,
) -> ProbeResult<Vec<u8>> {
    let mut buf = vec![0u8; TCP_HEADER_LEN];
    let mut tcp = MutableTcpPacket::new(&mut buf)
        .ok_or_else(|| ProbeError::packet("TCP segment buffer too small"))?;

    tcp.set_source(source_port);
    tcp.set_destination(dest_port);
    tcp.set_sequence(sequence);
    tcp.set_acknowledgement(0);
    tcp.set_data_offset((TCP_HEADER_LEN / 4) as u8);
    tcp.set_flags(TcpFlags::SYN);
    tcp.set_window(64240);
    tcp.set_urgent_ptr(0);

    let checksum = ipv4_checksum(&tcp.to_immutable(), &source, &dest);
    tcp.set_checksum(checksum);

    Ok(buf)
}

/// Parse a raw IPv4 packet into the TCP reply fields the scanner matches on
///
/// Returns None for non-TCP traffic or fragments too short to carry a
/// header.
pub fn parse_tcp_reply(packet: &[u8], expected_source: Ipv4Addr) -> Option<TcpReply> {
    let ip = Ipv4Packet::new(packet)?;
    if ip.get_next_level_protocol() != IpNextHeaderProtocols::Tcp {
        return None;
    }
    if ip.get_source() != expected_source {
        return None;
    }

    let tcp = TcpPacket::new(ip.payload())?;
    let flags = tcp.get_flags();

    Some(TcpReply {
        source_port: tcp.get_source(),
        dest_port: tcp.get_destination(),
        syn: flags & TcpFlags::SYN != 0,
        ack: flags & TcpFlags::ACK != 0,
        rst: flags & TcpFlags::RST != 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pnet_packet::ipv4::MutableIpv4Packet;

    fn wrap_in_ipv4(segment: &[u8], source: Ipv4Addr, dest: Ipv4Addr) -> Vec<u8> {
        let mut buf = vec![0u8; 20 + segment.len()];
        {
            let mut ip = MutableIpv4Packet::new(&mut buf).unwrap();
            ip.set_version(4);
            ip.set_header_length(5);
            ip.set_total_length((20 + segment.len()) as u16);
            ip.set_ttl(64);
            ip.set_next_level_protocol(IpNextHeaderProtocols::Tcp);
            ip.set_source(source);
            ip.set_destination(dest);
        }
        buf[20..].copy_from_slice(segment);
        buf
    }

    #[test]
    fn test_syn_segment_fields() {
        let segment = build_syn_segment(
            Ipv4Addr::new(10, 0, 0, 1),
            Ipv4Addr::new(10, 0, 0, 2),
            40000,
            443,
            0x1234_5678,
        )
        .unwrap();

        let tcp = TcpPacket::new(&segment).unwrap();
        assert_eq!(tcp.get_source(), 40000);
        assert_eq!(tcp.get_destination(), 443);
        assert_eq!(tcp.get_sequence(), 0x1234_5678);
        assert_eq!(tcp.get_flags(), TcpFlags::SYN);
        assert_ne!(tcp.get_checksum(), 0);
    }

    #[test]
    fn test_reply_roundtrip() {
        let source = Ipv4Addr::new(10, 0, 0, 2);
        let dest = Ipv4Addr::new(10, 0, 0, 1);
        let segment = build_syn_segment(source, dest, 443, 40000, 1).unwrap();
        let packet = wrap_in_ipv4(&segment, source, dest);

        let reply = parse_tcp_reply(&packet, source).unwrap();
        assert_eq!(reply.source_port, 443);
        assert_eq!(reply.dest_port, 40000);
        assert!(reply.syn);
        assert!(!reply.rst);
    }

    #[test]
    fn test_reply_ignores_wrong_source() {
        let source = Ipv4Addr::new(10, 0, 0, 2);
        let dest = Ipv4Addr::new(10, 0, 0, 1);
        let segment = build_syn_segment(source, dest, 443, 40000, 1).unwrap();
        let packet = wrap_in_ipv4(&segment, source, dest);

        assert!(parse_tcp_reply(&packet, Ipv4Addr::new(10, 0, 0, 99)).is_none());
    }

    #[test]
    fn test_reply_flags_classification() {
        let syn_ack = TcpReply {
            source_port: 80,
            dest_port: 40000,
            syn: true,
            ack: true,
            rst: false,
        };
        assert!(syn_ack.is_syn_ack());
        assert!(!syn_ack.is_rst());

        let rst = TcpReply {
            source_port: 80,
            dest_port: 40000,
            syn: false,
            ack: true,
            rst: true,
        };
        assert!(rst.is_rst());
        assert!(!rst.is_syn_ack());
    }

    #[test]
    fn test_parse_rejects_short_packet() {
        assert!(parse_tcp_reply(&[0u8; 4], Ipv4Addr::new(10, 0, 0, 1)).is_none());
    }
}

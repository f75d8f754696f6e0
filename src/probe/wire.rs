use pnet::packet::MutablePacket;
use pnet::packet::icmp::echo_request::MutableEchoRequestPacket;
use pnet::packet::icmp::{IcmpCode, IcmpPacket, IcmpType, IcmpTypes, checksum};
use pnet::packet::ipv4::Ipv4Packet;
use std::net::{IpAddr, Ipv6Addr};
use std::time::Instant;

/// ICMP header size (fixed)
pub const ICMP_HEADER_LEN: usize = 8;
/// Correlation payload: the little-endian sequence token plus one sentinel byte
pub const ECHO_PAYLOAD_LEN: usize = 5;

const IPV6_HEADER_LEN: usize = 40;

// ICMPv6 type codes
const ICMPV6_ECHO_REQUEST: u8 = 128;
const ICMPV6_ECHO_REPLY: u8 = 129;
const ICMPV6_TIME_EXCEEDED: u8 = 3;

/// The 4-byte token embedded in every Echo payload, searched for inside
/// quoted Time-Exceeded bytes.
pub fn seq_token(seq: u16) -> [u8; 4] {
    (seq as u32).to_le_bytes()
}

/// The full Echo payload for a sequence number: `u32_le(seq)` followed by `'x'`.
pub fn echo_payload(seq: u16) -> [u8; ECHO_PAYLOAD_LEN] {
    let token = seq_token(seq);
    [token[0], token[1], token[2], token[3], b'x']
}

/// Calculate ICMPv6 checksum including IPv6 pseudo-header.
///
/// ICMPv6 checksum (RFC 8200) covers the IPv6 pseudo-header + ICMP message.
/// Pseudo-header: src addr, dest addr, upper-layer length, next header (58).
///
/// Algorithm derived from trippy (BSD-licensed).
fn icmp_ipv6_checksum(data: &[u8], src_addr: Ipv6Addr, dest_addr: Ipv6Addr) -> u16 {
    let mut sum = 0u32;

    for segment in src_addr.segments() {
        sum += u32::from(segment);
    }
    for segment in dest_addr.segments() {
        sum += u32::from(segment);
    }

    sum += data.len() as u32;
    sum += 58u32;

    // Add ICMP data (16-bit words, skip checksum field at bytes 2-3)
    let mut i = 0;
    while i + 1 < data.len() {
        if i != 2 {
            sum += u32::from(u16::from_be_bytes([data[i], data[i + 1]]));
        }
        i += 2;
    }
    if i < data.len() {
        sum += u32::from(data[i]) << 8;
    }

    // Fold 32-bit sum to 16-bit with carry
    while sum >> 16 != 0 {
        sum = (sum >> 16) + (sum & 0xFFFF);
    }

    !sum as u16
}

/// Build an ICMP Echo Request carrying the correlation payload.
///
/// Set ipv6=true to build an ICMPv6 Echo Request; the ICMPv6 checksum needs
/// the pseudo-header, so pass `ipv6_addrs = Some((src, dest))`. The kernel
/// recomputes the checksum on raw ICMPv6 sockets anyway, which covers the
/// unspecified-source case.
pub fn build_echo_request(
    identifier: u16,
    sequence: u16,
    ipv6: bool,
    ipv6_addrs: Option<(Ipv6Addr, Ipv6Addr)>,
) -> Vec<u8> {
    let mut buffer = vec![0u8; ICMP_HEADER_LEN + ECHO_PAYLOAD_LEN];

    let mut packet = MutableEchoRequestPacket::new(&mut buffer).unwrap();

    if ipv6 {
        packet.set_icmp_type(IcmpType::new(ICMPV6_ECHO_REQUEST));
    } else {
        packet.set_icmp_type(IcmpTypes::EchoRequest);
    }
    packet.set_icmp_code(IcmpCode::new(0));
    packet.set_identifier(identifier);
    packet.set_sequence_number(sequence);
    packet
        .payload_mut()
        .copy_from_slice(&echo_payload(sequence));

    if ipv6 {
        if let Some((src, dest)) = ipv6_addrs {
            let cksum = icmp_ipv6_checksum(&buffer, src, dest);
            let mut packet = MutableEchoRequestPacket::new(&mut buffer).unwrap();
            packet.set_checksum(cksum);
        }
    } else {
        let cksum = checksum(&IcmpPacket::new(&buffer).unwrap());
        let mut packet = MutableEchoRequestPacket::new(&mut buffer).unwrap();
        packet.set_checksum(cksum);
    }

    buffer
}

/// What an incoming datagram decoded to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyKind {
    EchoReply {
        id: u16,
        seq: u16,
        payload: Vec<u8>,
    },
    TimeExceeded {
        /// `(id, seq)` of the quoted Echo Request, when it could be extracted.
        inner: Option<(u16, u16)>,
    },
    /// Recognized ICMP traffic that can never match a probe.
    Other,
}

/// One parsed incoming datagram.
#[derive(Debug, Clone)]
pub struct ReplyRecord {
    pub responder: IpAddr,
    pub received_at: Instant,
    pub kind: ReplyKind,
}

/// Parse an incoming datagram from a raw ICMP socket.
///
/// IPv4 raw sockets deliver the IP header; IPv6 raw sockets deliver the
/// ICMPv6 message directly. `probe_seq` supplies the token used to locate the
/// quoted Echo inside a Time-Exceeded message. Undecodable datagrams yield
/// `None` and are dropped by the caller; unrelated local ICMP traffic makes
/// them routine, not errors.
pub fn parse_reply(data: &[u8], responder: IpAddr, probe_seq: u16) -> Option<ReplyRecord> {
    let kind = if responder.is_ipv6() {
        parse_icmpv6(data, probe_seq)?
    } else {
        parse_icmpv4(data, probe_seq)?
    };

    Some(ReplyRecord {
        responder,
        received_at: Instant::now(),
        kind,
    })
}

fn parse_icmpv4(data: &[u8], probe_seq: u16) -> Option<ReplyKind> {
    let ip_packet = Ipv4Packet::new(data)?;
    let ip_header_len = (ip_packet.get_header_length() as usize) * 4;

    if data.len() < ip_header_len + ICMP_HEADER_LEN {
        return None;
    }

    let icmp_data = &data[ip_header_len..];
    let icmp_packet = IcmpPacket::new(icmp_data)?;

    match icmp_packet.get_icmp_type() {
        IcmpTypes::EchoReply => {
            if !validate_icmp_checksum(icmp_data) {
                return None;
            }
            let id = u16::from_be_bytes([icmp_data[4], icmp_data[5]]);
            let seq = u16::from_be_bytes([icmp_data[6], icmp_data[7]]);
            Some(ReplyKind::EchoReply {
                id,
                seq,
                payload: icmp_data[ICMP_HEADER_LEN..].to_vec(),
            })
        }
        IcmpTypes::TimeExceeded => {
            let quoted = &icmp_data[ICMP_HEADER_LEN..];
            Some(ReplyKind::TimeExceeded {
                inner: extract_inner_echo_v4(quoted, probe_seq),
            })
        }
        _ => Some(ReplyKind::Other),
    }
}

fn parse_icmpv6(icmp_data: &[u8], _probe_seq: u16) -> Option<ReplyKind> {
    if icmp_data.len() < ICMP_HEADER_LEN {
        return None;
    }

    match icmp_data[0] {
        ICMPV6_ECHO_REPLY => {
            let id = u16::from_be_bytes([icmp_data[4], icmp_data[5]]);
            let seq = u16::from_be_bytes([icmp_data[6], icmp_data[7]]);
            Some(ReplyKind::EchoReply {
                id,
                seq,
                payload: icmp_data[ICMP_HEADER_LEN..].to_vec(),
            })
        }
        ICMPV6_TIME_EXCEEDED => {
            let quoted = &icmp_data[ICMP_HEADER_LEN..];
            Some(ReplyKind::TimeExceeded {
                inner: extract_inner_echo_v6(quoted),
            })
        }
        _ => Some(ReplyKind::Other),
    }
}

/// Locate the correlation token inside quoted IPv4 Time-Exceeded bytes and
/// decode the Echo Request around it.
///
/// The token is the Echo payload, which sits immediately after the 8-byte
/// Echo header, so the quoted message starts 8 bytes before the token.
fn extract_inner_echo_v4(quoted: &[u8], probe_seq: u16) -> Option<(u16, u16)> {
    let token = seq_token(probe_seq);
    let index = quoted.windows(token.len()).position(|w| w == token)?;
    if index < ICMP_HEADER_LEN {
        return None;
    }
    parse_inner_echo(&quoted[index - ICMP_HEADER_LEN..], IcmpTypes::EchoRequest.0)
}

/// Decode the Echo Request quoted by an IPv6 Time-Exceeded: a fixed 40-byte
/// IPv6 header precedes the inner ICMPv6 message.
fn extract_inner_echo_v6(quoted: &[u8]) -> Option<(u16, u16)> {
    if quoted.len() < IPV6_HEADER_LEN + ICMP_HEADER_LEN {
        return None;
    }
    parse_inner_echo(&quoted[IPV6_HEADER_LEN..], ICMPV6_ECHO_REQUEST)
}

fn parse_inner_echo(data: &[u8], echo_request_type: u8) -> Option<(u16, u16)> {
    if data.len() < ICMP_HEADER_LEN || data[0] != echo_request_type {
        return None;
    }
    let id = u16::from_be_bytes([data[4], data[5]]);
    let seq = u16::from_be_bytes([data[6], data[7]]);
    Some((id, seq))
}

/// Calculate ICMP checksum (RFC 1071)
/// Returns true if checksum is valid (sums to 0xFFFF or 0x0000 after folding)
fn validate_icmp_checksum(data: &[u8]) -> bool {
    if data.len() < 4 {
        return false;
    }

    let mut sum: u32 = 0;
    let mut i = 0;
    while i + 1 < data.len() {
        sum += u16::from_be_bytes([data[i], data[i + 1]]) as u32;
        i += 2;
    }
    if i < data.len() {
        sum += (data[i] as u32) << 8;
    }
    while sum >> 16 != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }

    sum == 0xFFFF || sum == 0x0000
}

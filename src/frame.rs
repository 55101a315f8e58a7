//! Ethernet/IPv4/UDP framing for raw-socket DHCP.
//!
//! Until a lease is bound the client has no usable IP address, so requests
//! go out as hand-built broadcast frames (ff:ff:ff:ff:ff:ff, 0.0.0.0:68 →
//! 255.255.255.255:67) on an `AF_PACKET` socket, and replies come back as
//! raw frames that must be unwrapped before the DHCP payload is visible.
//!
//! Checksums are a wire contract, not an optional nicety: the IPv4 header
//! checksum is mandatory, and while RFC 768 lets IPv4 senders zero the UDP
//! checksum, servers exist that drop datagrams without one. Both are
//! computed here.
//!
//! Decoding is deliberately forgiving: anything that does not look like a
//! UDP datagram to the expected port yields `None` and the caller moves on.
//! A raw socket on a busy segment sees ARP, mDNS, and every neighbour's
//! traffic; none of that is an error.

use std::net::Ipv4Addr;

/// DHCP server UDP port.
pub const SERVER_PORT: u16 = 67;

/// DHCP client UDP port.
pub const CLIENT_PORT: u16 = 68;

/// All-ones Ethernet broadcast address.
pub const BROADCAST_MAC: [u8; 6] = [0xff; 6];

/// EtherType for IPv4.
const ETHERTYPE_IPV4: u16 = 0x0800;

/// IP protocol number for UDP.
const PROTO_UDP: u8 = 17;

const ETH_HEADER_LEN: usize = 14;
const IPV4_HEADER_LEN: usize = 20;
const UDP_HEADER_LEN: usize = 8;

/// Largest frame the client will read off the wire.
pub const MAX_FRAME_SIZE: usize = 1514;

/// Wraps a DHCP payload in a broadcast Ethernet/IPv4/UDP frame.
///
/// Source is the unspecified address on the client port; destination is
/// the limited broadcast on the server port.
pub fn broadcast_frame(src_mac: [u8; 6], payload: &[u8]) -> Vec<u8> {
    encode_udp_frame(
        src_mac,
        BROADCAST_MAC,
        Ipv4Addr::UNSPECIFIED,
        Ipv4Addr::BROADCAST,
        CLIENT_PORT,
        SERVER_PORT,
        payload,
    )
}

/// Builds a complete Ethernet/IPv4/UDP frame around `payload`.
///
/// Lengths and both checksums are filled in. The IPv4 header carries no
/// options, TTL 64, no fragmentation.
pub fn encode_udp_frame(
    src_mac: [u8; 6],
    dst_mac: [u8; 6],
    src_ip: Ipv4Addr,
    dst_ip: Ipv4Addr,
    src_port: u16,
    dst_port: u16,
    payload: &[u8],
) -> Vec<u8> {
    let udp_len = UDP_HEADER_LEN + payload.len();
    let ip_len = IPV4_HEADER_LEN + udp_len;

    let mut frame = Vec::with_capacity(ETH_HEADER_LEN + ip_len);

    // Ethernet header
    frame.extend_from_slice(&dst_mac);
    frame.extend_from_slice(&src_mac);
    frame.extend_from_slice(&ETHERTYPE_IPV4.to_be_bytes());

    // IPv4 header
    frame.push(0x45); // version 4, IHL 5
    frame.push(0x00); // DSCP/ECN
    frame.extend_from_slice(&(ip_len as u16).to_be_bytes());
    frame.extend_from_slice(&[0x00, 0x00]); // identification
    frame.extend_from_slice(&[0x00, 0x00]); // flags + fragment offset
    frame.push(64); // TTL
    frame.push(PROTO_UDP);
    frame.extend_from_slice(&[0x00, 0x00]); // header checksum, filled below
    frame.extend_from_slice(&src_ip.octets());
    frame.extend_from_slice(&dst_ip.octets());

    let ip_checksum = finish(sum_be_words(&frame[ETH_HEADER_LEN..], 0));
    frame[ETH_HEADER_LEN + 10..ETH_HEADER_LEN + 12].copy_from_slice(&ip_checksum.to_be_bytes());

    // UDP header
    frame.extend_from_slice(&src_port.to_be_bytes());
    frame.extend_from_slice(&dst_port.to_be_bytes());
    frame.extend_from_slice(&(udp_len as u16).to_be_bytes());
    frame.extend_from_slice(&[0x00, 0x00]); // checksum, filled below
    frame.extend_from_slice(payload);

    let udp_start = ETH_HEADER_LEN + IPV4_HEADER_LEN;
    let udp_checksum = udp_checksum(src_ip, dst_ip, &frame[udp_start..]);
    frame[udp_start + 6..udp_start + 8].copy_from_slice(&udp_checksum.to_be_bytes());

    frame
}

/// Extracts the UDP payload addressed to `dst_port` from a raw frame.
///
/// Returns `None` for anything that is not an intact IPv4 UDP datagram to
/// that port — wrong EtherType, fragments of other protocols, truncated
/// captures. Inbound checksums are not verified; the NIC and the kernel
/// have already had their chance, and a bad body will fail DHCP parsing.
pub fn udp_payload(frame: &[u8], dst_port: u16) -> Option<&[u8]> {
    if frame.len() < ETH_HEADER_LEN + IPV4_HEADER_LEN + UDP_HEADER_LEN {
        return None;
    }

    let ethertype = u16::from_be_bytes([frame[12], frame[13]]);
    if ethertype != ETHERTYPE_IPV4 {
        return None;
    }

    let ip = &frame[ETH_HEADER_LEN..];
    if ip[0] >> 4 != 4 {
        return None;
    }
    let ihl = usize::from(ip[0] & 0x0f) * 4;
    if ihl < IPV4_HEADER_LEN || ip.len() < ihl + UDP_HEADER_LEN {
        return None;
    }
    if ip[9] != PROTO_UDP {
        return None;
    }

    let udp = &ip[ihl..];
    if u16::from_be_bytes([udp[2], udp[3]]) != dst_port {
        return None;
    }
    let udp_len = usize::from(u16::from_be_bytes([udp[4], udp[5]]));
    if udp_len < UDP_HEADER_LEN || udp.len() < udp_len {
        return None;
    }

    Some(&udp[UDP_HEADER_LEN..udp_len])
}

/// UDP checksum over the IPv4 pseudo-header and the UDP segment.
///
/// `segment` is the UDP header (checksum field zeroed) plus payload. A
/// computed zero is transmitted as 0xFFFF per RFC 768.
fn udp_checksum(src_ip: Ipv4Addr, dst_ip: Ipv4Addr, segment: &[u8]) -> u16 {
    let mut sum = 0u32;
    sum = sum_be_words(&src_ip.octets(), sum);
    sum = sum_be_words(&dst_ip.octets(), sum);
    sum += u32::from(PROTO_UDP);
    sum += segment.len() as u32;
    let checksum = finish(sum_be_words(segment, sum));
    if checksum == 0 { 0xFFFF } else { checksum }
}

/// Accumulates 16-bit big-endian words; an odd trailing byte is padded
/// with zero on the right.
fn sum_be_words(data: &[u8], mut sum: u32) -> u32 {
    let mut chunks = data.chunks_exact(2);
    for word in &mut chunks {
        sum += u32::from(u16::from_be_bytes([word[0], word[1]]));
    }
    if let [last] = chunks.remainder() {
        sum += u32::from(*last) << 8;
    }
    sum
}

/// Folds carries and complements into the final ones-complement checksum.
fn finish(mut sum: u32) -> u16 {
    while sum >> 16 != 0 {
        sum = (sum & 0xffff) + (sum >> 16);
    }
    !(sum as u16)
}

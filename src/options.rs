//! DHCP options as defined in RFC 2132.
//!
//! DHCP uses options to convey configuration parameters between servers and
//! clients. Each option has a code (1 byte), length (1 byte), and
//! variable-length data.
//!
//! Outbound options are kept as raw `(code, payload)` pairs: a request is
//! built from an ordered sequence of [`DhcpOption`]s, appended to the wire
//! exactly as supplied (duplicates included). Inbound option *values* are
//! decoded leniently — noncompliant servers truncate address lists and pad
//! scalars, and a single bad value must not cost us the whole reply.
//!
//! # References
//!
//! - RFC 2132: DHCP Options and BOOTP Vendor Extensions

use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

/// Option codes the client requests from servers by default: subnet mask,
/// router, DNS server, domain name, interface MTU, and NTP servers.
///
/// The parameter request list sent on the wire starts with these codes;
/// callers append more via
/// [`ClientConfig::extra_request_params`](crate::ClientConfig).
pub const DEFAULT_PARAMETER_REQUEST_LIST: [u8; 6] = [
    OptionCode::SubnetMask as u8,
    OptionCode::Router as u8,
    OptionCode::DnsServer as u8,
    OptionCode::DomainName as u8,
    OptionCode::InterfaceMtu as u8,
    OptionCode::NtpServers as u8,
];

/// DHCP option codes as defined in RFC 2132.
///
/// Only codes this client sends or interprets are defined; anything else
/// travels through [`DhcpOption`] as an opaque code byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OptionCode {
    /// Padding (no operation). Used for alignment.
    Pad = 0,
    /// Subnet mask (RFC 2132 §3.3).
    SubnetMask = 1,
    /// Router/gateway addresses (RFC 2132 §3.5).
    Router = 3,
    /// DNS server addresses (RFC 2132 §3.8).
    DnsServer = 6,
    /// Client hostname (RFC 2132 §3.14).
    Hostname = 12,
    /// Domain name for DNS resolution (RFC 2132 §3.17).
    DomainName = 15,
    /// Interface MTU (RFC 2132 §5.1).
    InterfaceMtu = 26,
    /// Broadcast address (RFC 2132 §5.3).
    BroadcastAddress = 28,
    /// NTP server addresses (RFC 2132 §8.3).
    NtpServers = 42,
    /// Requested IP address (RFC 2132 §9.1).
    RequestedIpAddress = 50,
    /// IP address lease time in seconds (RFC 2132 §9.2).
    LeaseTime = 51,
    /// DHCP message type (RFC 2132 §9.6).
    MessageType = 53,
    /// Server identifier (RFC 2132 §9.7).
    ServerIdentifier = 54,
    /// Parameter request list (RFC 2132 §9.8).
    ParameterRequestList = 55,
    /// Renewal time T1 (RFC 2132 §9.11).
    RenewalTime = 58,
    /// Rebinding time T2 (RFC 2132 §9.12).
    RebindingTime = 59,
    /// End of options marker.
    End = 255,
}

/// DHCP message types (Option 53) as defined in RFC 2132 §9.6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    /// Client broadcast to locate servers.
    Discover = 1,
    /// Server response to DISCOVER with IP offer.
    Offer = 2,
    /// Client request for offered parameters.
    Request = 3,
    /// Client indicates address is already in use.
    Decline = 4,
    /// Server acknowledgement with configuration.
    Ack = 5,
    /// Server negative acknowledgement.
    Nak = 6,
    /// Client releases IP address.
    Release = 7,
    /// Client requests config without IP allocation.
    Inform = 8,
}

impl TryFrom<u8> for MessageType {
    type Error = u8;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Discover),
            2 => Ok(Self::Offer),
            3 => Ok(Self::Request),
            4 => Ok(Self::Decline),
            5 => Ok(Self::Ack),
            6 => Ok(Self::Nak),
            7 => Ok(Self::Release),
            8 => Ok(Self::Inform),
            other => Err(other),
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Discover => write!(f, "DISCOVER"),
            Self::Offer => write!(f, "OFFER"),
            Self::Request => write!(f, "REQUEST"),
            Self::Decline => write!(f, "DECLINE"),
            Self::Ack => write!(f, "ACK"),
            Self::Nak => write!(f, "NAK"),
            Self::Release => write!(f, "RELEASE"),
            Self::Inform => write!(f, "INFORM"),
        }
    }
}

/// A single DHCP option: a code and its opaque payload.
///
/// Requests carry an ordered list of these with no deduplication —
/// duplicate codes produce duplicate wire entries, and what a server does
/// with them is its own business.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DhcpOption {
    /// RFC 2132 option code.
    pub code: u8,
    /// Raw option payload (at most 255 bytes survive encoding).
    pub data: Vec<u8>,
}

impl DhcpOption {
    /// Creates an option from a raw code and payload.
    pub fn new(code: u8, data: Vec<u8>) -> Self {
        Self { code, data }
    }

    /// Message type option (53).
    pub fn message_type(message_type: MessageType) -> Self {
        Self::new(OptionCode::MessageType as u8, vec![message_type as u8])
    }

    /// Client hostname option (12).
    pub fn hostname(hostname: &str) -> Self {
        Self::new(OptionCode::Hostname as u8, hostname.as_bytes().to_vec())
    }

    /// Requested IP address option (50).
    pub fn requested_ip(address: Ipv4Addr) -> Self {
        Self::new(
            OptionCode::RequestedIpAddress as u8,
            address.octets().to_vec(),
        )
    }

    /// Server identifier option (54).
    pub fn server_id(address: Ipv4Addr) -> Self {
        Self::new(
            OptionCode::ServerIdentifier as u8,
            address.octets().to_vec(),
        )
    }

    /// Parameter request list option (55).
    pub fn parameter_request_list(codes: &[u8]) -> Self {
        Self::new(OptionCode::ParameterRequestList as u8, codes.to_vec())
    }

    /// Appends the option in wire format (code + length + data).
    ///
    /// Payloads longer than 255 bytes are truncated to fit the one-byte
    /// length field.
    pub fn encode(&self, out: &mut Vec<u8>) {
        let len = self.data.len().min(255);
        out.push(self.code);
        out.push(len as u8);
        out.extend_from_slice(&self.data[..len]);
    }
}

/// Reads a single IPv4 address from an option payload.
///
/// Extra trailing bytes are ignored; fewer than four bytes yields `None`.
pub(crate) fn parse_ipv4(data: &[u8]) -> Option<Ipv4Addr> {
    let octets: [u8; 4] = data.get(..4)?.try_into().ok()?;
    Some(Ipv4Addr::from(octets))
}

/// Reads a sequence of IPv4 addresses from an option payload.
///
/// Yields as many complete addresses as fit; a trailing partial address is
/// dropped rather than failing the whole list.
pub(crate) fn parse_ipv4_list(data: &[u8]) -> Vec<Ipv4Addr> {
    data.chunks_exact(4)
        .map(|chunk| Ipv4Addr::new(chunk[0], chunk[1], chunk[2], chunk[3]))
        .collect()
}

/// Reads a big-endian u32 (lease/renewal/rebinding seconds).
pub(crate) fn parse_u32(data: &[u8]) -> Option<u32> {
    let bytes: [u8; 4] = data.get(..4)?.try_into().ok()?;
    Some(u32::from_be_bytes(bytes))
}

/// Reads a big-endian u16 (interface MTU).
pub(crate) fn parse_u16(data: &[u8]) -> Option<u16> {
    let bytes: [u8; 2] = data.get(..2)?.try_into().ok()?;
    Some(u16::from_be_bytes(bytes))
}

//! DHCP packet parsing and encoding per RFC 2131.
//!
//! A DHCP packet is a fixed 236-byte BOOTP header, a 4-byte magic cookie,
//! and a variable options section. This module builds the BOOTREQUEST
//! packets the client broadcasts and parses the BOOTREPLY packets servers
//! send back.
//!
//! Parsing is strict about framing (length, cookie, option TLV boundaries)
//! and lenient about option *values*: a reply with a short router list or an
//! oversized MTU option is still a usable reply, just without that field.
//!
//! # References
//!
//! - RFC 2131: Dynamic Host Configuration Protocol

use std::net::Ipv4Addr;

use crate::error::{Error, Result};
use crate::options::{self, DhcpOption, MessageType, OptionCode};

/// DHCP magic cookie that identifies DHCP packets (vs plain BOOTP).
pub const DHCP_MAGIC_COOKIE: [u8; 4] = [99, 130, 83, 99];

/// BOOTP/DHCP operation code for client requests.
pub const BOOTREQUEST: u8 = 1;

/// BOOTP/DHCP operation code for server replies.
pub const BOOTREPLY: u8 = 2;

/// Hardware type for Ethernet.
pub const HTYPE_ETHERNET: u8 = 1;

/// Hardware address length for Ethernet.
pub const HLEN_ETHERNET: u8 = 6;

/// Broadcast bit in the BOOTP flags field.
///
/// Set on every outbound request: the client has no usable unicast address
/// until the caller configures one, so replies must be broadcast.
pub const FLAG_BROADCAST: u16 = 0x8000;

// Field offsets within the fixed header (RFC 2131 §2).
const XID_OFFSET: usize = 4;
const SECS_OFFSET: usize = 8;
const FLAGS_OFFSET: usize = 10;
const CIADDR_OFFSET: usize = 12;
const YIADDR_OFFSET: usize = 16;
const SIADDR_OFFSET: usize = 20;
const GIADDR_OFFSET: usize = 24;
const CHADDR_OFFSET: usize = 28;
const SNAME_OFFSET: usize = 44;
const FILE_OFFSET: usize = 108;
const COOKIE_OFFSET: usize = 236;

/// Fixed header plus magic cookie; the smallest parseable packet.
pub const FIXED_HEADER_SIZE: usize = COOKIE_OFFSET + DHCP_MAGIC_COOKIE.len();

/// Minimum encoded packet size per RFC 2131 §2.
///
/// DHCP requires packets of at least 300 bytes for compatibility with
/// BOOTP relay agents; shorter packets are zero-padded.
const MIN_PACKET_SIZE: usize = 300;

/// A DHCP packet: the fixed BOOTP header fields plus the option list.
///
/// Use [`request`](Self::request) to build outbound client packets and
/// [`parse`](Self::parse) for inbound server replies. The `sname` and
/// `file` header areas are not modeled; the client neither sends nor
/// interprets them.
#[derive(Debug, Clone)]
pub struct DhcpPacket {
    /// Operation code: [`BOOTREQUEST`] or [`BOOTREPLY`].
    pub op: u8,

    /// Hardware address type. [`HTYPE_ETHERNET`] for Ethernet.
    pub htype: u8,

    /// Hardware address length. [`HLEN_ETHERNET`] for Ethernet.
    pub hlen: u8,

    /// Hop count, incremented by relay agents.
    pub hops: u8,

    /// Transaction ID chosen by the client, echoed in replies.
    pub xid: u32,

    /// Seconds elapsed since the client began address acquisition.
    pub secs: u16,

    /// Flags. Bit 15 ([`FLAG_BROADCAST`]) requests broadcast replies.
    pub flags: u16,

    /// Client IP address (only meaningful while renewing).
    pub ciaddr: Ipv4Addr,

    /// "Your" IP address — the address the server is assigning.
    pub yiaddr: Ipv4Addr,

    /// Next-server IP address (TFTP/boot server in BOOTP terms).
    pub siaddr: Ipv4Addr,

    /// Gateway IP address, set by relay agents.
    pub giaddr: Ipv4Addr,

    /// Client hardware address (MAC in the first `hlen` bytes).
    pub chaddr: [u8; 16],

    /// Options in wire order, including duplicates and unknown codes.
    pub options: Vec<DhcpOption>,
}

impl DhcpPacket {
    /// Builds an outbound client packet with the supplied options.
    ///
    /// The options are appended in order with no deduplication; callers
    /// are expected to put the message type first (servers commonly stop
    /// scanning once they find it).
    pub fn request(xid: u32, hw_addr: [u8; 6], options: Vec<DhcpOption>) -> Self {
        let mut chaddr = [0u8; 16];
        chaddr[..6].copy_from_slice(&hw_addr);

        Self {
            op: BOOTREQUEST,
            htype: HTYPE_ETHERNET,
            hlen: HLEN_ETHERNET,
            hops: 0,
            xid,
            secs: 0,
            flags: FLAG_BROADCAST,
            ciaddr: Ipv4Addr::UNSPECIFIED,
            yiaddr: Ipv4Addr::UNSPECIFIED,
            siaddr: Ipv4Addr::UNSPECIFIED,
            giaddr: Ipv4Addr::UNSPECIFIED,
            chaddr,
            options,
        }
    }

    /// Parses a DHCP packet from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPacket`] if the packet is shorter than the
    /// fixed header, the magic cookie is wrong, or an option's declared
    /// length runs past the end of the packet.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < FIXED_HEADER_SIZE {
            return Err(Error::InvalidPacket(format!(
                "packet too short: {} bytes (minimum {})",
                data.len(),
                FIXED_HEADER_SIZE
            )));
        }

        if data[COOKIE_OFFSET..FIXED_HEADER_SIZE] != DHCP_MAGIC_COOKIE {
            return Err(Error::InvalidPacket("invalid magic cookie".to_string()));
        }

        let ip_at = |offset: usize| {
            Ipv4Addr::new(
                data[offset],
                data[offset + 1],
                data[offset + 2],
                data[offset + 3],
            )
        };

        let mut chaddr = [0u8; 16];
        chaddr.copy_from_slice(&data[CHADDR_OFFSET..CHADDR_OFFSET + 16]);

        Ok(Self {
            op: data[0],
            htype: data[1],
            hlen: data[2],
            hops: data[3],
            xid: u32::from_be_bytes([
                data[XID_OFFSET],
                data[XID_OFFSET + 1],
                data[XID_OFFSET + 2],
                data[XID_OFFSET + 3],
            ]),
            secs: u16::from_be_bytes([data[SECS_OFFSET], data[SECS_OFFSET + 1]]),
            flags: u16::from_be_bytes([data[FLAGS_OFFSET], data[FLAGS_OFFSET + 1]]),
            ciaddr: ip_at(CIADDR_OFFSET),
            yiaddr: ip_at(YIADDR_OFFSET),
            siaddr: ip_at(SIADDR_OFFSET),
            giaddr: ip_at(GIADDR_OFFSET),
            chaddr,
            options: Self::parse_options(&data[FIXED_HEADER_SIZE..])?,
        })
    }

    fn parse_options(data: &[u8]) -> Result<Vec<DhcpOption>> {
        let mut options = Vec::new();
        let mut index = 0;

        while index < data.len() {
            let code = data[index];

            if code == OptionCode::Pad as u8 {
                index += 1;
                continue;
            }
            if code == OptionCode::End as u8 {
                break;
            }

            if index + 1 >= data.len() {
                return Err(Error::InvalidPacket("option length missing".to_string()));
            }
            let length = data[index + 1] as usize;
            if index + 2 + length > data.len() {
                return Err(Error::InvalidPacket("option data truncated".to_string()));
            }

            options.push(DhcpOption::new(
                code,
                data[index + 2..index + 2 + length].to_vec(),
            ));
            index += 2 + length;
        }

        Ok(options)
    }

    /// Encodes the packet to bytes for transmission.
    ///
    /// The returned buffer is zero-padded to at least 300 bytes and the
    /// options section is terminated with an End marker.
    pub fn encode(&self) -> Vec<u8> {
        let mut packet = Vec::with_capacity(MIN_PACKET_SIZE);

        packet.push(self.op);
        packet.push(self.htype);
        packet.push(self.hlen);
        packet.push(self.hops);
        packet.extend_from_slice(&self.xid.to_be_bytes());
        packet.extend_from_slice(&self.secs.to_be_bytes());
        packet.extend_from_slice(&self.flags.to_be_bytes());
        packet.extend_from_slice(&self.ciaddr.octets());
        packet.extend_from_slice(&self.yiaddr.octets());
        packet.extend_from_slice(&self.siaddr.octets());
        packet.extend_from_slice(&self.giaddr.octets());
        packet.extend_from_slice(&self.chaddr);
        packet.resize(SNAME_OFFSET, 0);
        packet.resize(FILE_OFFSET, 0);
        packet.resize(COOKIE_OFFSET, 0);
        packet.extend_from_slice(&DHCP_MAGIC_COOKIE);

        for option in &self.options {
            option.encode(&mut packet);
        }
        packet.push(OptionCode::End as u8);

        if packet.len() < MIN_PACKET_SIZE {
            packet.resize(MIN_PACKET_SIZE, 0);
        }

        packet
    }

    /// Raw payload of the first option with the given code, if any.
    ///
    /// Duplicate options exist on real networks; like most clients we take
    /// the first occurrence and ignore the rest.
    pub fn option(&self, code: OptionCode) -> Option<&[u8]> {
        self.options
            .iter()
            .find(|option| option.code == code as u8)
            .map(|option| option.data.as_slice())
    }

    /// The DHCP message type (Option 53), if present and recognized.
    pub fn message_type(&self) -> Option<MessageType> {
        let data = self.option(OptionCode::MessageType)?;
        MessageType::try_from(*data.first()?).ok()
    }

    /// Server identifier (Option 54).
    pub fn server_id(&self) -> Option<Ipv4Addr> {
        options::parse_ipv4(self.option(OptionCode::ServerIdentifier)?)
    }

    /// Subnet mask (Option 1).
    pub fn subnet_mask(&self) -> Option<Ipv4Addr> {
        options::parse_ipv4(self.option(OptionCode::SubnetMask)?)
    }

    /// Broadcast address (Option 28).
    pub fn broadcast_address(&self) -> Option<Ipv4Addr> {
        options::parse_ipv4(self.option(OptionCode::BroadcastAddress)?)
    }

    /// Router addresses (Option 3), wire order preserved.
    pub fn routers(&self) -> Vec<Ipv4Addr> {
        self.option(OptionCode::Router)
            .map(options::parse_ipv4_list)
            .unwrap_or_default()
    }

    /// DNS server addresses (Option 6), wire order preserved.
    pub fn dns_servers(&self) -> Vec<Ipv4Addr> {
        self.option(OptionCode::DnsServer)
            .map(options::parse_ipv4_list)
            .unwrap_or_default()
    }

    /// NTP server addresses (Option 42), wire order preserved.
    pub fn time_servers(&self) -> Vec<Ipv4Addr> {
        self.option(OptionCode::NtpServers)
            .map(options::parse_ipv4_list)
            .unwrap_or_default()
    }

    /// Domain name (Option 15).
    pub fn domain_name(&self) -> Option<String> {
        let data = self.option(OptionCode::DomainName)?;
        if data.is_empty() {
            return None;
        }
        Some(String::from_utf8_lossy(data).to_string())
    }

    /// Interface MTU (Option 26).
    pub fn mtu(&self) -> Option<u16> {
        options::parse_u16(self.option(OptionCode::InterfaceMtu)?)
    }

    /// Lease time in seconds (Option 51).
    pub fn lease_time(&self) -> Option<u32> {
        options::parse_u32(self.option(OptionCode::LeaseTime)?)
    }

    /// Renewal time T1 in seconds (Option 58).
    pub fn renewal_time(&self) -> Option<u32> {
        options::parse_u32(self.option(OptionCode::RenewalTime)?)
    }

    /// Rebinding time T2 in seconds (Option 59).
    pub fn rebinding_time(&self) -> Option<u32> {
        options::parse_u32(self.option(OptionCode::RebindingTime)?)
    }
}

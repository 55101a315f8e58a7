//! Raw link-layer sockets and the transport seam.
//!
//! The protocol engine talks to the network through the [`Link`] and
//! [`LinkProvider`] traits: a provider opens one fresh link per
//! discover/request cycle, and dropping the link closes it on every exit
//! path. Production uses [`PacketSocket`], an `AF_PACKET` socket filtered
//! to IPv4 frames and bound to one interface; tests substitute an
//! in-memory pair.
//!
//! Opening a packet socket requires `CAP_NET_RAW`.

use std::fs;
use std::future::Future;
use std::io;
use std::os::fd::AsRawFd;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::io::unix::AsyncFd;

use crate::error::{Error, Result};

/// One open link to the network, able to move whole Ethernet frames.
///
/// A link is owned by exactly one transaction; closing happens on drop.
pub trait Link: Send + 'static {
    /// Transmits one complete frame.
    fn send(&mut self, frame: &[u8]) -> impl Future<Output = io::Result<usize>> + Send;

    /// Receives one complete frame into `buf`, returning its length.
    fn recv(&mut self, buf: &mut [u8]) -> impl Future<Output = io::Result<usize>> + Send;
}

/// Opens a fresh [`Link`] for each transaction.
pub trait LinkProvider: Send + Sync + 'static {
    /// The link type this provider hands out.
    type Link: Link;

    /// Opens a new link bound to the configured interface.
    fn open(&self) -> Result<Self::Link>;
}

/// A network interface the client can bind to.
#[derive(Debug, Clone)]
pub struct Interface {
    /// Interface name, e.g. `eth0`.
    pub name: String,
    /// Kernel interface index.
    pub index: u32,
    /// Hardware (MAC) address.
    pub hw_addr: [u8; 6],
}

impl Interface {
    /// Resolves an interface by name.
    ///
    /// The index comes from `if_nametoindex(3)` and the hardware address
    /// from sysfs.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Socket`] if the interface does not exist or its
    /// hardware address cannot be read.
    pub fn by_name(name: &str) -> Result<Self> {
        let cname = std::ffi::CString::new(name)
            .map_err(|_| Error::Socket(format!("invalid interface name {name:?}")))?;
        let index = unsafe { libc::if_nametoindex(cname.as_ptr()) };
        if index == 0 {
            return Err(Error::Socket(format!("interface {name} not found")));
        }

        let address = fs::read_to_string(format!("/sys/class/net/{name}/address"))
            .map_err(|error| {
                Error::Socket(format!("cannot read hardware address of {name}: {error}"))
            })?;
        let hw_addr = parse_mac(address.trim()).ok_or_else(|| {
            Error::Socket(format!(
                "interface {name} has no usable hardware address ({})",
                address.trim()
            ))
        })?;

        Ok(Self {
            name: name.to_string(),
            index,
            hw_addr,
        })
    }
}

fn parse_mac(text: &str) -> Option<[u8; 6]> {
    let mut hw_addr = [0u8; 6];
    let mut parts = text.split(':');
    for byte in &mut hw_addr {
        *byte = u8::from_str_radix(parts.next()?, 16).ok()?;
    }
    parts.next().is_none().then_some(hw_addr)
}

/// `ETH_P_IP` in network byte order, as `socket(2)` and `bind(2)` want it.
fn eth_p_ip_be() -> libc::c_int {
    libc::c_int::from((libc::ETH_P_IP as u16).to_be())
}

/// [`LinkProvider`] backed by `AF_PACKET` raw sockets.
#[derive(Debug, Clone)]
pub struct PacketSocket {
    interface: Interface,
}

impl PacketSocket {
    /// Creates a provider that opens sockets on the given interface.
    pub fn new(interface: Interface) -> Self {
        Self { interface }
    }
}

impl LinkProvider for PacketSocket {
    type Link = PacketLink;

    fn open(&self) -> Result<PacketLink> {
        let socket = Socket::new(Domain::PACKET, Type::RAW, Some(Protocol::from(eth_p_ip_be())))
            .map_err(|error| Error::Socket(format!("failed to create raw socket: {error}")))?;
        socket
            .set_nonblocking(true)
            .map_err(|error| Error::Socket(format!("failed to set non-blocking: {error}")))?;

        bind_to_interface(&socket, self.interface.index)?;

        let fd = AsyncFd::new(socket).map_err(|error| {
            Error::Socket(format!("failed to register socket with the runtime: {error}"))
        })?;

        Ok(PacketLink { fd })
    }
}

/// Binds a packet socket to one interface so it only sees (and sends on)
/// that link.
fn bind_to_interface(socket: &Socket, index: u32) -> Result<()> {
    let mut addr: libc::sockaddr_ll = unsafe { std::mem::zeroed() };
    addr.sll_family = libc::AF_PACKET as libc::sa_family_t;
    addr.sll_protocol = (libc::ETH_P_IP as u16).to_be();
    addr.sll_ifindex = index as libc::c_int;

    let result = unsafe {
        libc::bind(
            socket.as_raw_fd(),
            std::ptr::addr_of!(addr).cast::<libc::sockaddr>(),
            std::mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t,
        )
    };
    if result < 0 {
        return Err(Error::Socket(format!(
            "failed to bind to interface index {index}: {}",
            io::Error::last_os_error()
        )));
    }
    Ok(())
}

/// An open `AF_PACKET` socket integrated with the Tokio reactor.
///
/// Frames are sent and received whole; the socket is bound to its
/// interface, so `send(2)`/`recv(2)` need no per-call address.
#[derive(Debug)]
pub struct PacketLink {
    fd: AsyncFd<Socket>,
}

impl Link for PacketLink {
    async fn send(&mut self, frame: &[u8]) -> io::Result<usize> {
        loop {
            let mut guard = self.fd.writable().await?;
            let sent = guard.try_io(|fd| {
                let n = unsafe {
                    libc::send(
                        fd.get_ref().as_raw_fd(),
                        frame.as_ptr().cast::<libc::c_void>(),
                        frame.len(),
                        0,
                    )
                };
                if n < 0 {
                    Err(io::Error::last_os_error())
                } else {
                    Ok(n as usize)
                }
            });
            match sent {
                Ok(result) => return result,
                Err(_would_block) => continue,
            }
        }
    }

    async fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            let mut guard = self.fd.readable().await?;
            let received = guard.try_io(|fd| {
                let n = unsafe {
                    libc::recv(
                        fd.get_ref().as_raw_fd(),
                        buf.as_mut_ptr().cast::<libc::c_void>(),
                        buf.len(),
                        0,
                    )
                };
                if n < 0 {
                    Err(io::Error::last_os_error())
                } else {
                    Ok(n as usize)
                }
            });
            match received {
                Ok(result) => return result,
                Err(_would_block) => continue,
            }
        }
    }
}

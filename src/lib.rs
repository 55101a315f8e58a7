//! # leasewire
//!
//! A DHCPv4 client engine (RFC 2131) over raw link-layer sockets.
//!
//! ## Features
//!
//! - Full DORA flow: DISCOVER, OFFER, REQUEST, ACK/NAK
//! - Hand-built Ethernet/IPv4/UDP broadcast frames with computed checksums
//! - T1 renewal, T2 rebinding, and lease-expiry timers raced against
//!   external control signals
//! - Thread-safe control surface: start, stop, force-renew, force-rebind
//! - Bind/expire callbacks for the embedding application
//! - Custom request options and parameter-request codes
//!
//! The engine negotiates and tracks the lease; *applying* it — assigning
//! the address, installing routes, writing resolv.conf — is the caller's
//! job, triggered from the bound callback.
//!
//! ## Quick Start
//!
//! ```no_run
//! use leasewire::{Client, ClientConfig, Interface};
//!
//! #[tokio::main]
//! async fn main() -> leasewire::Result<()> {
//!     let interface = Interface::by_name("eth0")?;
//!     let client = Client::new(interface, ClientConfig::default());
//!     client.on_bound(|lease| println!("bound: {}", lease.fixed_address));
//!     client.on_expire(|lease| println!("lost: {}", lease.fixed_address));
//!     client.start();
//!     tokio::signal::ctrl_c().await?;
//!     client.stop().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`Client`] - Control surface plus the background worker per interface
//! - [`Lease`] - A negotiated assignment with its renew/rebind/expire times
//! - [`Transaction`](channel::Transaction) - One exchange over one socket
//! - [`DhcpPacket`] - DHCP packet parsing and encoding
//! - [`DhcpOption`] - Options in raw TLV form
//! - [`frame`] - Ethernet/IPv4/UDP framing for raw broadcast
//!
//! Raw sockets require `CAP_NET_RAW`, and Linux only.

pub mod channel;
pub mod client;
pub mod config;
pub mod error;
pub mod frame;
pub mod lease;
pub mod options;
pub mod packet;
pub mod socket;

pub use client::{Callback, Client};
pub use config::ClientConfig;
pub use error::{Error, Result};
pub use lease::Lease;
pub use options::{DEFAULT_PARAMETER_REQUEST_LIST, DhcpOption, MessageType, OptionCode};
pub use packet::DhcpPacket;
pub use socket::{Interface, Link, LinkProvider, PacketSocket};

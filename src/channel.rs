//! One DHCP transaction: a scoped socket, a fresh transaction id, and the
//! send/receive discipline for a single discover/request or renew attempt.
//!
//! The transaction id is regenerated for every attempt so stale in-flight
//! replies from earlier exchanges (or other clients entirely) can never be
//! mistaken for ours. The underlying link closes when the transaction is
//! dropped, on success and failure alike.

use std::time::Duration;

use tokio::time::{self, Instant};
use tracing::trace;

use crate::error::{Error, Result};
use crate::frame::{self, MAX_FRAME_SIZE};
use crate::lease::Lease;
use crate::options::{DhcpOption, MessageType};
use crate::packet::{BOOTREPLY, DhcpPacket};
use crate::socket::Link;

/// A single request/response exchange over one freshly opened link.
pub struct Transaction<L: Link> {
    link: L,
    xid: u32,
    hw_addr: [u8; 6],
    response_timeout: Duration,
}

impl<L: Link> Transaction<L> {
    /// Wraps an open link with a new random transaction id.
    pub fn new(link: L, hw_addr: [u8; 6], response_timeout: Duration) -> Self {
        Self {
            link,
            xid: rand::random(),
            hw_addr,
            response_timeout,
        }
    }

    /// The transaction id replies must echo.
    pub fn xid(&self) -> u32 {
        self.xid
    }

    /// Broadcasts a request carrying the given options, in order.
    pub async fn send(&mut self, options: Vec<DhcpOption>) -> Result<()> {
        let packet = DhcpPacket::request(self.xid, self.hw_addr, options);
        let frame = frame::broadcast_frame(self.hw_addr, &packet.encode());
        self.link.send(&frame).await?;
        Ok(())
    }

    /// Waits for a reply matching this transaction whose message type is in
    /// `accept`.
    ///
    /// Everything else read before the deadline is skipped silently: frames
    /// that are not DHCP at all, requests from other clients, replies to
    /// other transactions, and reply types we are not waiting for (e.g. a
    /// late OFFER from a second server while we wait for an ACK).
    ///
    /// # Errors
    ///
    /// [`Error::ResponseTimeout`] if nothing acceptable arrives within the
    /// response timeout; [`Error::Io`] if the link fails.
    pub async fn recv_matching(&mut self, accept: &[MessageType]) -> Result<(MessageType, Lease)> {
        let deadline = Instant::now() + self.response_timeout;
        let mut buf = [0u8; MAX_FRAME_SIZE];

        loop {
            let len = match time::timeout_at(deadline, self.link.recv(&mut buf)).await {
                Ok(read) => read?,
                Err(_elapsed) => return Err(Error::ResponseTimeout),
            };

            let Some(payload) = frame::udp_payload(&buf[..len], frame::CLIENT_PORT) else {
                continue;
            };
            let Ok(packet) = DhcpPacket::parse(payload) else {
                continue;
            };
            if packet.op != BOOTREPLY || packet.xid != self.xid {
                trace!(
                    xid = packet.xid,
                    op = packet.op,
                    "skipping reply for another transaction"
                );
                continue;
            }
            let Some(message_type) = packet.message_type() else {
                continue;
            };
            if !accept.contains(&message_type) {
                trace!(%message_type, "skipping unexpected message type");
                continue;
            }

            let lease = Lease::from_reply(&packet, Instant::now());
            return Ok((message_type, lease));
        }
    }
}

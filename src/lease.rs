//! The lease model: what a server granted and when it must be refreshed.
//!
//! A [`Lease`] is an immutable snapshot built from a parsed server reply.
//! The worker replaces the whole value on renewal and drops it on NAK or
//! expiry; nothing mutates a lease in place.

use std::net::Ipv4Addr;
use std::time::Duration;

use tokio::time::Instant;

use crate::packet::DhcpPacket;

/// A lease assignment from a DHCP server.
///
/// Timing fields are absolute monotonic instants derived from the T1/T2/
/// lease-time options plus the reply's receive time. Servers are supposed
/// to keep `renew_at ≤ rebind_at ≤ expire_at`; nothing here enforces that,
/// and a violating lease simply makes the earliest deadline fire first.
#[derive(Debug, Clone)]
pub struct Lease {
    /// The server that granted the lease (Option 54).
    pub server_id: Ipv4Addr,

    /// The address assigned to us (`yiaddr`).
    pub fixed_address: Ipv4Addr,

    /// Subnet mask (Option 1).
    pub netmask: Ipv4Addr,

    /// Next server in the boot process (`siaddr`).
    pub next_server: Ipv4Addr,

    /// Broadcast address (Option 28).
    pub broadcast: Ipv4Addr,

    /// Router addresses (Option 3), wire order preserved.
    pub routers: Vec<Ipv4Addr>,

    /// DNS server addresses (Option 6), wire order preserved.
    pub dns_servers: Vec<Ipv4Addr>,

    /// NTP server addresses (Option 42), wire order preserved.
    pub time_servers: Vec<Ipv4Addr>,

    /// Domain name (Option 15).
    pub domain_name: Option<String>,

    /// Interface MTU (Option 26).
    pub mtu: Option<u16>,

    /// When to start renewing with the granting server (T1).
    pub renew_at: Option<Instant>,

    /// When to start rebinding with any server (T2).
    pub rebind_at: Option<Instant>,

    /// When the lease expires and the address must be abandoned.
    pub expire_at: Option<Instant>,
}

/// Which lease deadline fires next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Deadline {
    Renew,
    Rebind,
    Expire,
}

impl Lease {
    /// Builds a lease from a parsed server reply received at `received_at`.
    ///
    /// Missing timing options become `None`; whether that is acceptable
    /// depends on the message (an OFFER without timers is fine, an ACK is
    /// not — see [`has_timers`](Self::has_timers)).
    pub fn from_reply(packet: &DhcpPacket, received_at: Instant) -> Self {
        let deadline = |seconds: Option<u32>| {
            seconds.map(|seconds| received_at + Duration::from_secs(u64::from(seconds)))
        };

        Self {
            server_id: packet.server_id().unwrap_or(Ipv4Addr::UNSPECIFIED),
            fixed_address: packet.yiaddr,
            netmask: packet.subnet_mask().unwrap_or(Ipv4Addr::UNSPECIFIED),
            next_server: packet.siaddr,
            broadcast: packet.broadcast_address().unwrap_or(Ipv4Addr::UNSPECIFIED),
            routers: packet.routers(),
            dns_servers: packet.dns_servers(),
            time_servers: packet.time_servers(),
            domain_name: packet.domain_name(),
            mtu: packet.mtu(),
            renew_at: deadline(packet.renewal_time()),
            rebind_at: deadline(packet.rebinding_time()),
            expire_at: deadline(packet.lease_time()),
        }
    }

    /// Whether all three timing fields are present.
    ///
    /// An ACK failing this is rejected rather than adopted: a lease the
    /// client cannot schedule is worse than no lease.
    pub fn has_timers(&self) -> bool {
        self.renew_at.is_some() && self.rebind_at.is_some() && self.expire_at.is_some()
    }

    /// Prefix length derived from the subnet mask.
    pub fn prefix_len(&self) -> u8 {
        u32::from(self.netmask).count_ones() as u8
    }

    /// Whether the rebinding time has been reached.
    ///
    /// Past T2 the renewal Request goes out without a server identifier so
    /// any authoritative server may answer.
    pub(crate) fn rebinding(&self, now: Instant) -> bool {
        self.rebind_at.is_some_and(|rebind_at| now >= rebind_at)
    }

    /// Whether the lease has outlived its expiry deadline.
    pub(crate) fn expired(&self, now: Instant) -> bool {
        self.expire_at.is_some_and(|expire_at| now >= expire_at)
    }

    /// The earliest pending deadline and its kind.
    ///
    /// Instants already in the past are still returned — the caller's
    /// sleep completes immediately, which is exactly the degraded behavior
    /// wanted for servers that hand out inverted timers.
    pub(crate) fn next_deadline(&self) -> Option<(Instant, Deadline)> {
        let candidates = [
            (self.renew_at, Deadline::Renew),
            (self.rebind_at, Deadline::Rebind),
            (self.expire_at, Deadline::Expire),
        ];

        let mut next: Option<(Instant, Deadline)> = None;
        for (at, kind) in candidates {
            let Some(at) = at else { continue };
            if next.is_none_or(|(best, _)| at < best) {
                next = Some((at, kind));
            }
        }
        next
    }
}

//! End-to-end tests against a scripted in-memory DHCP server.
//!
//! The client runs unmodified except for its transport: `TestProvider`
//! hands out links backed by channels instead of raw sockets. Tokio's
//! paused clock makes the lease timers deterministic — a 50-second renewal
//! interval elapses the moment every task goes idle.

use std::io;
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;

use leasewire::packet::{BOOTREPLY, DhcpPacket};
use leasewire::{
    Client, ClientConfig, DhcpOption, Interface, Link, LinkProvider, MessageType, OptionCode,
    frame,
};

const CLIENT_MAC: [u8; 6] = [0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff];
const SERVER_MAC: [u8; 6] = [0x02, 0x00, 0x00, 0x00, 0x00, 0x01];
const SERVER_IP: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);
const OFFERED_IP: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 5);

type ReplySlot = Arc<Mutex<Option<mpsc::UnboundedSender<Vec<u8>>>>>;

/// Transport provider whose links talk to [`TestServer`].
#[derive(Clone)]
struct TestProvider {
    to_server: mpsc::UnboundedSender<Vec<u8>>,
    reply_slot: ReplySlot,
}

struct TestLink {
    rx: mpsc::UnboundedReceiver<Vec<u8>>,
    tx: mpsc::UnboundedSender<Vec<u8>>,
}

impl Link for TestLink {
    async fn send(&mut self, frame: &[u8]) -> io::Result<usize> {
        let _ = self.tx.send(frame.to_vec());
        Ok(frame.len())
    }

    async fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.rx.recv().await {
            Some(frame) => {
                let len = frame.len().min(buf.len());
                buf[..len].copy_from_slice(&frame[..len]);
                Ok(len)
            }
            None => Err(io::Error::new(io::ErrorKind::BrokenPipe, "link closed")),
        }
    }
}

impl LinkProvider for TestProvider {
    type Link = TestLink;

    fn open(&self) -> leasewire::Result<TestLink> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.reply_slot.lock().unwrap() = Some(tx);
        Ok(TestLink {
            rx,
            tx: self.to_server.clone(),
        })
    }
}

/// The scripted server side of the network.
struct TestServer {
    from_client: mpsc::UnboundedReceiver<Vec<u8>>,
    reply_slot: ReplySlot,
}

impl TestServer {
    /// The next parsed client packet and its arrival time.
    async fn recv(&mut self) -> (DhcpPacket, Instant) {
        loop {
            let frame = self
                .from_client
                .recv()
                .await
                .expect("client side shut down");
            let Some(payload) = frame::udp_payload(&frame, frame::SERVER_PORT) else {
                continue;
            };
            if let Ok(packet) = DhcpPacket::parse(payload) {
                return (packet, Instant::now());
            }
        }
    }

    fn no_pending_request(&mut self) -> bool {
        self.from_client.try_recv().is_err()
    }

    /// Sends a reply frame into the client's currently open link.
    fn reply(&self, packet: &DhcpPacket) {
        let frame = frame::encode_udp_frame(
            SERVER_MAC,
            CLIENT_MAC,
            SERVER_IP,
            Ipv4Addr::BROADCAST,
            frame::SERVER_PORT,
            frame::CLIENT_PORT,
            &packet.encode(),
        );
        self.send_raw(frame);
    }

    fn send_raw(&self, frame: Vec<u8>) {
        if let Some(tx) = self.reply_slot.lock().unwrap().as_ref() {
            let _ = tx.send(frame);
        }
    }
}

fn test_net() -> (TestProvider, TestServer) {
    let (to_server, from_client) = mpsc::unbounded_channel();
    let reply_slot: ReplySlot = Arc::new(Mutex::new(None));
    (
        TestProvider {
            to_server,
            reply_slot: Arc::clone(&reply_slot),
        },
        TestServer {
            from_client,
            reply_slot,
        },
    )
}

fn test_interface() -> Interface {
    Interface {
        name: "sim0".to_string(),
        index: 7,
        hw_addr: CLIENT_MAC,
    }
}

fn seconds_option(code: OptionCode, seconds: u32) -> DhcpOption {
    DhcpOption::new(code as u8, seconds.to_be_bytes().to_vec())
}

/// Builds a server reply echoing the request's transaction id.
fn reply_packet(
    request: &DhcpPacket,
    message_type: MessageType,
    timers: Option<(u32, u32, u32)>,
) -> DhcpPacket {
    let mut options = vec![
        DhcpOption::message_type(message_type),
        DhcpOption::server_id(SERVER_IP),
        DhcpOption::new(OptionCode::SubnetMask as u8, vec![255, 255, 255, 0]),
    ];
    if let Some((renew, rebind, expire)) = timers {
        options.push(seconds_option(OptionCode::RenewalTime, renew));
        options.push(seconds_option(OptionCode::RebindingTime, rebind));
        options.push(seconds_option(OptionCode::LeaseTime, expire));
    }

    let mut packet = DhcpPacket::request(request.xid, CLIENT_MAC, options);
    packet.op = BOOTREPLY;
    packet.yiaddr = OFFERED_IP;
    packet.siaddr = SERVER_IP;
    packet
}

struct Harness {
    client: Client<TestProvider>,
    server: TestServer,
    bound: mpsc::UnboundedReceiver<leasewire::Lease>,
    expired: mpsc::UnboundedReceiver<leasewire::Lease>,
}

fn start_client(config: ClientConfig) -> Harness {
    let (provider, server) = test_net();
    let client = Client::with_provider(test_interface(), config, provider);

    let (bound_tx, bound) = mpsc::unbounded_channel();
    client.on_bound(move |lease| {
        let _ = bound_tx.send(lease.clone());
    });
    let (expired_tx, expired) = mpsc::unbounded_channel();
    client.on_expire(move |lease| {
        let _ = expired_tx.send(lease.clone());
    });
    client.start();

    Harness {
        client,
        server,
        bound,
        expired,
    }
}

/// Runs the happy-path exchange: Discover → Offer, Request → Ack.
/// Returns the instant the ACK went out.
async fn bind(harness: &mut Harness, timers: (u32, u32, u32)) -> Instant {
    let (discover, _) = harness.server.recv().await;
    assert_eq!(discover.message_type(), Some(MessageType::Discover));
    harness
        .server
        .reply(&reply_packet(&discover, MessageType::Offer, None));

    let (request, _) = harness.server.recv().await;
    assert_eq!(request.message_type(), Some(MessageType::Request));
    assert_eq!(request.xid, discover.xid);
    harness
        .server
        .reply(&reply_packet(&request, MessageType::Ack, Some(timers)));
    Instant::now()
}

#[tokio::test(start_paused = true)]
async fn binds_and_renews_at_t1() {
    let mut harness = start_client(ClientConfig::default());

    let (discover, _) = harness.server.recv().await;
    assert_eq!(discover.message_type(), Some(MessageType::Discover));
    assert_eq!(&discover.chaddr[..6], &CLIENT_MAC);

    // broadcast-segment noise the client must skip: a frame that is not
    // even IPv4, and an offer for someone else's transaction
    harness.server.send_raw(vec![0u8; 64]);
    let mut stale = reply_packet(&discover, MessageType::Offer, None);
    stale.xid = discover.xid.wrapping_add(1);
    harness.server.reply(&stale);
    harness
        .server
        .reply(&reply_packet(&discover, MessageType::Offer, None));

    let (request, _) = harness.server.recv().await;
    assert_eq!(request.message_type(), Some(MessageType::Request));
    assert_eq!(request.xid, discover.xid);
    assert_eq!(
        request.option(OptionCode::RequestedIpAddress),
        Some(&OFFERED_IP.octets()[..])
    );
    assert_eq!(request.server_id(), Some(SERVER_IP));
    harness
        .server
        .reply(&reply_packet(&request, MessageType::Ack, Some((50, 80, 100))));
    let acked_at = Instant::now();

    // bound exactly once, with the offered address
    let lease = harness.bound.recv().await.unwrap();
    assert_eq!(lease.fixed_address, OFFERED_IP);
    assert_eq!(lease.server_id, SERVER_IP);
    assert_eq!(lease.netmask, Ipv4Addr::new(255, 255, 255, 0));
    assert_eq!(harness.client.lease().unwrap().fixed_address, OFFERED_IP);

    // next contact is the renewal Request at T1 = +50s, still addressed
    // to the granting server, under a fresh transaction id
    let (renewal, at) = harness.server.recv().await;
    let elapsed = at.duration_since(acked_at);
    assert_eq!(renewal.message_type(), Some(MessageType::Request));
    assert!(elapsed >= Duration::from_secs(50), "renewed early: {elapsed:?}");
    assert!(elapsed < Duration::from_secs(51), "renewed late: {elapsed:?}");
    assert_eq!(renewal.server_id(), Some(SERVER_IP));
    assert_ne!(renewal.xid, request.xid);
    harness
        .server
        .reply(&reply_packet(&renewal, MessageType::Ack, Some((50, 80, 100))));

    // default config: the bound callback does not fire again on renewal
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(harness.bound.try_recv().is_err());
    assert!(harness.expired.try_recv().is_err());

    harness.client.stop().await;
}

#[tokio::test(start_paused = true)]
async fn nak_expires_offer_and_restarts_discovery() {
    let mut harness = start_client(ClientConfig::default());

    let (discover, _) = harness.server.recv().await;
    harness
        .server
        .reply(&reply_packet(&discover, MessageType::Offer, None));
    let (request, _) = harness.server.recv().await;
    harness
        .server
        .reply(&reply_packet(&request, MessageType::Nak, None));

    // the previously offered lease surfaces through the expire callback
    let lost = harness.expired.recv().await.unwrap();
    assert_eq!(lost.fixed_address, OFFERED_IP);

    // and the worker restarts discovery rather than crashing
    let (rediscover, _) = harness.server.recv().await;
    assert_eq!(rediscover.message_type(), Some(MessageType::Discover));
    assert_ne!(rediscover.xid, discover.xid);
    harness
        .server
        .reply(&reply_packet(&rediscover, MessageType::Offer, None));
    let (request, _) = harness.server.recv().await;
    harness
        .server
        .reply(&reply_packet(&request, MessageType::Ack, Some((50, 80, 100))));

    let lease = harness.bound.recv().await.unwrap();
    assert_eq!(lease.fixed_address, OFFERED_IP);

    harness.client.stop().await;
}

#[tokio::test(start_paused = true)]
async fn stop_returns_promptly_while_worker_waits() {
    let mut harness = start_client(ClientConfig::default());

    // the worker is now blocked waiting on a server that never answers
    let (discover, _) = harness.server.recv().await;
    assert_eq!(discover.message_type(), Some(MessageType::Discover));

    tokio::time::timeout(Duration::from_secs(1), harness.client.stop())
        .await
        .expect("stop() must return even mid-receive");
}

#[tokio::test(start_paused = true)]
async fn renew_bursts_coalesce_into_one_wake() {
    let mut harness = start_client(ClientConfig::default());
    let acked_at = bind(&mut harness, (500, 800, 1000)).await;
    harness.bound.recv().await.unwrap();

    for _ in 0..5 {
        harness.client.renew();
    }

    let (renewal, at) = harness.server.recv().await;
    assert_eq!(renewal.message_type(), Some(MessageType::Request));
    assert!(at.duration_since(acked_at) < Duration::from_secs(1));
    harness
        .server
        .reply(&reply_packet(&renewal, MessageType::Ack, Some((500, 800, 1000))));

    // one wake, one renewal: ten quiet seconds later nothing else arrived
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(harness.server.no_pending_request());

    harness.client.stop().await;
}

#[tokio::test(start_paused = true)]
async fn rebind_clears_lease_and_forces_discovery() {
    let mut harness = start_client(ClientConfig::default());
    bind(&mut harness, (500, 800, 1000)).await;
    harness.bound.recv().await.unwrap();

    harness.client.rebind();

    let (rediscover, _) = harness.server.recv().await;
    assert_eq!(rediscover.message_type(), Some(MessageType::Discover));
    // an explicit rebind is not a lease loss; no expire callback
    assert!(harness.expired.try_recv().is_err());

    harness
        .server
        .reply(&reply_packet(&rediscover, MessageType::Offer, None));
    let (request, _) = harness.server.recv().await;
    harness
        .server
        .reply(&reply_packet(&request, MessageType::Ack, Some((500, 800, 1000))));

    // a fresh binding fires the bound callback again
    harness.bound.recv().await.unwrap();

    harness.client.stop().await;
}

#[tokio::test(start_paused = true)]
async fn notify_renewals_refires_bound_callback() {
    let config = ClientConfig {
        notify_renewals: true,
        ..Default::default()
    };
    let mut harness = start_client(config);
    bind(&mut harness, (1, 800, 1000)).await;
    harness.bound.recv().await.unwrap();

    let (renewal, _) = harness.server.recv().await;
    harness
        .server
        .reply(&reply_packet(&renewal, MessageType::Ack, Some((500, 800, 1000))));

    let renewed = harness.bound.recv().await.unwrap();
    assert_eq!(renewed.fixed_address, OFFERED_IP);

    harness.client.stop().await;
}

#[tokio::test(start_paused = true)]
async fn ack_without_timers_is_rejected() {
    let mut harness = start_client(ClientConfig::default());

    let (discover, _) = harness.server.recv().await;
    harness
        .server
        .reply(&reply_packet(&discover, MessageType::Offer, None));
    let (request, _) = harness.server.recv().await;
    // an ACK with no T1/T2/lease-time cannot be scheduled
    harness
        .server
        .reply(&reply_packet(&request, MessageType::Ack, None));

    // the client stays lease-less and rediscovers
    let (rediscover, _) = harness.server.recv().await;
    assert_eq!(rediscover.message_type(), Some(MessageType::Discover));
    assert!(harness.bound.try_recv().is_err());
    assert!(harness.client.lease().is_none());

    harness.client.stop().await;
}

#[tokio::test(start_paused = true)]
async fn silent_server_walks_renew_rebind_expire() {
    let mut harness = start_client(ClientConfig::default());
    let acked_at = bind(&mut harness, (50, 80, 100)).await;
    harness.bound.recv().await.unwrap();

    // the server never answers again; the client walks T1 → T2 → expiry.
    // past T2 the requests must stop naming the granting server.
    let mut saw_renewing = false;
    loop {
        tokio::select! {
            biased;
            lost = harness.expired.recv() => {
                let lost = lost.unwrap();
                let elapsed = Instant::now().duration_since(acked_at);
                assert_eq!(lost.fixed_address, OFFERED_IP);
                assert!(elapsed >= Duration::from_secs(100), "expired early: {elapsed:?}");
                assert!(elapsed < Duration::from_secs(115), "expired late: {elapsed:?}");
                break;
            }
            pair = harness.server.recv() => {
                let (request, at) = pair;
                assert_eq!(request.message_type(), Some(MessageType::Request));
                let elapsed = at.duration_since(acked_at);
                match request.server_id() {
                    Some(_) => {
                        assert!(elapsed < Duration::from_secs(80), "renewal form after T2: {elapsed:?}");
                        saw_renewing = true;
                    }
                    None => {
                        assert!(elapsed >= Duration::from_secs(80), "rebinding form before T2: {elapsed:?}");
                        assert!(saw_renewing, "never attempted plain renewal");
                    }
                }
            }
        }
    }

    // after expiry the cycle starts over from discovery
    let (rediscover, _) = harness.server.recv().await;
    assert_eq!(rediscover.message_type(), Some(MessageType::Discover));

    harness.client.stop().await;
}

#[tokio::test(start_paused = true)]
async fn inverted_timers_fire_immediately_instead_of_hanging() {
    let mut harness = start_client(ClientConfig::default());
    // T1 and T2 beyond the lease lifetime: expiry is the earliest deadline
    bind(&mut harness, (1000, 900, 2)).await;
    harness.bound.recv().await.unwrap();

    let lost = harness.expired.recv().await.unwrap();
    assert_eq!(lost.fixed_address, OFFERED_IP);

    let (rediscover, _) = harness.server.recv().await;
    assert_eq!(rediscover.message_type(), Some(MessageType::Discover));

    harness.client.stop().await;
}

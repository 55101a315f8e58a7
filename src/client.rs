//! The client engine: one background worker driving the lease state
//! machine, and the thread-safe control surface around it.
//!
//! The worker owns all protocol state — socket, transaction id, the lease
//! itself. Callers never touch any of that; [`Client::renew`],
//! [`Client::rebind`], and [`Client::stop`] only signal the worker, from
//! any thread, at any time.
//!
//! The wake signal is a [`Notify`] with at most one outstanding request:
//! a burst of `renew()` calls coalesces into a single wake-up, and a
//! worker that is busy mid-transaction simply never sees the burst.
//! Shutdown is a separate watch channel observed at every suspension
//! point, so `stop()` returns promptly even while the worker is blocked
//! waiting for a server that will never answer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};

use crate::channel::Transaction;
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::lease::{Deadline, Lease};
use crate::options::{DEFAULT_PARAMETER_REQUEST_LIST, DhcpOption, MessageType};
use crate::socket::{Interface, LinkProvider, PacketSocket};

/// A caller-supplied lease event handler.
///
/// Callbacks run synchronously on the worker; blocking inside one stalls
/// the state machine.
pub type Callback = Box<dyn Fn(&Lease) + Send + Sync>;

#[derive(Default)]
struct Callbacks {
    on_bound: Option<Callback>,
    on_expire: Option<Callback>,
}

/// State visible to both the worker and the control surface.
struct Shared {
    /// The current lease. Written only by the worker (and cleared via the
    /// `drop_lease` handshake); reads are snapshots.
    lease: Mutex<Option<Lease>>,
    /// Coalescing wake signal for renew/rebind/stop.
    wake: Notify,
    /// Set by `rebind()`; the worker clears the lease at its next cycle.
    drop_lease: AtomicBool,
}

/// A DHCP client for one network interface.
///
/// Create it, register callbacks, then [`start`](Self::start) it; a single
/// background worker performs the discover→bind cycle and keeps the lease
/// renewed until [`stop`](Self::stop).
///
/// ```no_run
/// use leasewire::{Client, ClientConfig, Interface};
///
/// # async fn example() -> leasewire::Result<()> {
/// let interface = Interface::by_name("eth0")?;
/// let client = Client::new(interface, ClientConfig::default());
/// client.on_bound(|lease| println!("bound: {}", lease.fixed_address));
/// client.start();
/// // ... later
/// client.stop().await;
/// # Ok(())
/// # }
/// ```
pub struct Client<P: LinkProvider = PacketSocket> {
    interface: Interface,
    config: ClientConfig,
    provider: Arc<P>,
    shared: Arc<Shared>,
    callbacks: Mutex<Callbacks>,
    shutdown: watch::Sender<bool>,
    worker: Mutex<Option<JoinHandle<()>>>,
    started: AtomicBool,
}

impl Client {
    /// Creates a client that uses `AF_PACKET` raw sockets on `interface`.
    pub fn new(interface: Interface, config: ClientConfig) -> Self {
        let provider = PacketSocket::new(interface.clone());
        Self::with_provider(interface, config, provider)
    }
}

impl<P: LinkProvider> Client<P> {
    /// Creates a client with a custom transport, e.g. an in-memory link
    /// for tests.
    pub fn with_provider(interface: Interface, config: ClientConfig, provider: P) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            interface,
            config,
            provider: Arc::new(provider),
            shared: Arc::new(Shared {
                lease: Mutex::new(None),
                wake: Notify::new(),
                drop_lease: AtomicBool::new(false),
            }),
            callbacks: Mutex::new(Callbacks::default()),
            shutdown,
            worker: Mutex::new(None),
            started: AtomicBool::new(false),
        }
    }

    /// Registers the callback invoked when a lease is first bound (and,
    /// with [`ClientConfig::notify_renewals`], on every renewal).
    ///
    /// Must be registered before [`start`](Self::start); later
    /// registrations are never seen by the worker.
    pub fn on_bound(&self, callback: impl Fn(&Lease) + Send + Sync + 'static) {
        self.callbacks.lock().unwrap().on_bound = Some(Box::new(callback));
    }

    /// Registers the callback invoked when a held lease is dropped — on
    /// NAK or when a deadline expires it.
    ///
    /// Must be registered before [`start`](Self::start).
    pub fn on_expire(&self, callback: impl Fn(&Lease) + Send + Sync + 'static) {
        self.callbacks.lock().unwrap().on_expire = Some(Box::new(callback));
    }

    /// The interface this client manages.
    pub fn interface(&self) -> &Interface {
        &self.interface
    }

    /// Spawns the background worker.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if the client was already started — that is caller misuse,
    /// not a runtime condition: exactly one worker may ever exist per
    /// client instance.
    pub fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            panic!("dhcp client for {} already started", self.interface.name);
        }

        let mut parameter_request_list = DEFAULT_PARAMETER_REQUEST_LIST.to_vec();
        parameter_request_list.extend_from_slice(&self.config.extra_request_params);

        let worker = Worker {
            interface: self.interface.clone(),
            provider: Arc::clone(&self.provider),
            shared: Arc::clone(&self.shared),
            callbacks: std::mem::take(&mut *self.callbacks.lock().unwrap()),
            shutdown: self.shutdown.subscribe(),
            hostname: self.config.hostname.clone(),
            extra_options: self.config.extra_options.clone(),
            parameter_request_list,
            response_timeout: self.config.response_timeout(),
            retry_delay: self.config.retry_delay(),
            notify_renewals: self.config.notify_renewals,
        };
        *self.worker.lock().unwrap() = Some(tokio::spawn(worker.run()));
    }

    /// Stops the worker and waits for it to exit.
    ///
    /// Safe to call from any task; idempotent once stopped. Any in-flight
    /// exchange is cancelled and its socket closed.
    pub async fn stop(&self) {
        let handle = self.worker.lock().unwrap().take();
        let Some(handle) = handle else { return };

        info!(interface = %self.interface.name, "shutting down dhcp client");
        let _ = self.shutdown.send(true);
        self.shared.wake.notify_one();
        let _ = handle.await;
    }

    /// Requests an out-of-cycle renewal.
    ///
    /// Send-or-drop: a waiting worker wakes up once, any further calls
    /// before it wakes do nothing, and a worker that is already
    /// mid-transaction never sees the signal at all.
    pub fn renew(&self) {
        self.shared.wake.notify_waiters();
    }

    /// Forgets the current lease and triggers acquisition of a new one
    /// through full discovery.
    ///
    /// The clear itself happens on the worker at its next cycle; unlike
    /// [`renew`](Self::renew) the signal is held (one slot, overwriting)
    /// so a rebind issued mid-transaction is not lost.
    pub fn rebind(&self) {
        self.shared.drop_lease.store(true, Ordering::SeqCst);
        self.shared.wake.notify_one();
    }

    /// A snapshot of the currently held lease, if any.
    pub fn lease(&self) -> Option<Lease> {
        self.shared.lease.lock().unwrap().clone()
    }
}

/// What ended a timer wait.
enum Waited {
    Shutdown,
    Wake,
    Deadline(Deadline),
}

struct Worker<P: LinkProvider> {
    interface: Interface,
    provider: Arc<P>,
    shared: Arc<Shared>,
    callbacks: Callbacks,
    shutdown: watch::Receiver<bool>,
    hostname: String,
    extra_options: Vec<DhcpOption>,
    parameter_request_list: Vec<u8>,
    response_timeout: Duration,
    retry_delay: Duration,
    notify_renewals: bool,
}

impl<P: LinkProvider> Worker<P> {
    async fn run(mut self) {
        debug!(interface = %self.interface.name, "dhcp worker started");
        while !*self.shutdown.borrow() {
            self.run_once().await;
        }
        debug!(interface = %self.interface.name, "dhcp worker stopped");
    }

    /// One cycle: perform the exchange the current state calls for, then
    /// wait for whatever comes first — a deadline, an external signal, or
    /// the retry delay after a fault.
    async fn run_once(&mut self) {
        // an external rebind() forgets the lease so this cycle rediscovers
        if self.shared.drop_lease.swap(false, Ordering::SeqCst) {
            self.store(None);
        }

        // a lease that ran out while we were stuck retrying is gone too
        if self
            .current_lease()
            .is_some_and(|lease| lease.expired(Instant::now()))
        {
            info!(interface = %self.interface.name, "lease expired");
            self.expire();
        }

        let held = self.current_lease();
        let mut shutdown = self.shutdown.clone();
        let outcome = tokio::select! {
            biased;
            _ = shutdown.changed() => return,
            outcome = self.transact(held) => outcome,
        };

        match outcome {
            Ok(()) => self.wait_for_deadline().await,
            Err(error) => {
                warn!(interface = %self.interface.name, "dhcp exchange failed: {error}");
                self.wait_for_retry().await;
            }
        }
    }

    /// Runs one exchange over a freshly opened link. Dropping the
    /// transaction — on success, fault, or cancellation — closes the
    /// socket.
    async fn transact(&mut self, held: Option<Lease>) -> Result<()> {
        let link = self.provider.open()?;
        let mut transaction =
            Transaction::new(link, self.interface.hw_addr, self.response_timeout);

        match held {
            None => self.acquire(&mut transaction).await,
            Some(lease) => {
                debug!(
                    interface = %self.interface.name,
                    address = %lease.fixed_address,
                    xid = transaction.xid(),
                    "refreshing lease"
                );
                self.request_and_adopt(&mut transaction, &lease, false).await
            }
        }
    }

    /// The discover→request exchange for a fresh lease.
    async fn acquire(&mut self, transaction: &mut Transaction<P::Link>) -> Result<()> {
        debug!(
            interface = %self.interface.name,
            xid = transaction.xid(),
            "broadcasting DISCOVER"
        );
        transaction.send(self.discover_options()).await?;
        let (_, offer) = transaction.recv_matching(&[MessageType::Offer]).await?;
        debug!(
            address = %offer.fixed_address,
            server = %offer.server_id,
            "received OFFER"
        );

        // hold the offer provisionally; a NAK on the follow-up request
        // must surface it through the expire callback
        self.store(Some(offer.clone()));
        self.request_and_adopt(transaction, &offer, true).await
    }

    /// Sends a Request for `current` and adopts the resulting ACK.
    async fn request_and_adopt(
        &mut self,
        transaction: &mut Transaction<P::Link>,
        current: &Lease,
        initial_binding: bool,
    ) -> Result<()> {
        transaction.send(self.request_options(current)).await?;
        let (message_type, lease) = transaction
            .recv_matching(&[MessageType::Ack, MessageType::Nak])
            .await?;

        if message_type == MessageType::Nak {
            warn!(interface = %self.interface.name, "server refused the request (NAK)");
            self.expire();
            return Err(Error::Nak);
        }

        if !lease.has_timers() {
            // an ACK we cannot schedule; drop everything and rediscover
            self.store(None);
            return Err(Error::MissingLeaseTimers);
        }

        let action = if initial_binding { "bound" } else { "renewed" };
        info!(
            interface = %self.interface.name,
            address = %lease.fixed_address,
            prefix = lease.prefix_len(),
            server = %lease.server_id,
            "lease {action}"
        );

        self.store(Some(lease.clone()));
        if initial_binding || self.notify_renewals {
            if let Some(callback) = &self.callbacks.on_bound {
                callback(&lease);
            }
        }
        Ok(())
    }

    /// Sleeps until the earliest lease deadline, an external wake, or
    /// shutdown, and performs the resulting transition.
    async fn wait_for_deadline(&mut self) {
        let Some((at, kind)) = self
            .current_lease()
            .and_then(|lease| lease.next_deadline())
        else {
            return;
        };

        let mut shutdown = self.shutdown.clone();
        let waited = tokio::select! {
            biased;
            _ = shutdown.changed() => Waited::Shutdown,
            _ = self.shared.wake.notified() => Waited::Wake,
            _ = time::sleep_until(at) => Waited::Deadline(kind),
        };

        match waited {
            Waited::Shutdown => {}
            Waited::Wake => {
                debug!(interface = %self.interface.name, "woken by external request");
            }
            Waited::Deadline(Deadline::Renew) => {
                debug!(interface = %self.interface.name, "renewal time reached");
            }
            Waited::Deadline(Deadline::Rebind) => {
                debug!(interface = %self.interface.name, "rebinding time reached");
            }
            Waited::Deadline(Deadline::Expire) => {
                info!(interface = %self.interface.name, "lease expired");
                self.expire();
            }
        }
    }

    /// Pauses after a fault, still interruptible by wake or shutdown.
    async fn wait_for_retry(&mut self) {
        let mut shutdown = self.shutdown.clone();
        tokio::select! {
            biased;
            _ = shutdown.changed() => {}
            _ = self.shared.wake.notified() => {}
            _ = time::sleep(self.retry_delay) => {}
        }
    }

    fn discover_options(&self) -> Vec<DhcpOption> {
        let mut options = vec![
            DhcpOption::message_type(MessageType::Discover),
            DhcpOption::parameter_request_list(&self.parameter_request_list),
        ];
        if !self.hostname.is_empty() {
            options.push(DhcpOption::hostname(&self.hostname));
        }
        options.extend(self.extra_options.iter().cloned());
        options
    }

    /// Options for a Request — initial, renewing, or rebinding.
    ///
    /// Past T2 the server identifier is omitted: the request is no longer
    /// addressed to the granting server, and any authoritative server may
    /// answer it.
    fn request_options(&self, lease: &Lease) -> Vec<DhcpOption> {
        let mut options = vec![
            DhcpOption::message_type(MessageType::Request),
            DhcpOption::parameter_request_list(&self.parameter_request_list),
        ];
        if !self.hostname.is_empty() {
            options.push(DhcpOption::hostname(&self.hostname));
        }
        options.push(DhcpOption::requested_ip(lease.fixed_address));
        if !lease.rebinding(Instant::now()) {
            options.push(DhcpOption::server_id(lease.server_id));
        }
        options.extend(self.extra_options.iter().cloned());
        options
    }

    fn current_lease(&self) -> Option<Lease> {
        self.shared.lease.lock().unwrap().clone()
    }

    fn store(&self, lease: Option<Lease>) {
        *self.shared.lease.lock().unwrap() = lease;
    }

    /// Drops the held lease, surfacing it through the expire callback.
    fn expire(&self) {
        let dropped = self.shared.lease.lock().unwrap().take();
        if let Some(lease) = dropped {
            if let Some(callback) = &self.callbacks.on_expire {
                callback(&lease);
            }
        }
    }
}

//! Network singleton coordinator
//!
//! Guarantees (advisorily) that only one conductor transmits per broadcast
//! domain. On [`claim`](Coordinator::claim) the coordinator broadcasts an
//! `instance_check` and listens for a detection window. An `instance_response`
//! from another address means a peer is already active; otherwise this
//! instance becomes active and keeps two tasks running:
//!
//! - **heartbeat**: broadcasts `heartbeat` every interval
//! - **listener**: answers `instance_check` with a unicast `instance_response`
//!   and logs heartbeats from peers
//!
//! ```text
//! Idle ──claim──► Checking ──window elapsed──► Active ──stop──► Idle
//!   ▲                 │
//!   └── bind error    └──instance_response──► Conflicted
//! ```
//!
//! A peer heartbeat seen while active is only logged; an active instance never
//! gives up its claim mid-transmission. Two instances starting inside each
//! other's detection window can both become active.
//!
//! Datagrams are attributed by source IP only, so two instances on the same
//! host share an identity and never see each other.

mod identity;
mod message;

pub use identity::{detect_local_ip, instance_id};
pub use message::{MAX_DATAGRAM, PeerMessage, PeerMessageKind, unix_timestamp};

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::Stream;
use serde::{Deserialize, Serialize};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::time::{Instant, sleep, timeout_at};
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::{ConductorError, Result};

/// Pause after a receive error during the detection window
const CHECK_ERROR_PAUSE: Duration = Duration::from_millis(50);

/// Called with the conflicting peer's instance id
pub type ConflictCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Coordinator lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoordinatorState {
    Idle,
    Checking,
    Active,
    Conflicted,
}

/// Result of a successful claim attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// No peer answered; this instance owns the network
    Active,
    /// A peer answered the check
    Conflicted { peer_id: String, peer_addr: SocketAddr },
}

/// Coordinator settings
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinatorConfig {
    /// Port shared by every instance
    pub port: u16,
    /// How long to wait for an `instance_response`
    pub detection_window: Duration,
    pub heartbeat_interval: Duration,
    /// Wait after a failed heartbeat before retrying
    pub heartbeat_error_backoff: Duration,
    /// Wait after a listener receive error
    pub listener_error_backoff: Duration,
    /// Local address to bind; unspecified binds every interface
    pub bind_ip: IpAddr,
    /// Destination for checks and heartbeats
    pub broadcast_ip: IpAddr,
    /// Address used to recognise our own datagrams; detected when `None`
    pub local_ip: Option<IpAddr>,
    /// Service ports folded into the instance id
    pub backend_port: u16,
    pub frontend_port: u16,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            port: 9001,
            detection_window: Duration::from_secs(5),
            heartbeat_interval: Duration::from_secs(2),
            heartbeat_error_backoff: Duration::from_secs(5),
            listener_error_backoff: Duration::from_secs(1),
            bind_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            broadcast_ip: IpAddr::V4(Ipv4Addr::BROADCAST),
            local_ip: None,
            backend_port: 9000,
            frontend_port: 5173,
        }
    }
}

impl CoordinatorConfig {
    fn broadcast_addr(&self) -> SocketAddr {
        SocketAddr::new(self.broadcast_ip, self.port)
    }

    fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_ip, self.port)
    }
}

/// Network-wide singleton guard
pub struct Coordinator {
    config: CoordinatorConfig,
    local_ip: IpAddr,
    instance_id: String,
    state: watch::Sender<CoordinatorState>,
    active: Arc<AtomicBool>,
    cancel: Mutex<Option<CancellationToken>>,
    socket: Mutex<Option<Arc<UdpSocket>>>,
    on_conflict: Mutex<Option<ConflictCallback>>,
}

impl Coordinator {
    /// Build an idle coordinator and resolve its identity
    ///
    /// The local address is `config.local_ip`, else a specific `bind_ip`,
    /// else the detected outbound interface address.
    pub async fn new(config: CoordinatorConfig) -> Self {
        let local_ip = match (config.local_ip, config.bind_ip) {
            (Some(ip), _) => ip,
            (None, ip) if !ip.is_unspecified() => ip,
            (None, _) => detect_local_ip().await,
        };
        let instance_id = instance_id(local_ip, config.backend_port, config.frontend_port);
        let (state, _) = watch::channel(CoordinatorState::Idle);

        Self {
            config,
            local_ip,
            instance_id,
            state,
            active: Arc::new(AtomicBool::new(false)),
            cancel: Mutex::new(None),
            socket: Mutex::new(None),
            on_conflict: Mutex::new(None),
        }
    }

    /// Register the conflict callback (builder form)
    pub fn with_conflict_callback<F>(self, callback: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.set_conflict_callback(callback);
        self
    }

    /// Register the conflict callback, replacing any previous one
    pub fn set_conflict_callback<F>(&self, callback: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        *self.on_conflict.lock().unwrap_or_else(|e| e.into_inner()) = Some(Arc::new(callback));
    }

    /// Claim the network, reporting the outcome as a bool
    ///
    /// `false` means either a conflict or a socket failure; in both cases the
    /// caller must not start transmitting.
    pub async fn start(&self) -> bool {
        match self.claim().await {
            Ok(ClaimOutcome::Active) => true,
            Ok(ClaimOutcome::Conflicted { .. }) => false,
            Err(e) => {
                error!("Failed to start network singleton: {}", e);
                false
            }
        }
    }

    /// Run the check handshake and, if uncontested, become active
    ///
    /// Calling this while already active returns `Active` again.
    ///
    /// # Errors
    ///
    /// [`ConductorError::Network`] when the socket cannot be bound or the
    /// check cannot be broadcast. The coordinator returns to `Idle`.
    pub async fn claim(&self) -> Result<ClaimOutcome> {
        if self.is_active() {
            return Ok(ClaimOutcome::Active);
        }

        let socket = Arc::new(self.bind().await?);
        self.state.send_replace(CoordinatorState::Checking);

        let peer = match self.check_for_existing_instances(&socket).await {
            Ok(peer) => peer,
            Err(e) => {
                self.state.send_replace(CoordinatorState::Idle);
                return Err(e);
            }
        };

        if let Some((peer_id, peer_addr)) = peer {
            error!("Found existing instance: {} at {}", peer_id, peer_addr.ip());
            self.state.send_replace(CoordinatorState::Conflicted);
            let callback = self.on_conflict.lock().unwrap_or_else(|e| e.into_inner()).clone();
            if let Some(callback) = callback {
                callback(&peer_id);
            }
            return Ok(ClaimOutcome::Conflicted { peer_id, peer_addr });
        }

        self.activate(socket);
        info!("Network singleton started - this instance: {}", self.instance_id);
        Ok(ClaimOutcome::Active)
    }

    /// Bind the shared coordination port
    ///
    /// `SO_REUSEADDR` lets every instance on a host bind the same port, so a
    /// second local instance coexists instead of failing to bind.
    async fn bind(&self) -> Result<UdpSocket> {
        let addr = self.config.bind_addr();
        let socket = reusable_udp_socket(addr)
            .map_err(|e| ConductorError::network(format!("bind {}", addr), e))?;
        debug!("Singleton socket bound on {}", addr);
        Ok(socket)
    }

    /// Broadcast a check and wait out the detection window
    ///
    /// Returns the first peer that answered, if any.
    async fn check_for_existing_instances(
        &self,
        socket: &UdpSocket,
    ) -> Result<Option<(String, SocketAddr)>> {
        info!("Checking for existing instances...");

        let check = PeerMessage::instance_check(&self.instance_id).encode()?;
        let target = self.config.broadcast_addr();
        socket
            .send_to(&check, target)
            .await
            .map_err(|e| ConductorError::network(format!("broadcast instance check to {}", target), e))?;

        let deadline = Instant::now() + self.config.detection_window;
        let mut buf = [0u8; MAX_DATAGRAM];

        loop {
            let (len, src) = match timeout_at(deadline, socket.recv_from(&mut buf)).await {
                Err(_) => break,
                Ok(Ok(received)) => received,
                Ok(Err(e)) => {
                    warn!("Error checking for instances: {}", e);
                    sleep(CHECK_ERROR_PAUSE).await;
                    continue;
                }
            };

            if src.ip() == self.local_ip {
                continue;
            }

            match PeerMessage::decode(&buf[..len]) {
                Ok(message) if message.kind == PeerMessageKind::InstanceResponse => {
                    return Ok(Some((message.instance_id, src)));
                }
                Ok(message) => trace!("Ignoring {:?} from {} during check", message.kind, src),
                Err(e) => debug!("Ignoring malformed datagram from {}: {}", src, e),
            }
        }

        info!("No existing instances found");
        Ok(None)
    }

    fn activate(&self, socket: Arc<UdpSocket>) {
        let cancel = CancellationToken::new();
        self.active.store(true, Ordering::Release);

        tokio::spawn(heartbeat_loop(
            Arc::clone(&socket),
            self.config.clone(),
            self.instance_id.clone(),
            Arc::clone(&self.active),
            cancel.clone(),
        ));
        tokio::spawn(listener_loop(
            Arc::clone(&socket),
            self.config.clone(),
            self.local_ip,
            self.instance_id.clone(),
            Arc::clone(&self.active),
            cancel.clone(),
        ));

        *self.socket.lock().unwrap_or_else(|e| e.into_inner()) = Some(socket);
        *self.cancel.lock().unwrap_or_else(|e| e.into_inner()) = Some(cancel);
        self.state.send_replace(CoordinatorState::Active);
    }

    /// Give up the claim
    ///
    /// Both tasks observe the cancellation and exit on their own, releasing the
    /// socket with them.
    pub fn stop(&self) {
        let was_active = self.active.swap(false, Ordering::AcqRel);
        if let Some(cancel) = self.cancel.lock().unwrap_or_else(|e| e.into_inner()).take() {
            cancel.cancel();
        }
        self.socket.lock().unwrap_or_else(|e| e.into_inner()).take();
        self.state.send_replace(CoordinatorState::Idle);

        if was_active {
            info!("Network singleton stopped");
        }
    }

    pub fn state(&self) -> CoordinatorState {
        *self.state.borrow()
    }

    /// Stream of state transitions, starting with the current state
    pub fn state_updates(&self) -> impl Stream<Item = CoordinatorState> + 'static {
        WatchStream::new(self.state.subscribe())
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn local_ip(&self) -> IpAddr {
        self.local_ip
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        debug!("Dropping coordinator");
        self.stop();
    }
}

/// Broadcast-capable UDP socket bound with `SO_REUSEADDR`, registered with tokio
fn reusable_udp_socket(addr: SocketAddr) -> std::io::Result<UdpSocket> {
    let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.set_broadcast(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    UdpSocket::from_std(socket.into())
}

/// Broadcast presence until cancelled
async fn heartbeat_loop(
    socket: Arc<UdpSocket>,
    config: CoordinatorConfig,
    instance_id: String,
    active: Arc<AtomicBool>,
    cancel: CancellationToken,
) {
    let target = config.broadcast_addr();
    debug!("Heartbeat task started ({:?} to {})", config.heartbeat_interval, target);

    while active.load(Ordering::Acquire) {
        let sent = match PeerMessage::heartbeat(&instance_id).encode() {
            Ok(datagram) => socket
                .send_to(&datagram, target)
                .await
                .map(|_| ())
                .map_err(|e| ConductorError::network("send heartbeat", e)),
            Err(e) => Err(e),
        };

        let pause = match sent {
            Ok(()) => {
                trace!("Heartbeat sent");
                config.heartbeat_interval
            }
            Err(e) => {
                warn!("Error sending heartbeat: {}", e);
                config.heartbeat_error_backoff
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = sleep(pause) => {}
        }
    }

    debug!("Heartbeat task ended");
}

/// Answer checks and log peers until cancelled
async fn listener_loop(
    socket: Arc<UdpSocket>,
    config: CoordinatorConfig,
    local_ip: IpAddr,
    instance_id: String,
    active: Arc<AtomicBool>,
    cancel: CancellationToken,
) {
    debug!("Listener task started");
    let mut buf = [0u8; MAX_DATAGRAM];

    while active.load(Ordering::Acquire) {
        let received = tokio::select! {
            _ = cancel.cancelled() => break,
            received = socket.recv_from(&mut buf) => received,
        };

        let (len, src) = match received {
            Ok(received) => received,
            Err(e) => {
                warn!("Error in listener loop: {}", e);
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = sleep(config.listener_error_backoff) => continue,
                }
            }
        };

        if src.ip() == local_ip {
            continue;
        }

        let message = match PeerMessage::decode(&buf[..len]) {
            Ok(message) => message,
            Err(e) => {
                debug!("Ignoring malformed datagram from {}: {}", src, e);
                continue;
            }
        };

        match message.kind {
            PeerMessageKind::InstanceCheck => {
                debug!("Answering instance check from {} ({})", message.instance_id, src);
                let reply = match PeerMessage::instance_response(&instance_id).encode() {
                    Ok(reply) => reply,
                    Err(e) => {
                        error!("Failed to encode instance response: {}", e);
                        continue;
                    }
                };
                if let Err(e) = socket.send_to(&reply, src).await {
                    warn!("Failed to answer instance check from {}: {}", src, e);
                }
            }
            PeerMessageKind::Heartbeat => {
                warn!("Detected another instance: {} at {}", message.instance_id, src.ip());
            }
            PeerMessageKind::InstanceResponse => {
                trace!("Ignoring late instance response from {}", src);
            }
        }
    }

    debug!("Listener task ended");
}

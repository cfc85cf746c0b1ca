use std::{fmt, io, net::SocketAddr, time::Duration};

use quanta::{Clock, Instant};
use tracing::{debug, error, trace};

use crate::{
    telemetry::Telemetry,
    transport::{SendOutcome, Transport, TransportEvent},
};

/// Connection state of a [`PushClient`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection, and none will be attempted until the client is started.
    Disconnected,

    /// A connection attempt is in flight.
    Connecting,

    /// Connected, and lines are pushed on every flush.
    Connected,

    /// The last connection failed, and another attempt is made once the backoff elapses.
    ReconnectPending,
}

impl ConnectionState {
    /// Returns `true` if the client holds a connection, established or not.
    pub const fn is_running(self) -> bool {
        matches!(self, ConnectionState::Connecting | ConnectionState::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::ReconnectPending => "reconnect pending",
        };
        f.write_str(s)
    }
}

/// When to reconnect after a connection failure.
#[derive(Clone, Debug)]
pub struct ReconnectPolicy {
    enabled: bool,
    backoff: Duration,
    last_attempt: Option<Instant>,
}

impl ReconnectPolicy {
    /// Creates a new `ReconnectPolicy` that waits `backoff` between attempts.
    ///
    /// A zero backoff disables reconnecting entirely.
    pub fn new(backoff: Duration) -> Self {
        Self { enabled: false, backoff, last_attempt: None }
    }

    /// Returns `true` if a failure will schedule a reconnect.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Returns the backoff between attempts.
    pub fn backoff(&self) -> Duration {
        self.backoff
    }

    /// Returns when the current backoff period started, if one has.
    pub fn last_attempt(&self) -> Option<Instant> {
        self.last_attempt
    }

    fn set_backoff(&mut self, backoff: Duration) {
        self.backoff = backoff;
        if backoff.is_zero() {
            self.enabled = false;
        }
    }

    fn enable(&mut self) {
        self.enabled = !self.backoff.is_zero();
    }

    fn disable(&mut self) {
        self.enabled = false;
        self.last_attempt = None;
    }

    fn is_due(&self, now: Instant) -> bool {
        self.enabled
            && self
                .last_attempt
                .map_or(true, |last| now.saturating_duration_since(last) >= self.backoff)
    }
}

/// A change in the push client's connection.
#[derive(Debug)]
pub enum ClientEvent {
    /// The connection was established.
    Connected,

    /// The connection failed or was lost.
    Disconnected {
        /// The underlying error.
        error: io::Error,

        /// Whether a reconnect has been scheduled.
        reconnect_pending: bool,
    },
}

/// Owns the outbound connection to the collector.
///
/// The client is a state machine over [`ConnectionState`]. It never retries inline: every failure, whether connecting
/// or sending, goes through [`ConnectionState::ReconnectPending`] (or straight to
/// [`ConnectionState::Disconnected`] when reconnecting is disabled), and the next attempt waits for the backoff to
/// elapse.
pub struct PushClient<T> {
    remote: Option<SocketAddr>,
    state: ConnectionState,
    policy: ReconnectPolicy,
    transport: T,
    clock: Clock,
    telemetry: Telemetry,
}

impl<T> PushClient<T>
where
    T: Transport,
{
    /// Creates a new, disconnected `PushClient`.
    ///
    /// If `remote` is `None`, the client can never be started.
    pub fn new(
        remote: Option<SocketAddr>,
        reconnect: Duration,
        transport: T,
        clock: Clock,
    ) -> Self {
        Self {
            remote,
            state: ConnectionState::Disconnected,
            policy: ReconnectPolicy::new(reconnect),
            transport,
            clock,
            telemetry: Telemetry::new(),
        }
    }

    /// Returns the current connection state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Returns `true` if the client holds a connection, established or not.
    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    /// Returns the address the client connects to.
    pub fn remote(&self) -> Option<SocketAddr> {
        self.remote
    }

    /// Returns the reconnect policy.
    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    /// Returns a reference to the transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Returns a mutable reference to the transport.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Changes the reconnect backoff.
    ///
    /// A zero backoff disables reconnecting, cancelling any pending reconnect. A non-zero backoff applies to the next
    /// failure of a running client, even if reconnecting was disabled when it started.
    pub fn set_reconnect_interval(&mut self, reconnect: Duration) {
        self.policy.set_backoff(reconnect);
        if self.is_running() {
            self.policy.enable();
        }
        if !self.policy.is_enabled() && self.state == ConnectionState::ReconnectPending {
            self.state = ConnectionState::Disconnected;
        }
    }

    /// Tears down any connection and points the client at a new address.
    pub fn retarget(&mut self, remote: Option<SocketAddr>) {
        self.disconnect();
        self.remote = remote;
    }

    /// Starts connecting.
    ///
    /// Only meaningful from [`ConnectionState::Disconnected`] or [`ConnectionState::ReconnectPending`]; a client that
    /// is already running is left alone. If the attempt fails before it even starts, the failure is returned
    /// immediately and handled exactly like an asynchronous one.
    pub fn connect(&mut self) -> Option<ClientEvent> {
        if self.is_running() {
            return None;
        }

        let Some(remote) = self.remote else {
            debug!("No remote address configured, not connecting.");
            return None;
        };

        debug!(remote_addr = %remote, "Connecting to Telegraf.");
        self.policy.enable();
        self.state = ConnectionState::Connecting;
        self.telemetry.track_connect_attempt();

        match self.transport.connect(remote) {
            Ok(()) => None,
            Err(e) => Some(self.fail(e)),
        }
    }

    /// Drops the connection and cancels any pending reconnect.
    ///
    /// Returns `true` if the client was running.
    pub fn disconnect(&mut self) -> bool {
        let was_running = self.is_running();

        self.policy.disable();
        self.transport.close();
        self.state = ConnectionState::Disconnected;

        was_running
    }

    /// Drives the connection, returning any change in its status.
    pub fn poll(&mut self) -> Option<ClientEvent> {
        if !self.is_running() {
            return None;
        }

        match self.transport.poll()? {
            TransportEvent::Connected => {
                if self.state == ConnectionState::Connecting {
                    debug!(remote_addr = ?self.remote, "Connected to Telegraf.");
                    self.state = ConnectionState::Connected;
                    Some(ClientEvent::Connected)
                } else {
                    None
                }
            }
            TransportEvent::Failed(e) => Some(self.fail(e)),
        }
    }

    /// Returns `true` if a reconnect is pending and its backoff has elapsed.
    pub fn reconnect_due(&self) -> bool {
        self.state == ConnectionState::ReconnectPending && self.policy.is_due(self.clock.now())
    }

    /// Makes the pending reconnect attempt, restarting the backoff period.
    pub fn reconnect(&mut self) -> Option<ClientEvent> {
        self.policy.last_attempt = Some(self.clock.now());
        self.state = ConnectionState::Disconnected;
        self.connect()
    }

    /// Sends a single encoded line.
    ///
    /// Lines sent while not connected are dropped. A write failure drops the connection and is returned.
    pub fn send(&mut self, payload: &[u8]) -> Option<ClientEvent> {
        if self.state != ConnectionState::Connected {
            trace!(state = %self.state, "Not connected, dropping line.");
            self.telemetry.track_line_dropped();
            return None;
        }

        match self.transport.send(payload) {
            Ok(SendOutcome::Queued) => {
                self.telemetry.track_line_sent(payload.len());
                None
            }
            Ok(SendOutcome::Dropped) => {
                self.telemetry.track_line_dropped();
                None
            }
            Err(e) => {
                self.telemetry.track_line_dropped();
                Some(self.fail(e))
            }
        }
    }

    fn fail(&mut self, error: io::Error) -> ClientEvent {
        self.transport.close();
        self.telemetry.track_connection_error();

        let reconnect_pending = self.policy.is_enabled();
        if reconnect_pending {
            self.policy.last_attempt = Some(self.clock.now());
            self.state = ConnectionState::ReconnectPending;
        } else {
            self.state = ConnectionState::Disconnected;
        }

        error!(
            error = %error,
            remote_addr = ?self.remote,
            reconnect_pending,
            "Telegraf connection failed."
        );
        ClientEvent::Disconnected { error, reconnect_pending }
    }
}

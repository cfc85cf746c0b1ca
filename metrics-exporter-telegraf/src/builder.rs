use std::{
    net::{Ipv4Addr, SocketAddr},
    num::NonZeroU16,
    time::Duration,
};

use quanta::Clock;

use crate::{
    exporter::TelegrafExporter,
    host::{NoticeSink, ServerCounters},
    transport::{TcpTransport, Transport},
};

const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_secs(60);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_MEASUREMENT: &str = "ircd";

/// Exporter configuration.
///
/// Produced by [`TelegrafBuilder`], and immutable once applied.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TelegrafConfig {
    port: Option<NonZeroU16>,
    silent: bool,
    reconnect_interval: Duration,
    connect_timeout: Duration,
    measurement: String,
}

impl TelegrafConfig {
    /// Returns the collector port, or `None` if pushing is disabled.
    pub fn port(&self) -> Option<u16> {
        self.port.map(NonZeroU16::get)
    }

    /// Returns the collector address, or `None` if pushing is disabled.
    ///
    /// The collector is always on the loopback interface.
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.port.map(|port| SocketAddr::from((Ipv4Addr::LOCALHOST, port.get())))
    }

    /// Returns `true` if operator notices are suppressed.
    pub fn silent(&self) -> bool {
        self.silent
    }

    /// Returns the wait between reconnect attempts. Zero means reconnecting is disabled.
    pub fn reconnect_interval(&self) -> Duration {
        self.reconnect_interval
    }

    /// Returns how long a connection attempt may stay pending.
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Returns the measurement name of pushed records.
    pub fn measurement(&self) -> &str {
        &self.measurement
    }
}

impl Default for TelegrafConfig {
    fn default() -> Self {
        TelegrafConfig {
            port: None,
            silent: false,
            reconnect_interval: DEFAULT_RECONNECT_INTERVAL,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            measurement: DEFAULT_MEASUREMENT.to_string(),
        }
    }
}

/// Builder for a Telegraf exporter.
#[derive(Clone, Debug, Default)]
pub struct TelegrafBuilder {
    config: TelegrafConfig,
}

impl TelegrafBuilder {
    /// Creates a new `TelegrafBuilder` with the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the port Telegraf is listening on.
    ///
    /// Anything outside of 1 to 65535 disables the exporter: it can be built and controlled as usual, but it never
    /// connects.
    ///
    /// Defaults to disabled.
    #[must_use]
    pub fn with_port(mut self, port: i64) -> Self {
        self.config.port = u16::try_from(port).ok().and_then(NonZeroU16::new);
        self
    }

    /// Sets whether or not operator notices are suppressed.
    ///
    /// Defaults to `false`.
    #[must_use]
    pub fn with_silent(mut self, silent: bool) -> Self {
        self.config.silent = silent;
        self
    }

    /// Set how long to wait before reconnecting after losing the connection.
    ///
    /// A zero interval disables reconnecting: after a failure the exporter stays stopped until it is explicitly started
    /// again.
    ///
    /// Defaults to 60 seconds.
    #[must_use]
    pub fn with_reconnect_interval(mut self, interval: Duration) -> Self {
        self.config.reconnect_interval = interval;
        self
    }

    /// Set how long a connection attempt may stay pending before it is treated as failed.
    ///
    /// Only takes effect when the exporter is built; reconfiguring a running exporter keeps the timeout it was built with.
    ///
    /// Defaults to 60 seconds.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Set the measurement name of pushed records.
    ///
    /// An empty name is ignored.
    ///
    /// Defaults to `ircd`.
    #[must_use]
    pub fn with_measurement<M>(mut self, measurement: M) -> Self
    where
        M: Into<String>,
    {
        let measurement = measurement.into();
        if !measurement.is_empty() {
            self.config.measurement = measurement;
        }
        self
    }

    /// Returns the configuration, for applying to an existing exporter with
    /// [`TelegrafExporter::reconfigure`].
    pub fn into_config(self) -> TelegrafConfig {
        self.config
    }

    /// Builds the exporter over a TCP transport and the system clock.
    ///
    /// Building never connects: call [`TelegrafExporter::activate`] once the host is ready.
    pub fn build<C, N>(self, counters: C, notices: N) -> TelegrafExporter<C, N, TcpTransport>
    where
        C: ServerCounters,
        N: NoticeSink,
    {
        let clock = Clock::new();
        let transport = TcpTransport::new(clock.clone(), self.config.connect_timeout);
        self.build_with(counters, notices, transport, clock)
    }

    /// Builds the exporter over the given transport and clock.
    pub fn build_with<C, N, T>(
        self,
        counters: C,
        notices: N,
        transport: T,
        clock: Clock,
    ) -> TelegrafExporter<C, N, T>
    where
        C: ServerCounters,
        N: NoticeSink,
        T: Transport,
    {
        TelegrafExporter::new(self.config, counters, notices, transport, clock)
    }
}

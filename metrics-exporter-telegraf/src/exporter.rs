use quanta::Clock;
use thiserror::Error;
use tracing::{debug, trace};

use crate::{
    builder::TelegrafConfig,
    client::{ClientEvent, ConnectionState, PushClient},
    host::{ActionQueue, DeferredAction, NoticeSink, ServerCounters},
    line::MetricLine,
    loop_lag::LoopLagMonitor,
    snapshot::SnapshotBuilder,
    transport::Transport,
};

/// Errors from misusing the exporter's lifecycle operations.
///
/// The display text of each variant is the status line reported back to the operator.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum LifecycleError {
    /// The exporter was asked to start while already running.
    #[error("Telegraf metrics already running")]
    AlreadyRunning,

    /// The operation needs a running exporter.
    #[error("Telegraf metrics not running")]
    NotRunning,

    /// No valid port is configured.
    #[error("Telegraf metrics disabled: no valid port configured")]
    Disabled,
}

/// Pushes host metrics to a local Telegraf instance.
///
/// The exporter is driven entirely by the host's event loop, and never blocks:
///
/// - [`on_loop_timer`](Self::on_loop_timer) on every loop iteration, with each resulting deferred action handed back
///   through [`run_deferred`](Self::run_deferred) later in the same pass
/// - [`poll_io`](Self::poll_io) whenever the loop services sockets, to observe connect completion and connection errors
/// - [`background_tick`](Self::background_tick) on the host's coarse periodic timer (every few seconds), which pushes
///   one line while connected and drives reconnects
///
/// The loop-lag monitor keeps sampling regardless of the connection state, so the first flush after a reconnect
/// reports fresh data.
pub struct TelegrafExporter<C, N, T> {
    config: TelegrafConfig,
    counters: C,
    notices: N,
    client: PushClient<T>,
    loop_lag: LoopLagMonitor,
    snapshot: SnapshotBuilder,
    clock: Clock,
}

impl<C, N, T> TelegrafExporter<C, N, T>
where
    C: ServerCounters,
    N: NoticeSink,
    T: Transport,
{
    pub(crate) fn new(
        config: TelegrafConfig,
        counters: C,
        notices: N,
        transport: T,
        clock: Clock,
    ) -> Self {
        let client = PushClient::new(
            config.remote_addr(),
            config.reconnect_interval(),
            transport,
            clock.clone(),
        );
        let snapshot = SnapshotBuilder::new(config.measurement());

        Self { config, counters, notices, client, loop_lag: LoopLagMonitor::new(), snapshot, clock }
    }

    /// Returns the active configuration.
    pub fn config(&self) -> &TelegrafConfig {
        &self.config
    }

    /// Returns a reference to the host counters.
    pub fn counters(&self) -> &C {
        &self.counters
    }

    /// Returns a mutable reference to the host counters.
    pub fn counters_mut(&mut self) -> &mut C {
        &mut self.counters
    }

    /// Returns a reference to the notice sink.
    pub fn notices(&self) -> &N {
        &self.notices
    }

    /// Returns a mutable reference to the notice sink.
    pub fn notices_mut(&mut self) -> &mut N {
        &mut self.notices
    }

    /// Returns a reference to the transport.
    pub fn transport(&self) -> &T {
        self.client.transport()
    }

    /// Returns a mutable reference to the transport.
    pub fn transport_mut(&mut self) -> &mut T {
        self.client.transport_mut()
    }

    /// Returns the loop-lag monitor.
    pub fn loop_lag(&self) -> &LoopLagMonitor {
        &self.loop_lag
    }

    /// Activates the exporter, starting it if a port is configured.
    pub fn activate(&mut self) {
        if self.config.remote_addr().is_none() {
            debug!("Telegraf port not configured, metrics disabled.");
            return;
        }

        if let Err(e) = self.start_inner(false) {
            debug!(reason = %e, "Exporter not started on activation.");
        }
    }

    /// Deactivates the exporter.
    ///
    /// Any connection is dropped and any pending reconnect cancelled, and the loop-lag monitor is cleared.
    pub fn deactivate(&mut self) {
        if self.client.disconnect() {
            self.notify("METRICS: Telegraf metrics stopped.");
        }
        self.loop_lag.clear();
    }

    /// Applies a new configuration.
    ///
    /// Notice suppression, the reconnect interval and the measurement name take effect immediately. A changed port
    /// drops the current connection and, if the new port is valid, starts a fresh one.
    pub fn reconfigure(&mut self, config: TelegrafConfig) {
        let port_changed = config.port() != self.config.port();

        self.client.set_reconnect_interval(config.reconnect_interval());
        self.snapshot = SnapshotBuilder::new(config.measurement());
        self.config = config;

        if port_changed {
            let was_running = self.client.is_running();
            self.client.retarget(self.config.remote_addr());
            if was_running {
                self.notify("METRICS: Telegraf metrics stopped.");
            }

            self.activate();
        }
    }

    /// Starts pushing metrics.
    ///
    /// Valid whenever the exporter is not running, including while a reconnect is pending, in which case the reconnect
    /// happens immediately.
    ///
    /// # Errors
    ///
    /// If the exporter is already running, or no valid port is configured, an error is returned and nothing changes.
    pub fn start(&mut self) -> Result<(), LifecycleError> {
        self.start_inner(false)
    }

    /// Stops pushing metrics.
    ///
    /// Any pending reconnect is cancelled, even if the exporter was not running.
    ///
    /// # Errors
    ///
    /// If the exporter was not running, [`LifecycleError::NotRunning`] is returned.
    pub fn stop(&mut self) -> Result<(), LifecycleError> {
        if self.client.disconnect() {
            self.notify("METRICS: Telegraf metrics stopped.");
            Ok(())
        } else {
            Err(LifecycleError::NotRunning)
        }
    }

    /// Stops and immediately starts again.
    ///
    /// # Errors
    ///
    /// If the exporter was not running, [`LifecycleError::NotRunning`] is returned and nothing changes. A pending
    /// reconnect stays pending.
    pub fn restart(&mut self) -> Result<(), LifecycleError> {
        if !self.client.is_running() {
            return Err(LifecycleError::NotRunning);
        }

        self.stop()?;
        self.start_inner(true)
    }

    /// Returns the connection state.
    pub fn status(&self) -> ConnectionState {
        self.client.state()
    }

    /// Returns `true` if the exporter holds a connection, established or not.
    pub fn is_running(&self) -> bool {
        self.client.is_running()
    }

    /// Builds the record that the next flush would push, without sending it.
    ///
    /// The loop-lag window is left untouched, so sampling does not affect what gets pushed.
    ///
    /// # Errors
    ///
    /// If the exporter is not running, [`LifecycleError::NotRunning`] is returned.
    pub fn sample(&self) -> Result<MetricLine, LifecycleError> {
        if !self.client.is_running() {
            return Err(LifecycleError::NotRunning);
        }

        Ok(self.snapshot.build(&self.counters, self.loop_lag.average()))
    }

    /// Marks the start of a loop iteration and schedules the matching loop-lag sample.
    pub fn on_loop_timer<Q>(&mut self, queue: &mut Q)
    where
        Q: ActionQueue + ?Sized,
    {
        self.loop_lag.mark_iteration_start(self.clock.now());
        queue.enqueue(DeferredAction::RecordLoopLag);
    }

    /// Runs an action previously scheduled through the host's action queue.
    pub fn run_deferred(&mut self, action: DeferredAction) {
        match action {
            DeferredAction::RecordLoopLag => self.loop_lag.record_sample(self.clock.now()),
        }
    }

    /// Drives pending connection I/O.
    pub fn poll_io(&mut self) {
        if let Some(event) = self.client.poll() {
            self.handle_event(event);
        }
    }

    /// Runs the periodic background work.
    ///
    /// While connected, one line is pushed. While a reconnect is pending and its backoff has elapsed, the reconnect is
    /// attempted. Otherwise nothing happens.
    pub fn background_tick(&mut self) {
        match self.client.state() {
            ConnectionState::Connected => self.flush(),
            ConnectionState::ReconnectPending if self.client.reconnect_due() => {
                self.notify("METRICS: Telegraf metrics restarted.");
                if let Some(event) = self.client.reconnect() {
                    self.handle_event(event);
                }
            }
            _ => {}
        }
    }

    fn start_inner(&mut self, restarted: bool) -> Result<(), LifecycleError> {
        if self.client.is_running() {
            return Err(LifecycleError::AlreadyRunning);
        }
        if self.client.remote().is_none() {
            return Err(LifecycleError::Disabled);
        }

        if restarted {
            self.notify("METRICS: Telegraf metrics restarted.");
        } else {
            self.notify("METRICS: Telegraf metrics started.");
        }

        if let Some(event) = self.client.connect() {
            self.handle_event(event);
        }
        Ok(())
    }

    fn flush(&mut self) {
        let line = self.snapshot.build(&self.counters, self.loop_lag.average_and_reset());
        if !line.has_fields() {
            return;
        }

        debug!("Sending Telegraf metrics.");
        let encoded = line.encode();
        match self.client.send(encoded.as_bytes()) {
            Some(event) => self.handle_event(event),
            None => trace!(line = encoded.trim_end(), "Sent Telegraf metrics."),
        }
    }

    fn handle_event(&mut self, event: ClientEvent) {
        match event {
            ClientEvent::Connected => debug!("Telegraf connection established."),
            ClientEvent::Disconnected { error, .. } => {
                let message = format!("METRICS: Socket error occurred: {error}");
                self.notify(&message);
            }
        }
    }

    fn notify(&mut self, message: &str) {
        if !self.config.silent() {
            self.notices.notice(message);
        }
    }
}

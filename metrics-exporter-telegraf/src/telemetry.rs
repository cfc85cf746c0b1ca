use metrics::{counter, Counter};

/// Exporter telemetry.
///
/// `Telemetry` tracks the push client's own behavior through the `metrics` facade. Nothing is recorded unless the host
/// has installed a recorder.
pub struct Telemetry {
    connect_attempts: Counter,
    connection_errors: Counter,
    lines_sent: Counter,
    bytes_sent: Counter,
    lines_dropped: Counter,
}

impl Telemetry {
    /// Creates a `Telemetry` instance, registering its counters with the current recorder.
    pub fn new() -> Self {
        let labels = telemetry_tags!();

        Self {
            connect_attempts: counter!("telegraf.exporter.connect_attempts", labels.iter()),
            connection_errors: counter!("telegraf.exporter.connection_errors", labels.iter()),
            lines_sent: counter!("telegraf.exporter.lines_sent", labels.iter()),
            bytes_sent: counter!("telegraf.exporter.bytes_sent", labels.iter()),
            lines_dropped: counter!("telegraf.exporter.lines_dropped", labels.iter()),
        }
    }

    /// Tracks the start of a connection attempt.
    pub fn track_connect_attempt(&self) {
        self.connect_attempts.increment(1);
    }

    /// Tracks a failed connection attempt or a lost connection.
    pub fn track_connection_error(&self) {
        self.connection_errors.increment(1);
    }

    /// Tracks a line that was handed to the connection.
    pub fn track_line_sent(&self, bytes_len: usize) {
        self.lines_sent.increment(1);
        self.bytes_sent.increment(bytes_len as u64);
    }

    /// Tracks a line that could not be sent.
    pub fn track_line_dropped(&self) {
        self.lines_dropped.increment(1);
    }
}

impl Default for Telemetry {
    fn default() -> Self {
        Self::new()
    }
}

macro_rules! _telemetry_tags {
    ($($k:literal => $v:expr),*) => {
        [
            ::metrics::Label::from_static_parts("client", "rust"),
            ::metrics::Label::from_static_parts("client_version", env!("CARGO_PKG_VERSION")),
            $(::metrics::Label::from_static_parts($k, $v),)*
        ]
    };
}

pub(crate) use _telemetry_tags as telemetry_tags;

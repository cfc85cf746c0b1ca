use std::time::Duration;

use tracing::warn;

use crate::{host::ServerCounters, line::MetricLine};

const WHOWAS_PREFIX: &str = "Whowas entries: ";

/// Numeric formatting for field values.
struct FieldFormatter {
    int_writer: itoa::Buffer,
    float_writer: ryu::Buffer,
}

impl FieldFormatter {
    fn new() -> Self {
        Self { int_writer: itoa::Buffer::new(), float_writer: ryu::Buffer::new() }
    }

    fn int(&mut self, value: u64) -> String {
        self.int_writer.format(value).to_string()
    }

    fn float(&mut self, value: f64) -> String {
        // Telegraf rejects NaN and infinite values. Whole numbers are written without a fraction.
        if value.is_finite() {
            let s = self.float_writer.format_finite(value);
            s.strip_suffix(".0").unwrap_or(s).to_string()
        } else {
            "0".to_string()
        }
    }
}

/// Builds the record that is pushed on every flush.
///
/// The builder only reads from the host: counters that are unavailable are left out of the record entirely rather
/// than being reported as zero.
#[derive(Clone, Debug)]
pub struct SnapshotBuilder {
    measurement: String,
}

impl SnapshotBuilder {
    /// Creates a new `SnapshotBuilder` that names its records `measurement`.
    pub fn new<M>(measurement: M) -> Self
    where
        M: Into<String>,
    {
        Self { measurement: measurement.into() }
    }

    /// Returns the measurement name.
    pub fn measurement(&self) -> &str {
        &self.measurement
    }

    /// Builds a record from the host's counters and the given loop-lag average.
    pub fn build<C>(&self, counters: &C, loop_lag: Duration) -> MetricLine
    where
        C: ServerCounters + ?Sized,
    {
        let mut fmt = FieldFormatter::new();
        let mut line = MetricLine::new(self.measurement.as_str());
        line.set_tag("server", counters.server_name());

        if let Some(users) = counters.local_user_count() {
            line.set_field("users", fmt.int(users));
        }

        if let Some(bandwidth) = counters.bandwidth() {
            line.set_field("rate_in", fmt.float(bandwidth.rate_in));
            line.set_field("rate_out", fmt.float(bandwidth.rate_out));
            line.set_field("rate_total", fmt.float(bandwidth.rate_total));
        }

        if let Some(reply) = counters.whowas_stats() {
            match parse_whowas_stats(&reply) {
                Some((size, bytes)) => {
                    line.set_field("whowas_size", size);
                    line.set_field("whowas_bytes", bytes);
                }
                None => warn!(%reply, "Unrecognized whowas statistics reply."),
            }
        }

        if let Some(stats) = counters.server_stats() {
            line.set_field("data_sent", fmt.int(stats.data_sent));
            line.set_field("data_recv", fmt.int(stats.data_recv));
            line.set_field("dns", fmt.int(stats.dns));
            line.set_field("dns_good", fmt.int(stats.dns_good));
            line.set_field("dns_bad", fmt.int(stats.dns_bad));
            line.set_field("sock_accepts", fmt.int(stats.sock_accepts));
            line.set_field("sock_refused", fmt.int(stats.sock_refused));
            line.set_field("connects", fmt.int(stats.connects));
            line.set_field("nick_collisions", fmt.int(stats.nick_collisions));
            line.set_field("cmd_unknown", fmt.int(stats.cmd_unknown));
        }

        if let Some(sockets) = counters.open_sockets() {
            line.set_field("sockets", fmt.int(sockets));
        }

        let micros = u64::try_from(loop_lag.as_micros()).unwrap_or(u64::MAX);
        line.set_field("main_loop_time", fmt.int(micros));

        line
    }
}

/// Parses a `Whowas entries: <count> (<bytes> bytes)` reply into its two numbers.
pub(crate) fn parse_whowas_stats(reply: &str) -> Option<(&str, &str)> {
    let rest = reply.strip_prefix(WHOWAS_PREFIX)?;
    let (size, rest) = rest.split_once(' ')?;
    let (bytes, _) = rest.strip_prefix('(')?.split_once(' ')?;

    let is_number = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    if is_number(size) && is_number(bytes) {
        Some((size, bytes))
    } else {
        None
    }
}

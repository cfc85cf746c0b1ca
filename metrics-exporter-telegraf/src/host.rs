//! Interfaces to the host process.
//!
//! The exporter never owns host state. Everything it reports is read through [`ServerCounters`] at flush time,
//! operator notices go out through a [`NoticeSink`], and loop-lag sampling rides on the host's deferred action queue
//! via [`ActionQueue`].

use std::collections::VecDeque;

/// Bandwidth rates reported by the host's socket engine.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Bandwidth {
    /// Inbound rate.
    pub rate_in: f64,

    /// Outbound rate.
    pub rate_out: f64,

    /// Combined rate.
    pub rate_total: f64,
}

/// Cumulative server statistics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ServerStats {
    /// Total bytes sent.
    pub data_sent: u64,

    /// Total bytes received.
    pub data_recv: u64,

    /// DNS lookups attempted.
    pub dns: u64,

    /// DNS lookups that succeeded.
    pub dns_good: u64,

    /// DNS lookups that failed.
    pub dns_bad: u64,

    /// Sockets accepted.
    pub sock_accepts: u64,

    /// Sockets refused.
    pub sock_refused: u64,

    /// Client connections.
    pub connects: u64,

    /// Nickname collisions.
    pub nick_collisions: u64,

    /// Unknown commands received.
    pub cmd_unknown: u64,
}

/// Read-only access to the host's counters.
///
/// Every accessor apart from [`server_name`](ServerCounters::server_name) is optional: returning `None` means the
/// counter is unavailable right now (for example, the subsystem that owns it is not loaded) and the corresponding
/// fields are left out of the record.
pub trait ServerCounters {
    /// Name of this server, used as the `server` tag.
    fn server_name(&self) -> &str;

    /// Number of locally connected clients.
    fn local_user_count(&self) -> Option<u64> {
        None
    }

    /// Current bandwidth rates.
    fn bandwidth(&self) -> Option<Bandwidth> {
        None
    }

    /// Statistics reply from the whowas subsystem.
    ///
    /// The expected format is `Whowas entries: <count> (<bytes> bytes)`.
    fn whowas_stats(&self) -> Option<String> {
        None
    }

    /// Cumulative server statistics.
    fn server_stats(&self) -> Option<ServerStats> {
        None
    }

    /// Number of socket descriptors currently in use.
    fn open_sockets(&self) -> Option<u64> {
        None
    }
}

/// Destination for operator-visible notices.
pub trait NoticeSink {
    /// Delivers a single notice.
    fn notice(&mut self, message: &str);
}

impl NoticeSink for Vec<String> {
    fn notice(&mut self, message: &str) {
        self.push(message.to_string());
    }
}

/// Work the exporter asks the host to run later in the current loop pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeferredAction {
    /// Record a loop-lag sample against the most recent iteration mark.
    RecordLoopLag,
}

/// The host's deferred action queue.
///
/// Actions pushed here must run in the same loop pass, after every action that was already queued, and before the
/// next iteration mark. The host hands each one back through
/// [`TelegrafExporter::run_deferred`](crate::TelegrafExporter::run_deferred).
pub trait ActionQueue {
    /// Enqueues an action.
    fn enqueue(&mut self, action: DeferredAction);
}

impl ActionQueue for VecDeque<DeferredAction> {
    fn enqueue(&mut self, action: DeferredAction) {
        self.push_back(action);
    }
}
